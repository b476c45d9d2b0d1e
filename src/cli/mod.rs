/*
* Driver Ledger Command Line Interface
* ------------------------------------
* driver-ledger
* ├── serve [--port]                          start the HTTP API
* ├── init [--force]                          write <CONFIG_PATH>/default.toml
* └── token --sub <id> [--role] [--ttl-hours] mint a bearer token for local use
*
* A global --config <file> loads one explicit file instead of the
* CONFIG_PATH directory; APP_* environment variables still apply on top.
* `init` writes to that same file when --config is given.
*/

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use crate::api::middleware::auth::JwtKeys;
use crate::config::{generate_default_config, Settings};
use crate::logging::init_tracing;

#[derive(Parser, Debug)]
#[command(name = "driver-ledger")]
#[command(about = "Driver online-time and payment ledger", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, value_name = "CONFIG", global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the API server
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Generate default configuration
    Init {
        #[arg(short, long)]
        force: bool,
    },
    /// Issue a signed bearer token
    Token {
        #[arg(short, long)]
        sub: String,
        #[arg(short, long, default_value = "driver")]
        role: String,
        #[arg(long)]
        ttl_hours: Option<i64>,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // init must work before any configuration exists
    if let Commands::Init { force } = cli.command {
        return handle_init_command(&init_target(cli.config.as_deref()), force);
    }

    let settings = match &cli.config {
        Some(path) => Settings::new_from_file(path)?,
        None => Settings::new()?,
    };
    init_tracing(&settings.logging);

    match cli.command {
        Commands::Serve { port } => {
            let server_port = port.unwrap_or(settings.server.port);
            info!("Starting server on port {}", server_port);
            crate::run_server(settings, server_port).await?;
        }
        Commands::Token { sub, role, ttl_hours } => {
            handle_token_command(&settings, &sub, &role, ttl_hours)?;
        }
        Commands::Init { .. } => unreachable!("handled before configuration is loaded"),
    }

    Ok(())
}

fn handle_token_command(
    settings: &Settings,
    sub: &str,
    role: &str,
    ttl_hours: Option<i64>,
) -> anyhow::Result<()> {
    let ttl = ttl_hours.unwrap_or(settings.auth.token_ttl_hours);
    if ttl <= 0 {
        anyhow::bail!("--ttl-hours must be positive");
    }

    let token = JwtKeys::from_secret(&settings.auth.jwt_secret)
        .issue(sub, role, chrono::Duration::hours(ttl))
        .context("signing token")?;

    if settings.uses_dev_secret() {
        eprintln!("{} signed with the development secret", "!".yellow());
    }
    println!("{token}");
    Ok(())
}

/// The file `init` writes: the explicit `--config` file, otherwise
/// `default.toml` in the directory `Settings::new` reads from.
fn init_target(config: Option<&Path>) -> PathBuf {
    match config {
        Some(path) => path.to_path_buf(),
        None => {
            let config_dir = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config".to_string());
            PathBuf::from(config_dir).join("default.toml")
        }
    }
}

fn handle_init_command(target: &Path, force: bool) -> anyhow::Result<()> {
    if target.exists() && !force {
        eprintln!("{} {} already exists", "✗".red(), target.display());
        anyhow::bail!(
            "configuration {} already exists, use --force to overwrite",
            target.display()
        );
    }

    if let Some(config_dir) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(config_dir)
            .with_context(|| format!("creating {}", config_dir.display()))?;
    }
    let config_str = toml::to_string_pretty(&generate_default_config())?;
    std::fs::write(target, config_str)
        .with_context(|| format!("writing {}", target.display()))?;

    println!("{} Default configuration generated at {}", "✓".green(), target.display());
    Ok(())
}
