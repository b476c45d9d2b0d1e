/*
* Ledger Configuration
* --------------------
* Layered configuration, from lowest to highest priority:
*
* 1. Hardcoded defaults (see `generate_default_config`)
* 2. <CONFIG_PATH>/default.toml
* 3. <CONFIG_PATH>/local.toml
* 4. Environment variables prefixed with APP_, nested with `__`
*    (APP_PAYMENT__RATE_PER_HOUR=12.5, APP_AUTH__JWT_SECRET=...)
*
* CONFIG_PATH defaults to `config`. Both files are optional; a missing
* directory simply yields the defaults.
*/

use std::path::{Path, PathBuf};

use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use config::builder::DefaultState;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::billing::{DEFAULT_RATE_PER_HOUR, MAX_RATE_PER_HOUR};

/// Secret used when nothing else is configured. Only fit for local development.
pub const DEV_JWT_SECRET: &str = "driver-ledger-dev-secret";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub payment: PaymentSettings,
    pub ledger: LedgerSettings,
    pub auth: AuthSettings,
    pub rate_limits: RateLimitSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub api_prefix: String,
    pub body_limit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSettings {
    #[serde(with = "rust_decimal::serde::float")]
    pub rate_per_hour: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSettings {
    pub max_conflict_retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    pub api_requests_per_minute: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            api_requests_per_minute: 600,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        generate_default_config()
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config_path = std::env::var("CONFIG_PATH")
            .unwrap_or_else(|_| "config".to_string());

        info!("Loading configuration from path: {}", config_path);

        let config = Self::builder_with_defaults()?
            .add_source(File::with_name(&format!("{}/default", config_path)).required(false))
            .add_source(File::with_name(&format!("{}/local", config_path)).required(false))
            .add_source(Self::environment())
            .build()?;

        Self::finish(config)
    }

    pub fn new_from_file(path: &Path) -> Result<Self, ConfigError> {
        info!("Loading configuration from file: {}", path.display());

        let config = Self::builder_with_defaults()?
            .add_source(File::from(path))
            .add_source(Self::environment())
            .build()?;

        Self::finish(config)
    }

    /// Rejects values that deserialize fine but make no sense for the ledger.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.payment.rate_per_hour.is_sign_negative() && !self.payment.rate_per_hour.is_zero() {
            return Err(ConfigError::Message(format!(
                "payment.rate_per_hour must not be negative, got {}",
                self.payment.rate_per_hour
            )));
        }
        if self.payment.rate_per_hour > MAX_RATE_PER_HOUR {
            return Err(ConfigError::Message(format!(
                "payment.rate_per_hour must not exceed {}, got {}",
                MAX_RATE_PER_HOUR, self.payment.rate_per_hour
            )));
        }
        if !self.server.api_prefix.is_empty() && !self.server.api_prefix.starts_with('/') {
            return Err(ConfigError::Message(format!(
                "server.api_prefix must start with '/', got {:?}",
                self.server.api_prefix
            )));
        }
        if self.rate_limits.api_requests_per_minute == 0 {
            return Err(ConfigError::Message(
                "rate_limits.api_requests_per_minute must be at least 1".to_string(),
            ));
        }
        if self.auth.jwt_secret.is_empty() {
            return Err(ConfigError::Message("auth.jwt_secret must not be empty".to_string()));
        }
        if self.auth.token_ttl_hours <= 0 {
            return Err(ConfigError::Message(
                "auth.token_ttl_hours must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.auth.jwt_secret == DEV_JWT_SECRET
    }

    fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        let defaults = generate_default_config();
        let rate = defaults.payment.rate_per_hour.to_f64().unwrap_or(10.0);

        Config::builder()
            .set_default("server.host", defaults.server.host)?
            .set_default("server.port", defaults.server.port as i64)?
            .set_default("server.api_prefix", defaults.server.api_prefix)?
            .set_default("server.body_limit_bytes", defaults.server.body_limit_bytes as i64)?
            .set_default("payment.rate_per_hour", rate)?
            .set_default("ledger.max_conflict_retries", defaults.ledger.max_conflict_retries as i64)?
            .set_default("auth.jwt_secret", defaults.auth.jwt_secret)?
            .set_default("auth.token_ttl_hours", defaults.auth.token_ttl_hours)?
            .set_default(
                "rate_limits.api_requests_per_minute",
                defaults.rate_limits.api_requests_per_minute as i64,
            )?
            .set_default("logging.level", defaults.logging.level)?
            .set_default("logging.json", defaults.logging.json)
    }

    fn environment() -> Environment {
        Environment::with_prefix("APP")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    fn finish(config: Config) -> Result<Self, ConfigError> {
        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }
}

pub fn generate_default_config() -> Settings {
    Settings {
        server: ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 3000,
            api_prefix: "/api".to_string(),
            body_limit_bytes: 64 * 1024,
        },
        payment: PaymentSettings {
            rate_per_hour: DEFAULT_RATE_PER_HOUR,
        },
        ledger: LedgerSettings {
            max_conflict_retries: 3,
            snapshot_path: None,
        },
        auth: AuthSettings {
            jwt_secret: DEV_JWT_SECRET.to_string(),
            token_ttl_hours: 24,
        },
        rate_limits: RateLimitSettings::default(),
        logging: LoggingSettings {
            level: "info".to_string(),
            json: false,
        },
    }
}
