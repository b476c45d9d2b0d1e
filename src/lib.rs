pub mod api;
pub mod billing;
pub mod cli;
pub mod config;
pub mod errors;
pub mod ledger;
pub mod logging;
pub mod utils;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};

// Re-exports
pub use api::routes::{create_router, AppState};
pub use billing::{compute_payment, PaymentCalculator, PaymentQuote};
pub use crate::config::Settings;
pub use errors::{LedgerError, LedgerResult};
pub use ledger::{AccumulationService, DriverId, DriverTimeRecord, QueryFacade};

pub async fn run_server(settings: Settings, port: u16) -> anyhow::Result<()> {
    if settings.uses_dev_secret() {
        warn!("Using the built-in development JWT secret; set APP_AUTH__JWT_SECRET in production");
    }

    let state = Arc::new(AppState::from_settings(&settings).await?);
    info!(
        rate_per_hour = %state.queries.rate_per_hour(),
        api_prefix = %state.api_prefix,
        "Ledger initialized"
    );

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", settings.server.host, port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", settings.server.host, port))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(utils::shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}
