use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingSettings;

/// `RUST_LOG` wins over the configured level when it is set.
pub fn env_filter(settings: &LoggingSettings) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn init_tracing(settings: &LoggingSettings) {
    let builder = fmt().with_env_filter(env_filter(settings)).with_target(true);

    // A subscriber may already be installed (tests, embedding); keep it.
    let _ = if settings.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
