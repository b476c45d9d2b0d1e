pub mod settings;

pub use settings::{
    generate_default_config, AuthSettings, LedgerSettings, LoggingSettings, PaymentSettings,
    RateLimitSettings, ServerSettings, Settings, DEV_JWT_SECRET,
};
