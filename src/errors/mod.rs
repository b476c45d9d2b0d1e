pub mod handlers;

use thiserror::Error;
use tracing::error;

pub use handlers::RetryPolicy;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Driver not found: {driver_id}")]
    NotFound {
        driver_id: String,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Concurrent update on driver {driver_id}, retry later")]
    ConflictRetryable {
        driver_id: String,
    },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    pub fn not_found(driver_id: impl ToString) -> Self {
        LedgerError::NotFound {
            driver_id: driver_id.to_string(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        LedgerError::InvalidArgument(message.into())
    }

    /// Only conflicts are worth another attempt; everything else is final.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::ConflictRetryable { .. })
    }

    /// Short machine-readable name used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::NotFound { .. } => "not_found",
            LedgerError::InvalidArgument(_) => "invalid_argument",
            LedgerError::ConflictRetryable { .. } => "conflict_retryable",
            LedgerError::Storage(_) => "storage",
        }
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        error!(error = %err, "Ledger storage I/O failure");
        LedgerError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        error!(error = %err, "Ledger snapshot is not valid JSON");
        LedgerError::Storage(err.to_string())
    }
}

// Result type alias for convenience
pub type LedgerResult<T> = Result<T, LedgerError>;
