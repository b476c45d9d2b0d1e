use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::errors::LedgerError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Missing or invalid bearer token")]
    Unauthorized,

    #[error("Role '{0}' may not access this resource")]
    Forbidden(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Ledger(LedgerError::NotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::Ledger(LedgerError::InvalidArgument(_)) => StatusCode::BAD_REQUEST,
            ApiError::Ledger(LedgerError::ConflictRetryable { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Ledger(LedgerError::Storage(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::Ledger(e) => e.kind(),
            ApiError::Unauthorized => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }

        (
            status,
            Json(json!({
                "error": self.kind(),
                "message": self.to_string(),
            })),
        )
            .into_response()
    }
}
