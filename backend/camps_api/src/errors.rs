//! Application-wide error types.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use grant_ledger::TransferError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Provisioning error: {0}")]
    Provisioning(String),

    #[error(transparent)]
    Ledger(#[from] TransferError),
}

pub type Result<T> = std::result::Result<T, ApiError>;

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            Self::Ledger(err) => (ledger_status(err), err.code()),
            Self::Provisioning(_) | Self::Http(_) => (StatusCode::BAD_GATEWAY, "provisioning_error"),
            Self::Database(_) | Self::Migrate(_) | Self::Json(_) | Self::Config(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        }
    }
}

fn ledger_status(err: &TransferError) -> StatusCode {
    match err {
        TransferError::InvalidAmount { .. } => StatusCode::BAD_REQUEST,
        TransferError::UserNotFound(_) | TransferError::CampaignNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        TransferError::MissingBudgetConfiguration(_)
        | TransferError::AlreadyFullyFunded(_)
        | TransferError::InsufficientBalance { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        TransferError::Busy { .. } => StatusCode::SERVICE_UNAVAILABLE,
        TransferError::PersistenceFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!("{code}: {self}");
        }

        let body = Json(json!({
            "error": code,
            "message": self.to_string(),
        }));

        if matches!(self, Self::Ledger(TransferError::Busy { .. })) {
            return (status, [(header::RETRY_AFTER, "1")], body).into_response();
        }
        (status, body).into_response()
    }
}
