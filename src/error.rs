//! Panel error taxonomy
//!
//! Every core operation returns [`PanelError`]. Each variant has a stable
//! machine-readable [`PanelError::kind`] and maps onto one HTTP status.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, PanelError>;

/// Errors surfaced by the identity and account subsystems
#[derive(Debug, Error)]
pub enum PanelError {
    /// Bad username or bad password. Deliberately carries no detail.
    #[error("invalid credentials")]
    AuthenticationFailure,

    /// Malformed, tampered, wrong-algorithm or expired token.
    #[error("invalid token")]
    TokenInvalid,

    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("account already managed: {0}")]
    AccountAlreadyManaged(String),

    /// An OS account tool failed, could not be spawned, or timed out.
    #[error("{command} failed: {detail}")]
    ExternalCommandFailure { command: String, detail: String },

    #[error("failed to write {path}: {detail}")]
    StoreWriteError { path: String, detail: String },

    #[error("failed to read {path}: {detail}")]
    StoreReadError { path: String, detail: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl PanelError {
    /// Stable identifier for the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            PanelError::AuthenticationFailure => "authentication_failure",
            PanelError::TokenInvalid => "token_invalid",
            PanelError::AccountNotFound(_) => "account_not_found",
            PanelError::AccountAlreadyManaged(_) => "account_already_managed",
            PanelError::ExternalCommandFailure { .. } => "external_command_failure",
            PanelError::StoreWriteError { .. } => "store_write_error",
            PanelError::StoreReadError { .. } => "store_read_error",
            PanelError::InvalidRequest(_) => "invalid_request",
        }
    }

    /// HTTP status used when the error reaches a client
    pub fn status_code(&self) -> StatusCode {
        match self {
            PanelError::AuthenticationFailure | PanelError::TokenInvalid => StatusCode::UNAUTHORIZED,
            PanelError::AccountNotFound(_) => StatusCode::NOT_FOUND,
            PanelError::AccountAlreadyManaged(_) => StatusCode::CONFLICT,
            PanelError::ExternalCommandFailure { .. } => StatusCode::BAD_GATEWAY,
            PanelError::StoreWriteError { .. } | PanelError::StoreReadError { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            PanelError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub(crate) fn command(command: impl Into<String>, detail: impl Into<String>) -> Self {
        PanelError::ExternalCommandFailure {
            command: command.into(),
            detail: detail.into(),
        }
    }

    pub(crate) fn write(path: &std::path::Path, err: impl std::fmt::Display) -> Self {
        PanelError::StoreWriteError {
            path: path.display().to_string(),
            detail: err.to_string(),
        }
    }

    pub(crate) fn read(path: &std::path::Path, err: impl std::fmt::Display) -> Self {
        PanelError::StoreReadError {
            path: path.display().to_string(),
            detail: err.to_string(),
        }
    }
}

/// Error response format
///
/// `error` and `message` both carry the detail; web clients of the older
/// panel read `error`.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: &'static str,
    pub message: String,
}

impl IntoResponse for PanelError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Store paths stay in the logs, not in responses
        let message = match &self {
            PanelError::StoreWriteError { .. } => "Failed to update panel state".to_string(),
            PanelError::StoreReadError { .. } => "Failed to read panel state".to_string(),
            other => other.to_string(),
        };

        if status.is_server_error() {
            tracing::error!(kind = self.kind(), "{}", self);
        }

        let body = Json(ErrorResponse {
            error: message.clone(),
            kind: self.kind(),
            message,
        });

        (status, body).into_response()
    }
}
