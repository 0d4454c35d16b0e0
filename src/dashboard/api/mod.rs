//! Dashboard API Endpoints
//!
//! Thin adapters from HTTP onto the auth service and the account registry.
//! Routes are declared relative to `/api`.

pub mod health;
pub mod users;

use crate::error::{PanelError, Result};
use axum::{extract::rejection::JsonRejection, Json};
use serde::Serialize;

pub use health::{health_router, HealthResponse, HealthState};
pub use users::{users_router, CreateUserRequest, RenewRequest, RenewResponse, UsersState};

/// Plain acknowledgement body
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
    pub success: bool,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            success: true,
        }
    }
}

/// Unwrap a JSON body, turning extractor rejections into `InvalidRequest`
pub(crate) fn json_body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| PanelError::InvalidRequest(rejection.body_text()))
}
