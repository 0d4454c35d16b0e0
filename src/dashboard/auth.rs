//! Operator authentication endpoints and the authorization gate
//!
//! # Endpoints
//!
//! - `POST /api/auth/login` - Exchange username/password for a bearer token
//! - `POST /api/auth/change-password` - Change the calling operator's password
//! - `GET /api/auth/validate` - Check the presented token
//!
//! Every other route except the health probes sits behind
//! [`auth_middleware`], which expects `Authorization: Bearer <token>`.

use crate::auth::AuthService;
use crate::dashboard::api::{json_body, MessageResponse};
use crate::error::{PanelError, Result};
use axum::{
    extract::{rejection::JsonRejection, Request, State},
    http::header,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

const BEARER_PREFIX: &str = "Bearer ";

/// Operator admitted by the gate, available to handlers as an extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedOperator(pub String);

/// Login request
#[derive(Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Login response
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub username: String,
    /// Expiration (unix seconds)
    pub expires_at: i64,
    pub message: &'static str,
    pub success: bool,
}

#[derive(Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct ChangePasswordRequest {
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub username: String,
}

/// Login handler
pub async fn login_handler(
    State(auth): State<Arc<AuthService>>,
    payload: std::result::Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>> {
    let req = json_body(payload)?;
    let session = auth.login(&req.username, &req.password)?;

    Ok(Json(LoginResponse {
        token: session.token,
        username: session.username,
        expires_at: session.expires_at,
        message: "Login successful",
        success: true,
    }))
}

/// Change the password of the operator the token belongs to
pub async fn change_password_handler(
    State(auth): State<Arc<AuthService>>,
    Extension(AuthenticatedOperator(username)): Extension<AuthenticatedOperator>,
    payload: std::result::Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>> {
    let req = json_body(payload)?;
    auth.change_password(&username, &req.new_password)?;
    Ok(Json(MessageResponse::ok("Password changed successfully")))
}

pub async fn validate_handler(
    Extension(AuthenticatedOperator(username)): Extension<AuthenticatedOperator>,
) -> Json<ValidateResponse> {
    Json(ValidateResponse { valid: true, username })
}

/// Authorization gate
///
/// Rejects requests without a valid bearer token with 401 and stores the
/// token's subject as [`AuthenticatedOperator`] for downstream handlers.
pub async fn auth_middleware(
    State(auth): State<Arc<AuthService>>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix(BEARER_PREFIX))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            debug!(path = %req.uri().path(), "Request without bearer token");
            PanelError::TokenInvalid
        })?;

    let username = auth.validate(token)?;

    req.extensions_mut().insert(AuthenticatedOperator(username));
    Ok(next.run(req).await)
}

/// Create the authentication router (paths relative to `/api`)
pub fn auth_router(auth: Arc<AuthService>) -> Router {
    let gated = Router::new()
        .route("/auth/change-password", post(change_password_handler))
        .route("/auth/validate", get(validate_handler))
        .route_layer(middleware::from_fn_with_state(auth.clone(), auth_middleware));

    Router::new()
        .route("/auth/login", post(login_handler))
        .merge(gated)
        .with_state(auth)
}
