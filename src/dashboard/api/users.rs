//! Managed Account API
//!
//! REST endpoints over the account registry and the expiry sweeper.
//!
//! # Endpoints
//!
//! - `GET /api/users` - List managed accounts
//! - `POST /api/users` - Create an account (201)
//! - `DELETE /api/users/{username}` - Delete an account
//! - `POST /api/users/{username}/renew` - Set expiration to today + days
//! - `POST /api/users/{username}/lock` - Lock the password
//! - `POST /api/users/{username}/unlock` - Unlock the password
//! - `GET /api/users/connection-info` - Domain, address, ports, payloads
//! - `POST /api/users/clean-expired` - Run an expiry sweep now

use super::{json_body, MessageResponse};
use crate::accounts::{AccountRegistry, ConnectionInfo, ManagedAccount, SweepReport, Sweeper};
use crate::error::Result;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use zeroize::{Zeroize, ZeroizeOnDrop};

#[derive(Clone)]
pub struct UsersState {
    pub registry: Arc<AccountRegistry>,
    pub sweeper: Arc<Sweeper>,
}

#[derive(Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    pub expire_days: i64,
}

#[derive(Debug, Serialize)]
pub struct CreateUserResponse {
    pub message: String,
    pub success: bool,
    pub account: ManagedAccount,
}

#[derive(Debug, Deserialize)]
pub struct RenewRequest {
    pub days: i64,
}

#[derive(Debug, Serialize)]
pub struct RenewResponse {
    pub message: String,
    pub success: bool,
    pub expires_on: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct CleanExpiredResponse {
    pub message: String,
    pub success: bool,
    #[serde(flatten)]
    pub report: SweepReport,
}

/// GET /api/users
pub async fn list_users(State(state): State<UsersState>) -> Result<Json<Vec<ManagedAccount>>> {
    Ok(Json(state.registry.list().await?))
}

/// POST /api/users
pub async fn create_user(
    State(state): State<UsersState>,
    payload: std::result::Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateUserResponse>)> {
    let req = json_body(payload)?;
    let account = state
        .registry
        .create(&req.username, &req.password, req.expire_days)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateUserResponse {
            message: "User created successfully".into(),
            success: true,
            account,
        }),
    ))
}

/// DELETE /api/users/{username}
pub async fn delete_user(
    State(state): State<UsersState>,
    Path(username): Path<String>,
) -> Result<Json<MessageResponse>> {
    state.registry.delete(&username).await?;
    Ok(Json(MessageResponse::ok("User deleted successfully")))
}

/// POST /api/users/{username}/renew
pub async fn renew_user(
    State(state): State<UsersState>,
    Path(username): Path<String>,
    payload: std::result::Result<Json<RenewRequest>, JsonRejection>,
) -> Result<Json<RenewResponse>> {
    let req = json_body(payload)?;
    let expires_on = state.registry.renew(&username, req.days).await?;

    Ok(Json(RenewResponse {
        message: "User renewed successfully".into(),
        success: true,
        expires_on,
    }))
}

/// POST /api/users/{username}/lock
pub async fn lock_user(
    State(state): State<UsersState>,
    Path(username): Path<String>,
) -> Result<Json<MessageResponse>> {
    state.registry.lock(&username).await?;
    Ok(Json(MessageResponse::ok("User locked successfully")))
}

/// POST /api/users/{username}/unlock
pub async fn unlock_user(
    State(state): State<UsersState>,
    Path(username): Path<String>,
) -> Result<Json<MessageResponse>> {
    state.registry.unlock(&username).await?;
    Ok(Json(MessageResponse::ok("User unlocked successfully")))
}

/// GET /api/users/connection-info
pub async fn connection_info(State(state): State<UsersState>) -> Json<ConnectionInfo> {
    Json(state.registry.connection_info().await)
}

/// POST /api/users/clean-expired
pub async fn clean_expired(State(state): State<UsersState>) -> Result<Json<CleanExpiredResponse>> {
    let report = state.sweeper.sweep().await?;

    Ok(Json(CleanExpiredResponse {
        message: format!("Removed {} expired user(s)", report.removed_count()),
        success: report.failed.is_empty(),
        report,
    }))
}

/// Create the users API router (paths relative to `/api`)
pub fn users_router(state: UsersState) -> Router {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/connection-info", get(connection_info))
        .route("/users/clean-expired", post(clean_expired))
        .route("/users/{username}", delete(delete_user))
        .route("/users/{username}/renew", post(renew_user))
        .route("/users/{username}/lock", post(lock_user))
        .route("/users/{username}/unlock", post(unlock_user))
        .with_state(state)
}
