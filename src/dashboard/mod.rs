//! Panel HTTP Surface
//!
//! Axum adapter over the auth service and the account registry.
//!
//! # Security Model
//!
//! - **Bearer tokens**: every route except login and the probes goes
//!   through [`auth::auth_middleware`]
//! - **No session state**: tokens are validated by signature and time window
//! - **Uniform failures**: bad username and bad password look the same
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                  Panel Server                    │
//! ├──────────────────────────────────────────────────┤
//! │  POST /api/auth/login            → Token         │
//! │  POST /api/auth/change-password  → Operator pw   │
//! │  GET  /api/auth/validate         → Token check   │
//! │  GET  /api/health|healthz|readyz → Probes        │
//! │  GET  /api/users                 → List          │
//! │  POST /api/users                 → Create        │
//! │  DELETE /api/users/{username}    → Delete        │
//! │  POST /api/users/{username}/*    → Renew / Lock  │
//! │  GET  /api/users/connection-info → Client setup  │
//! │  POST /api/users/clean-expired   → Sweep         │
//! └──────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod server;

pub use api::{health_router, users_router, HealthState, MessageResponse, UsersState};
pub use auth::{auth_middleware, auth_router, AuthenticatedOperator};
pub use config::DashboardConfig;
pub use server::{PanelServer, PanelState};
