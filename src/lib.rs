//! boxpanel
//!
//! Administration panel for a tunnelling server: operator authentication and
//! the lifecycle of the no-login accounts the server hands out.
//!
//! # Features
//!
//! - **Credential Store**: `username:hash` file, Argon2id with legacy bcrypt
//!   verification, atomic rewrites
//! - **Sessions**: stateless HS256 bearer tokens with a fixed lifetime
//! - **Account Registry**: OS accounts joined with the panel's ledger
//! - **Lifecycle Sweeper**: removes expired accounts, on demand or periodically
//! - **HTTP API**: axum router behind a bearer-token gate
//!
//! # Architecture
//!
//! ```text
//! HTTP ──► auth_middleware ──► handlers ──┬── AuthService ──┬── CredentialStore (file)
//!                                         │                 └── SessionIssuer (JWT)
//!                                         │
//!                                         ├── AccountRegistry ──┬── AccountDatabase (useradd, chage, ...)
//!                                         │                     └── MembershipLedger (file)
//!                                         └── Sweeper
//! ```

pub mod accounts;
pub mod auth;
pub mod clock;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod textfile;

pub use accounts::{
    AccountDatabase, AccountRegistry, ManagedAccount, MembershipLedger, SweepReport, Sweeper,
    SystemAccounts, TokioCommandRunner,
};
pub use auth::{AuthService, CredentialStore, SessionIssuer, SessionToken};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use dashboard::{DashboardConfig, PanelServer, PanelState};
pub use error::{PanelError, Result};
