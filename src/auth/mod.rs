//! Operator authentication
//!
//! [`CredentialStore`] verifies passwords, [`SessionIssuer`] turns a verified
//! operator into a bearer token. [`AuthService`] composes the two for the
//! login flow.

pub mod credentials;
pub mod session;

pub use credentials::{Credential, CredentialStore, MIN_PASSWORD_LEN};
pub use session::{Claims, SessionIssuer, SessionToken};

use crate::error::Result;
use tracing::{info, warn};

/// Login, password change and token validation for panel operators
pub struct AuthService {
    pub credentials: CredentialStore,
    pub sessions: SessionIssuer,
}

impl AuthService {
    pub fn new(credentials: CredentialStore, sessions: SessionIssuer) -> Self {
        Self {
            credentials,
            sessions,
        }
    }

    /// Verify credentials and issue a session token
    pub fn login(&self, username: &str, password: &str) -> Result<SessionToken> {
        let credential = match self.credentials.authenticate(username, password) {
            Ok(credential) => credential,
            Err(e) => {
                warn!(username, "Login rejected");
                return Err(e);
            }
        };

        let token = self.sessions.issue(&credential.username)?;
        info!(username = %credential.username, "Operator logged in");
        Ok(token)
    }

    /// Resolve a bearer token to the operator it was issued to
    pub fn validate(&self, token: &str) -> Result<String> {
        self.sessions.validate(token)
    }

    pub fn change_password(&self, username: &str, new_password: &str) -> Result<()> {
        self.credentials.change_password(username, new_password)
    }

    pub fn operators(&self) -> Result<Vec<String>> {
        self.credentials.list_usernames()
    }
}
