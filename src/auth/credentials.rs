//! Operator Credential Store
//!
//! Flat `username:hash` record file with `#` comments, e.g.
//!
//! ```text
//! # Panel operator credentials
//! # Format: username:password_hash
//! admin:$argon2id$v=19$m=19456,t=2,p=1$...
//! ```
//!
//! New hashes are Argon2id. Existing bcrypt lines (`$2a$`, `$2b$`, `$2y$`)
//! still verify so hand-maintained files keep working.

use crate::config::{Config, HashingConfig, DEFAULT_ADMIN_USERNAME};
use crate::error::{PanelError, Result};
use crate::textfile;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use zeroize::Zeroizing;

/// Minimum length for a new operator password
pub const MIN_PASSWORD_LEN: usize = 6;

const FILE_MODE: u32 = 0o600;

/// A verified operator record
#[derive(Clone)]
pub struct Credential {
    pub username: String,
    password_hash: String,
}

impl Credential {
    pub fn password_hash(&self) -> &str {
        &self.password_hash
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password_hash", &"<redacted>")
            .finish()
    }
}

/// File-backed operator credential store
pub struct CredentialStore {
    path: PathBuf,
    hasher: Argon2<'static>,
    bootstrap_password: Zeroizing<String>,
    /// Serializes bootstrap and rewrites
    write_lock: Mutex<()>,
    /// Hash verified against when the username is unknown
    dummy_hash: OnceCell<String>,
}

impl CredentialStore {
    pub fn new(path: PathBuf, hashing: HashingConfig, bootstrap_password: &str) -> Result<Self> {
        let params = Params::new(hashing.memory_kib, hashing.iterations, Params::DEFAULT_P_COST, None)
            .map_err(|e| PanelError::InvalidRequest(format!("invalid hashing parameters: {}", e)))?;

        Ok(Self {
            path,
            hasher: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            bootstrap_password: Zeroizing::new(bootstrap_password.to_string()),
            write_lock: Mutex::new(()),
            dummy_hash: OnceCell::new(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.admin_file.clone(), config.hashing, &config.bootstrap_password)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hash a password with the configured Argon2id cost
    pub fn hash_password(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.hasher
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| PanelError::write(&self.path, format!("password hashing failed: {}", e)))
    }

    /// Verify a password against a stored hash. Unparseable hashes never match.
    pub fn verify_password(&self, password: &str, hash: &str) -> bool {
        if hash.starts_with("$2") {
            return bcrypt::verify(password, hash).unwrap_or(false);
        }

        match PasswordHash::new(hash) {
            Ok(parsed) => self.hasher.verify_password(password.as_bytes(), &parsed).is_ok(),
            Err(_) => false,
        }
    }

    /// Check a username/password pair.
    ///
    /// Unknown users and wrong passwords both yield
    /// [`PanelError::AuthenticationFailure`], after the same amount of hashing
    /// work.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<Credential> {
        let content = self.load()?;

        let record = records(&content)
            .find(|(user, _)| *user == username)
            .map(|(user, hash)| Credential {
                username: user.to_string(),
                password_hash: hash.to_string(),
            });

        match record {
            Some(credential) if self.verify_password(password, &credential.password_hash) => {
                Ok(credential)
            }
            Some(_) => Err(PanelError::AuthenticationFailure),
            None => {
                let dummy = self.dummy_hash.get_or_try_init(|| self.hash_password("boxpanel"))?;
                let _ = self.verify_password(password, dummy);
                Err(PanelError::AuthenticationFailure)
            }
        }
    }

    /// Replace the password of an existing operator.
    ///
    /// Every other line of the file, comments included, is written back
    /// unchanged.
    pub fn change_password(&self, username: &str, new_password: &str) -> Result<()> {
        if new_password.chars().count() < MIN_PASSWORD_LEN {
            return Err(PanelError::InvalidRequest(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        let hash = self.hash_password(new_password)?;

        let _guard = self.write_lock.lock();
        let content = self.load_locked()?;

        let mut found = false;
        let rewritten: Vec<String> = content
            .split('\n')
            .map(|line| match parse_record(line) {
                Some((user, _)) if user == username => {
                    found = true;
                    format!("{}:{}", username, hash)
                }
                _ => line.to_string(),
            })
            .collect();

        if !found {
            return Err(PanelError::AccountNotFound(username.to_string()));
        }

        textfile::write_atomic(&self.path, &rewritten.join("\n"), FILE_MODE)?;
        info!(username, "Operator password changed");
        Ok(())
    }

    /// Usernames of all records, in file order
    pub fn list_usernames(&self) -> Result<Vec<String>> {
        let content = self.load()?;
        Ok(records(&content).map(|(user, _)| user.to_string()).collect())
    }

    /// Read the file, bootstrapping it first if it does not exist
    fn load(&self) -> Result<String> {
        if let Some(content) = textfile::read_optional(&self.path)? {
            return Ok(content);
        }

        let _guard = self.write_lock.lock();
        self.load_locked()
    }

    /// Same as [`Self::load`], for callers already holding the write lock
    fn load_locked(&self) -> Result<String> {
        match textfile::read_optional(&self.path)? {
            Some(content) => Ok(content),
            None => self.bootstrap(),
        }
    }

    fn bootstrap(&self) -> Result<String> {
        let hash = self.hash_password(&self.bootstrap_password)?;
        let content = format!(
            "# Panel operator credentials\n# Format: username:password_hash\n{}:{}\n",
            DEFAULT_ADMIN_USERNAME, hash
        );

        textfile::write_atomic(&self.path, &content, FILE_MODE)?;

        info!(path = %self.path.display(), "Created operator credential file");
        if self.bootstrap_password.as_str() == crate::config::DEFAULT_BOOTSTRAP_PASSWORD {
            warn!(
                "Operator '{}' was created with the default password - change it immediately",
                DEFAULT_ADMIN_USERNAME
            );
        }

        Ok(content)
    }
}

/// Split a line into `(username, hash)`, skipping blanks and comments
fn parse_record(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    line.split_once(':')
}

fn records(content: &str) -> impl Iterator<Item = (&str, &str)> {
    content.lines().filter_map(parse_record)
}
