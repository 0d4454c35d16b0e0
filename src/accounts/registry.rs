//! Managed Account Registry
//!
//! A managed account is the join of two independently failing sources:
//!
//! 1. the OS account database (existence, no-login shell, expiry, lock flag)
//! 2. the membership ledger (this panel created it)
//!
//! | Operation | OS database | Ledger |
//! |-----------|-------------|--------|
//! | `create`  | `useradd` then `chpasswd` | append, only after both succeed |
//! | `delete`  | `userdel` | remove, whatever `userdel` reported |
//! | `renew`   | `chage -E` | - |
//! | `lock` / `unlock` | `passwd -l` / `passwd -u` | - |
//!
//! Nothing is rolled back. Ledger entries without an OS account are orphans:
//! they are skipped by [`AccountRegistry::list`] and never reported as errors.

use super::connection::{ConnectionInfo, ConnectionSource};
use super::ledger::MembershipLedger;
use super::system::AccountDatabase;
use crate::clock::Clock;
use crate::config::Config;
use crate::error::{PanelError, Result};
use chrono::{Duration, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Login names the OS tools accept without option confusion
static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,31}$").expect("valid regex"));

/// Longest validity a single create/renew may grant
pub const MAX_DAYS: i64 = 36_500;

/// One account managed by the panel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagedAccount {
    pub username: String,
    /// Last valid day, `None` if the account never expires
    pub expires_on: Option<NaiveDate>,
    pub locked: bool,
}

impl ManagedAccount {
    /// Expired accounts have an expiration date strictly before `today`
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        matches!(self.expires_on, Some(date) if date < today)
    }
}

pub struct AccountRegistry {
    db: Arc<dyn AccountDatabase>,
    ledger: MembershipLedger,
    clock: Arc<dyn Clock>,
    nologin_shell: String,
    connection: ConnectionSource,
    /// Serializes mutations across both sources
    mutation: Mutex<()>,
}

impl AccountRegistry {
    pub fn new(
        db: Arc<dyn AccountDatabase>,
        ledger: MembershipLedger,
        clock: Arc<dyn Clock>,
        nologin_shell: impl Into<String>,
        connection: ConnectionSource,
    ) -> Self {
        Self {
            db,
            ledger,
            clock,
            nologin_shell: nologin_shell.into(),
            connection,
            mutation: Mutex::new(()),
        }
    }

    pub fn from_config(config: &Config, db: Arc<dyn AccountDatabase>, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            db,
            MembershipLedger::new(config.ledger_file.clone()),
            clock,
            config.nologin_shell.clone(),
            ConnectionSource::new(config.domain_file.clone(), config.public_ip.clone()),
        )
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn ledger(&self) -> &MembershipLedger {
        &self.ledger
    }

    /// All managed accounts, in OS database order
    pub async fn list(&self) -> Result<Vec<ManagedAccount>> {
        let members: HashSet<String> = self.ledger.members()?.into_iter().collect();
        let candidates = self.db.accounts_with_shell(&self.nologin_shell).await?;

        let mut accounts = Vec::new();
        for username in candidates.into_iter().filter(|u| members.contains(u)) {
            let expires_on = match self.db.expiration(&username).await {
                Ok(expires_on) => expires_on,
                Err(e) => {
                    debug!(username, "Skipping account, expiration lookup failed: {}", e);
                    continue;
                }
            };
            let locked = match self.db.is_locked(&username).await {
                Ok(locked) => locked,
                Err(e) => {
                    debug!(username, "Skipping account, lock status lookup failed: {}", e);
                    continue;
                }
            };

            accounts.push(ManagedAccount {
                username,
                expires_on,
                locked,
            });
        }

        debug!(count = accounts.len(), "Listed managed accounts");
        Ok(accounts)
    }

    /// Look up one managed account
    pub async fn get(&self, username: &str) -> Result<ManagedAccount> {
        self.list()
            .await?
            .into_iter()
            .find(|a| a.username == username)
            .ok_or_else(|| PanelError::AccountNotFound(username.to_string()))
    }

    /// Provision a new no-login account that expires `expire_days` from today
    pub async fn create(&self, username: &str, password: &str, expire_days: i64) -> Result<ManagedAccount> {
        validate_username(username)?;
        validate_days(expire_days)?;
        if password.is_empty() || password.contains(['\n', '\r']) {
            return Err(PanelError::InvalidRequest(
                "password must be non-empty and on a single line".into(),
            ));
        }

        let _guard = self.mutation.lock().await;

        if self.ledger.contains(username)? {
            return Err(PanelError::AccountAlreadyManaged(username.to_string()));
        }

        let expires_on = self.today() + Duration::days(expire_days);
        self.db.create(username, &self.nologin_shell, expires_on).await?;

        if let Err(e) = self.db.set_password(username, password).await {
            warn!(username, "Account created but password could not be set; it is not rolled back");
            return Err(e);
        }

        self.ledger.add(username)?;

        info!(username, %expires_on, "Created managed account");
        Ok(ManagedAccount {
            username: username.to_string(),
            expires_on: Some(expires_on),
            locked: false,
        })
    }

    /// Remove the OS account, then its ledger entry regardless of the outcome
    pub async fn delete(&self, username: &str) -> Result<()> {
        validate_username(username)?;
        let _guard = self.mutation.lock().await;
        self.ensure_managed(username)?;
        self.delete_locked(username).await
    }

    async fn delete_locked(&self, username: &str) -> Result<()> {
        let os_result = self.db.remove(username).await;
        let ledger_result = self.ledger.remove(username);

        match (os_result, ledger_result) {
            (Ok(()), Ok(_)) => {
                info!(username, "Deleted managed account");
                Ok(())
            }
            (Ok(()), Err(e)) => Err(e),
            (Err(e), Ok(_)) => {
                warn!(username, "OS account removal failed, ledger entry dropped: {}", e);
                Err(e)
            }
            (Err(e), Err(ledger_err)) => {
                warn!(username, "Ledger cleanup also failed: {}", ledger_err);
                Err(e)
            }
        }
    }

    /// Set expiration to `today + days`. Renewal is absolute, not additive.
    pub async fn renew(&self, username: &str, days: i64) -> Result<NaiveDate> {
        validate_username(username)?;
        validate_days(days)?;
        let _guard = self.mutation.lock().await;
        self.ensure_managed(username)?;

        let expires_on = self.today() + Duration::days(days);
        self.db.set_expiration(username, expires_on).await?;

        info!(username, %expires_on, "Renewed managed account");
        Ok(expires_on)
    }

    pub async fn lock(&self, username: &str) -> Result<()> {
        validate_username(username)?;
        let _guard = self.mutation.lock().await;
        self.ensure_managed(username)?;

        self.db.lock(username).await?;
        info!(username, "Locked managed account");
        Ok(())
    }

    pub async fn unlock(&self, username: &str) -> Result<()> {
        validate_username(username)?;
        let _guard = self.mutation.lock().await;
        self.ensure_managed(username)?;

        self.db.unlock(username).await?;
        info!(username, "Unlocked managed account");
        Ok(())
    }

    /// Domain, address, ports and payload templates for client setup
    pub async fn connection_info(&self) -> ConnectionInfo {
        self.connection.info().await
    }

    fn ensure_managed(&self, username: &str) -> Result<()> {
        if self.ledger.contains(username)? {
            Ok(())
        } else {
            Err(PanelError::AccountNotFound(username.to_string()))
        }
    }
}

fn validate_username(username: &str) -> Result<()> {
    if USERNAME_RE.is_match(username) {
        Ok(())
    } else {
        Err(PanelError::InvalidRequest(format!("invalid username: {:?}", username)))
    }
}

fn validate_days(days: i64) -> Result<()> {
    if (1..=MAX_DAYS).contains(&days) {
        Ok(())
    } else {
        Err(PanelError::InvalidRequest(format!(
            "days must be between 1 and {}, got {}",
            MAX_DAYS, days
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::memory::{MemoryAccounts, Operation};
    use crate::clock::ManualClock;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    struct Fixture {
        registry: AccountRegistry,
        db: Arc<MemoryAccounts>,
        clock: Arc<ManualClock>,
        _dir: TempDir,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(MemoryAccounts::new());
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap()));
        let registry = AccountRegistry::new(
            db.clone(),
            MembershipLedger::new(dir.path().join("users")),
            clock.clone(),
            "/bin/false",
            ConnectionSource::new(dir.path().join("domain"), Some("198.51.100.1".into())),
        );
        Fixture {
            registry,
            db,
            clock,
            _dir: dir,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_create_then_list() {
        let f = fixture();

        let created = f.registry.create("alice", "pw-alice", 30).await.unwrap();
        assert_eq!(created.expires_on, Some(date(2025, 3, 31)));

        let accounts = f.registry.list().await.unwrap();
        assert_eq!(
            accounts,
            vec![ManagedAccount {
                username: "alice".into(),
                expires_on: Some(date(2025, 3, 31)),
                locked: false,
            }]
        );

        let os = f.db.get("alice").unwrap();
        assert_eq!(os.shell, "/bin/false");
        assert_eq!(os.password.as_deref(), Some("pw-alice"));
    }

    #[tokio::test]
    async fn test_list_excludes_unmanaged_and_other_shells() {
        let f = fixture();
        f.db.insert("sshd", "/bin/false", None);
        f.db.insert("root", "/bin/bash", None);
        f.registry.create("alice", "pw", 5).await.unwrap();

        let names: Vec<String> = f.registry.list().await.unwrap().into_iter().map(|a| a.username).collect();
        assert_eq!(names, vec!["alice"]);
    }

    #[tokio::test]
    async fn test_orphan_ledger_entry_is_skipped() {
        let f = fixture();
        f.registry.create("alice", "pw", 5).await.unwrap();
        f.registry.ledger().add("ghost").unwrap();

        let accounts = f.registry.list().await.unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].username, "alice");
    }

    #[tokio::test]
    async fn test_lookup_failure_skips_entry() {
        let f = fixture();
        f.registry.create("alice", "pw", 5).await.unwrap();
        f.registry.create("bob", "pw", 5).await.unwrap();
        f.db.fail(Operation::Expiration, "alice");

        let accounts = f.registry.list().await.unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].username, "bob");
    }

    #[tokio::test]
    async fn test_create_rejects_already_managed() {
        let f = fixture();
        f.registry.create("alice", "pw", 5).await.unwrap();

        let err = f.registry.create("alice", "pw", 5).await.unwrap_err();
        assert!(matches!(err, PanelError::AccountAlreadyManaged(ref u) if u == "alice"));
    }

    #[tokio::test]
    async fn test_create_validates_input() {
        let f = fixture();

        for days in [0, -3, MAX_DAYS + 1] {
            let err = f.registry.create("alice", "pw", days).await.unwrap_err();
            assert!(matches!(err, PanelError::InvalidRequest(_)));
        }
        for name in ["", "-r", "bad name", "a:b", "../x"] {
            let err = f.registry.create(name, "pw", 5).await.unwrap_err();
            assert!(matches!(err, PanelError::InvalidRequest(_)), "{:?}", name);
        }
        assert!(f.registry.create("alice", "", 5).await.is_err());
        assert!(f.registry.create("alice", "a\nb", 5).await.is_err());
        assert!(f.db.get("alice").is_none());
    }

    #[tokio::test]
    async fn test_password_failure_is_not_rolled_back() {
        let f = fixture();
        f.db.fail(Operation::SetPassword, "alice");

        let err = f.registry.create("alice", "pw", 5).await.unwrap_err();
        assert_eq!(err.kind(), "external_command_failure");

        // OS account stays, but it never reached the ledger
        assert!(f.db.get("alice").is_some());
        assert!(!f.registry.ledger().contains("alice").unwrap());
        assert!(f.registry.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_from_both_sources() {
        let f = fixture();
        f.registry.create("alice", "pw", 5).await.unwrap();

        f.registry.delete("alice").await.unwrap();

        assert!(f.db.get("alice").is_none());
        assert!(!f.registry.ledger().contains("alice").unwrap());
        assert!(f.registry.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_drops_ledger_entry_even_if_os_fails() {
        let f = fixture();
        f.registry.create("alice", "pw", 5).await.unwrap();
        f.db.fail(Operation::Remove, "alice");

        let err = f.registry.delete("alice").await.unwrap_err();
        assert_eq!(err.kind(), "external_command_failure");
        assert!(!f.registry.ledger().contains("alice").unwrap());
    }

    #[tokio::test]
    async fn test_delete_orphan_clears_ledger() {
        let f = fixture();
        f.registry.ledger().add("ghost").unwrap();

        assert!(f.registry.delete("ghost").await.is_err());
        assert!(!f.registry.ledger().contains("ghost").unwrap());
    }

    #[tokio::test]
    async fn test_unmanaged_account_is_not_found() {
        let f = fixture();
        f.db.insert("sshd", "/bin/false", None);

        for result in [
            f.registry.delete("sshd").await,
            f.registry.lock("sshd").await,
            f.registry.unlock("sshd").await,
            f.registry.renew("sshd", 3).await.map(|_| ()),
        ] {
            assert!(matches!(result, Err(PanelError::AccountNotFound(_))));
        }
        assert!(f.db.get("sshd").is_some());
    }

    #[tokio::test]
    async fn test_renew_is_absolute() {
        let f = fixture();
        f.registry.create("alice", "pw", 90).await.unwrap();

        let renewed = f.registry.renew("alice", 5).await.unwrap();
        assert_eq!(renewed, date(2025, 3, 6));

        f.clock.advance(Duration::days(2));
        let renewed = f.registry.renew("alice", 5).await.unwrap();
        assert_eq!(renewed, date(2025, 3, 8));

        let account = f.registry.get("alice").await.unwrap();
        assert_eq!(account.expires_on, Some(date(2025, 3, 8)));
    }

    #[tokio::test]
    async fn test_lock_and_unlock() {
        let f = fixture();
        f.registry.create("alice", "pw", 5).await.unwrap();

        f.registry.lock("alice").await.unwrap();
        let account = f.registry.get("alice").await.unwrap();
        assert!(account.locked);
        assert_eq!(account.expires_on, Some(date(2025, 3, 6)));

        f.registry.unlock("alice").await.unwrap();
        assert!(!f.registry.get("alice").await.unwrap().locked);
    }

    #[tokio::test]
    async fn test_connection_info() {
        let f = fixture();
        let info = f.registry.connection_info().await;
        assert_eq!(info.domain, "Not Set");
        assert_eq!(info.public_ip, "198.51.100.1");
    }

    #[test]
    fn test_is_expired() {
        let account = ManagedAccount {
            username: "a".into(),
            expires_on: Some(date(2025, 3, 1)),
            locked: false,
        };
        assert!(!account.is_expired(date(2025, 3, 1)));
        assert!(account.is_expired(date(2025, 3, 2)));

        let forever = ManagedAccount {
            expires_on: None,
            ..account
        };
        assert!(!forever.is_expired(date(2999, 1, 1)));
    }
}
