//! Lifecycle sweeper
//!
//! Removes managed accounts whose expiration date is strictly before today.
//! A failure on one account is logged and recorded; the sweep moves on.
//! Removal drops the ledger entry even when the host removal fails, so an
//! account that failed is no longer managed and later sweeps skip it.

use super::registry::AccountRegistry;
use crate::error::Result;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// An account the sweep tried and failed to remove
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepFailure {
    pub username: String,
    pub kind: &'static str,
    pub error: String,
}

/// Outcome of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub removed: Vec<String>,
    pub failed: Vec<SweepFailure>,
    /// Accounts that never expire
    pub exempt: Vec<String>,
    /// Number of managed accounts examined
    pub checked: usize,
}

impl SweepReport {
    pub fn removed_count(&self) -> usize {
        self.removed.len()
    }
}

pub struct Sweeper {
    registry: Arc<AccountRegistry>,
}

impl Sweeper {
    pub fn new(registry: Arc<AccountRegistry>) -> Self {
        Self { registry }
    }

    /// Run one sweep. Only the initial listing can fail the whole sweep.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let today = self.registry.today();
        let accounts = self.registry.list().await?;

        let mut report = SweepReport {
            checked: accounts.len(),
            ..Default::default()
        };

        for account in accounts {
            if account.expires_on.is_none() {
                report.exempt.push(account.username);
                continue;
            }
            if !account.is_expired(today) {
                continue;
            }

            match self.registry.delete(&account.username).await {
                Ok(()) => report.removed.push(account.username),
                Err(e) => {
                    warn!(username = %account.username, "Failed to remove expired account: {}", e);
                    report.failed.push(SweepFailure {
                        username: account.username,
                        kind: e.kind(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            %today,
            checked = report.checked,
            removed = report.removed_count(),
            failed = report.failed.len(),
            "Expired account sweep finished"
        );
        Ok(report)
    }

    /// Sweep every `interval` until `shutdown` is notified
    pub async fn run_periodic(self: Arc<Self>, interval: Duration, shutdown: Arc<Notify>) {
        info!("Periodic sweep started (every {:?})", interval);

        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    debug!("Periodic sweep: shutdown requested");
                    break;
                }
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.sweep().await {
                        warn!("Periodic sweep failed: {}", e);
                    }
                }
            }
        }

        info!("Periodic sweep stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::connection::ConnectionSource;
    use crate::accounts::ledger::MembershipLedger;
    use crate::accounts::memory::{MemoryAccounts, Operation};
    use crate::clock::{Clock, ManualClock};
    use chrono::{NaiveDate, TimeZone, Utc};
    use tempfile::TempDir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn setup(
        dir: &TempDir,
        accounts: &[(&str, Option<NaiveDate>, bool)],
    ) -> (Sweeper, Arc<MemoryAccounts>, Arc<ManualClock>) {
        let db = Arc::new(MemoryAccounts::new());
        let ledger = MembershipLedger::new(dir.path().join("users"));
        for (name, expires, removable) in accounts {
            db.insert(name, "/bin/false", *expires);
            if !removable {
                db.fail(Operation::Remove, name);
            }
            ledger.add(name).unwrap();
        }

        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()));
        let registry = AccountRegistry::new(
            db.clone(),
            ledger,
            clock.clone(),
            "/bin/false",
            ConnectionSource::new(dir.path().join("domain"), Some("127.0.0.1".into())),
        );
        (Sweeper::new(Arc::new(registry)), db, clock)
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let dir = TempDir::new().unwrap();
        let (sweeper, db, _clock) = setup(
            &dir,
            &[
                ("alice", Some(date(2025, 3, 9)), true),
                ("bob", Some(date(2025, 3, 10)), true),
                ("carol", None, true),
            ],
        );

        let report = sweeper.sweep().await.unwrap();
        assert_eq!(report.removed, vec!["alice"]);
        assert_eq!(report.exempt, vec!["carol"]);
        assert!(report.failed.is_empty());
        assert_eq!(report.checked, 3);

        assert_eq!(db.usernames(), vec!["bob", "carol"]);
    }

    #[tokio::test]
    async fn test_second_sweep_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let (sweeper, _db, _clock) = setup(&dir, &[("alice", Some(date(2025, 3, 9)), true)]);

        assert_eq!(sweeper.sweep().await.unwrap().removed_count(), 1);

        let again = sweeper.sweep().await.unwrap();
        assert_eq!(again.removed_count(), 0);
        assert!(again.failed.is_empty());
        assert_eq!(again.checked, 0);
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_sweep() {
        let dir = TempDir::new().unwrap();
        let (sweeper, _db, _clock) = setup(
            &dir,
            &[
                ("alice", Some(date(2025, 1, 1)), false),
                ("bob", Some(date(2025, 2, 1)), true),
            ],
        );

        let report = sweeper.sweep().await.unwrap();
        assert_eq!(report.removed, vec!["bob"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].username, "alice");
        assert_eq!(report.failed[0].kind, "external_command_failure");
    }

    #[tokio::test]
    async fn test_expiry_follows_clock() {
        let dir = TempDir::new().unwrap();
        let (sweeper, _db, clock) = setup(&dir, &[("bob", Some(date(2025, 3, 10)), true)]);

        assert_eq!(sweeper.sweep().await.unwrap().removed_count(), 0);

        clock.advance(chrono::Duration::days(1));
        assert_eq!(clock.today(), date(2025, 3, 11));
        assert_eq!(sweeper.sweep().await.unwrap().removed, vec!["bob"]);
    }

    #[tokio::test]
    async fn test_run_periodic_stops_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let (sweeper, db, _clock) = setup(&dir, &[("alice", Some(date(2025, 3, 1)), true)]);

        let shutdown = Arc::new(Notify::new());
        let handle = tokio::spawn(Arc::new(sweeper).run_periodic(Duration::from_millis(10), shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.notify_one();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();

        assert!(db.usernames().is_empty());
    }
}
