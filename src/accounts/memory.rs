//! In-memory account database
//!
//! Behaves like the host database for the operations the registry uses,
//! keeps accounts in creation order, and can be told to fail a specific
//! operation for a specific user. Test double for the registry and sweeper.

use super::system::AccountDatabase;
use crate::error::{PanelError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use std::collections::HashSet;

/// Account operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Expiration,
    LockStatus,
    Create,
    SetPassword,
    Remove,
    SetExpiration,
    Lock,
    Unlock,
}

impl Operation {
    /// Tool the host implementation would run for this operation
    pub fn program(self) -> &'static str {
        match self {
            Operation::Expiration | Operation::SetExpiration => "chage",
            Operation::LockStatus | Operation::Lock | Operation::Unlock => "passwd",
            Operation::Create => "useradd",
            Operation::SetPassword => "chpasswd",
            Operation::Remove => "userdel",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryAccount {
    pub username: String,
    pub shell: String,
    pub expires_on: Option<NaiveDate>,
    pub locked: bool,
    pub password: Option<String>,
}

#[derive(Default)]
pub struct MemoryAccounts {
    accounts: Mutex<Vec<MemoryAccount>>,
    failures: Mutex<HashSet<(Operation, String)>>,
}

impl MemoryAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an account directly, as if it pre-existed on the host
    pub fn insert(&self, username: &str, shell: &str, expires_on: Option<NaiveDate>) {
        let mut accounts = self.accounts.lock();
        accounts.retain(|a| a.username != username);
        accounts.push(MemoryAccount {
            username: username.to_string(),
            shell: shell.to_string(),
            expires_on,
            locked: false,
            password: None,
        });
    }

    pub fn get(&self, username: &str) -> Option<MemoryAccount> {
        self.accounts.lock().iter().find(|a| a.username == username).cloned()
    }

    pub fn usernames(&self) -> Vec<String> {
        self.accounts.lock().iter().map(|a| a.username.clone()).collect()
    }

    /// Make `operation` fail for `username` until [`clear_failures`](Self::clear_failures)
    pub fn fail(&self, operation: Operation, username: &str) {
        self.failures.lock().insert((operation, username.to_string()));
    }

    pub fn clear_failures(&self) {
        self.failures.lock().clear();
    }

    fn check(&self, operation: Operation, username: &str) -> Result<()> {
        if self.failures.lock().contains(&(operation, username.to_string())) {
            return Err(PanelError::command(operation.program(), "injected failure"));
        }
        Ok(())
    }

    fn modify(&self, operation: Operation, username: &str, f: impl FnOnce(&mut MemoryAccount)) -> Result<()> {
        self.check(operation, username)?;
        let mut accounts = self.accounts.lock();
        let account = accounts
            .iter_mut()
            .find(|a| a.username == username)
            .ok_or_else(|| no_such_user(operation, username))?;
        f(account);
        Ok(())
    }

    fn read<T>(&self, operation: Operation, username: &str, f: impl FnOnce(&MemoryAccount) -> T) -> Result<T> {
        self.check(operation, username)?;
        self.get(username)
            .map(|a| f(&a))
            .ok_or_else(|| no_such_user(operation, username))
    }
}

fn no_such_user(operation: Operation, username: &str) -> PanelError {
    PanelError::command(operation.program(), format!("user '{}' does not exist", username))
}

#[async_trait]
impl AccountDatabase for MemoryAccounts {
    async fn accounts_with_shell(&self, shell: &str) -> Result<Vec<String>> {
        Ok(self
            .accounts
            .lock()
            .iter()
            .filter(|a| a.shell == shell)
            .map(|a| a.username.clone())
            .collect())
    }

    async fn expiration(&self, username: &str) -> Result<Option<NaiveDate>> {
        self.read(Operation::Expiration, username, |a| a.expires_on)
    }

    async fn is_locked(&self, username: &str) -> Result<bool> {
        self.read(Operation::LockStatus, username, |a| a.locked)
    }

    async fn create(&self, username: &str, shell: &str, expires_on: NaiveDate) -> Result<()> {
        self.check(Operation::Create, username)?;
        if self.get(username).is_some() {
            return Err(PanelError::command(
                "useradd",
                format!("user '{}' already exists", username),
            ));
        }
        self.insert(username, shell, Some(expires_on));
        Ok(())
    }

    async fn set_password(&self, username: &str, password: &str) -> Result<()> {
        self.modify(Operation::SetPassword, username, |a| a.password = Some(password.to_string()))
    }

    async fn remove(&self, username: &str) -> Result<()> {
        self.check(Operation::Remove, username)?;
        let mut accounts = self.accounts.lock();
        let before = accounts.len();
        accounts.retain(|a| a.username != username);
        if accounts.len() == before {
            return Err(no_such_user(Operation::Remove, username));
        }
        Ok(())
    }

    async fn set_expiration(&self, username: &str, expires_on: NaiveDate) -> Result<()> {
        self.modify(Operation::SetExpiration, username, |a| a.expires_on = Some(expires_on))
    }

    async fn lock(&self, username: &str) -> Result<()> {
        self.modify(Operation::Lock, username, |a| a.locked = true)
    }

    async fn unlock(&self, username: &str) -> Result<()> {
        self.modify(Operation::Unlock, username, |a| a.locked = false)
    }
}
