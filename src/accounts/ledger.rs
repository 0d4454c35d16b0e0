//! Membership ledger
//!
//! One username per line. Listing a name here is what makes an OS account
//! "managed by this panel"; accounts with the no-login shell that are not
//! listed (service accounts and the like) are left alone.

use crate::error::Result;
use crate::textfile;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};

const FILE_MODE: u32 = 0o644;

pub struct MembershipLedger {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl MembershipLedger {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Listed usernames in file order. A missing file is an empty ledger.
    pub fn members(&self) -> Result<Vec<String>> {
        let content = textfile::read_optional(&self.path)?.unwrap_or_default();
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(str::to_string)
            .collect())
    }

    pub fn contains(&self, username: &str) -> Result<bool> {
        Ok(self.members()?.iter().any(|m| m == username))
    }

    /// Append `username`. Returns `false` if it was already listed.
    pub fn add(&self, username: &str) -> Result<bool> {
        let _guard = self.write_lock.lock();
        let mut content = textfile::read_optional(&self.path)?.unwrap_or_default();

        if content.lines().any(|l| l.trim() == username) {
            return Ok(false);
        }

        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(username);
        content.push('\n');

        textfile::write_atomic(&self.path, &content, FILE_MODE)?;
        Ok(true)
    }

    /// Remove every line naming `username`. Returns `false` if none did.
    pub fn remove(&self, username: &str) -> Result<bool> {
        let _guard = self.write_lock.lock();
        let Some(content) = textfile::read_optional(&self.path)? else {
            return Ok(false);
        };

        let kept: Vec<&str> = content.split('\n').filter(|l| l.trim() != username).collect();
        if kept.len() == content.split('\n').count() {
            return Ok(false);
        }

        textfile::write_atomic(&self.path, &kept.join("\n"), FILE_MODE)?;
        Ok(true)
    }
}
