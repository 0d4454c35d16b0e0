//! OS account database
//!
//! [`AccountDatabase`] is the narrow interface the registry needs from the
//! host: enumerate accounts by login shell, read expiration and lock status,
//! and create/remove/modify accounts. [`SystemAccounts`] implements it with
//! `/etc/passwd` and the shadow-utils tools.

use super::command::CommandRunner;
use crate::error::{PanelError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::path::PathBuf;
use std::sync::Arc;

/// Date format accepted by `useradd -e` and `chage -E`
const TOOL_DATE_FORMAT: &str = "%Y-%m-%d";

/// Date format printed by `chage -l` in the C locale
const CHAGE_DATE_FORMAT: &str = "%b %d, %Y";

/// Host account operations used by the registry
#[async_trait]
pub trait AccountDatabase: Send + Sync {
    /// Usernames whose login shell is exactly `shell`, in database order
    async fn accounts_with_shell(&self, shell: &str) -> Result<Vec<String>>;

    /// Account expiration date, `None` when the account never expires
    async fn expiration(&self, username: &str) -> Result<Option<NaiveDate>>;

    /// Whether the account's password is locked
    async fn is_locked(&self, username: &str) -> Result<bool>;

    /// Create an account with no home directory
    async fn create(&self, username: &str, shell: &str, expires_on: NaiveDate) -> Result<()>;

    async fn set_password(&self, username: &str, password: &str) -> Result<()>;

    async fn remove(&self, username: &str) -> Result<()>;

    async fn set_expiration(&self, username: &str, expires_on: NaiveDate) -> Result<()>;

    async fn lock(&self, username: &str) -> Result<()>;

    async fn unlock(&self, username: &str) -> Result<()>;
}

/// Host accounts via `/etc/passwd`, `useradd`, `userdel`, `chage`, `passwd`
/// and `chpasswd`
pub struct SystemAccounts {
    passwd_file: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl SystemAccounts {
    pub fn new(passwd_file: PathBuf, runner: Arc<dyn CommandRunner>) -> Self {
        Self { passwd_file, runner }
    }

    async fn exec(&self, program: &str, args: &[&str], stdin: Option<&str>) -> Result<String> {
        self.runner.run(program, args, stdin).await?.check(program)
    }
}

#[async_trait]
impl AccountDatabase for SystemAccounts {
    async fn accounts_with_shell(&self, shell: &str) -> Result<Vec<String>> {
        let content = tokio::fs::read_to_string(&self.passwd_file)
            .await
            .map_err(|e| PanelError::read(&self.passwd_file, e))?;
        Ok(parse_passwd(&content, shell))
    }

    async fn expiration(&self, username: &str) -> Result<Option<NaiveDate>> {
        let output = self.exec("chage", &["-l", username], None).await?;
        parse_chage_expiry(&output)
    }

    async fn is_locked(&self, username: &str) -> Result<bool> {
        let output = self.exec("passwd", &["-S", username], None).await?;
        parse_passwd_status(&output)
            .ok_or_else(|| PanelError::command("passwd", format!("unrecognized status: {}", output.trim())))
    }

    async fn create(&self, username: &str, shell: &str, expires_on: NaiveDate) -> Result<()> {
        let date = expires_on.format(TOOL_DATE_FORMAT).to_string();
        self.exec("useradd", &["-e", &date, "-s", shell, "-M", username], None)
            .await
            .map(|_| ())
    }

    async fn set_password(&self, username: &str, password: &str) -> Result<()> {
        let line = format!("{}:{}\n", username, password);
        self.exec("chpasswd", &[], Some(&line)).await.map(|_| ())
    }

    async fn remove(&self, username: &str) -> Result<()> {
        self.exec("userdel", &[username], None).await.map(|_| ())
    }

    async fn set_expiration(&self, username: &str, expires_on: NaiveDate) -> Result<()> {
        let date = expires_on.format(TOOL_DATE_FORMAT).to_string();
        self.exec("chage", &["-E", &date, username], None)
            .await
            .map(|_| ())
    }

    async fn lock(&self, username: &str) -> Result<()> {
        self.exec("passwd", &["-l", username], None).await.map(|_| ())
    }

    async fn unlock(&self, username: &str) -> Result<()> {
        self.exec("passwd", &["-u", username], None).await.map(|_| ())
    }
}

/// Usernames from passwd(5) content whose shell field equals `shell`
pub fn parse_passwd(content: &str, shell: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(':').collect();
            if fields.len() >= 7 && fields[6].trim() == shell && !fields[0].is_empty() {
                Some(fields[0].to_string())
            } else {
                None
            }
        })
        .collect()
}

/// Expiration from `chage -l` output. `never` and a missing line mean none.
pub fn parse_chage_expiry(output: &str) -> Result<Option<NaiveDate>> {
    let Some(line) = output.lines().find(|l| l.trim_start().starts_with("Account expires")) else {
        return Ok(None);
    };

    let value = line.split_once(':').map(|(_, v)| v.trim()).unwrap_or("");
    if value.is_empty() || value.eq_ignore_ascii_case("never") {
        return Ok(None);
    }

    NaiveDate::parse_from_str(value, CHAGE_DATE_FORMAT)
        .map(Some)
        .map_err(|_| PanelError::command("chage", format!("unrecognized expiration date: {}", value)))
}

/// Lock flag from `passwd -S` output (`L` on Debian, `LK` on Red Hat)
pub fn parse_passwd_status(output: &str) -> Option<bool> {
    let status = output.split_whitespace().nth(1)?;
    Some(status == "L" || status == "LK")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::command::CommandOutput;
    use parking_lot::Mutex;
    use tempfile::TempDir;

    /// Records invocations and replays canned outputs
    #[derive(Default)]
    struct ScriptedRunner {
        calls: Mutex<Vec<(String, Vec<String>, Option<String>)>>,
        output: Mutex<Option<CommandOutput>>,
    }

    impl ScriptedRunner {
        fn replying(output: CommandOutput) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                output: Mutex::new(Some(output)),
            }
        }

        fn calls(&self) -> Vec<(String, Vec<String>, Option<String>)> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, program: &str, args: &[&str], stdin: Option<&str>) -> Result<CommandOutput> {
            self.calls.lock().push((
                program.to_string(),
                args.iter().map(|a| a.to_string()).collect(),
                stdin.map(|s| s.to_string()),
            ));
            Ok(self.output.lock().clone().unwrap_or_else(|| CommandOutput::ok("")))
        }
    }

    const CHAGE_OUTPUT: &str = "Last password change\t\t\t\t\t: Mar 01, 2025\n\
Password expires\t\t\t\t\t: never\n\
Password inactive\t\t\t\t\t: never\n\
Account expires\t\t\t\t\t\t: Apr 15, 2025\n\
Minimum number of days between password change\t\t: 0\n";

    #[test]
    fn test_parse_passwd_filters_by_shell() {
        let content = "root:x:0:0:root:/root:/bin/bash\n\
daemon:x:1:1:daemon:/usr/sbin:/usr/sbin/nologin\n\
alice:x:1001:1001::/home/alice:/bin/false\n\
broken-line\n\
bob:x:1002:1002::/home/bob:/bin/false\n";

        assert_eq!(parse_passwd(content, "/bin/false"), vec!["alice", "bob"]);
        assert_eq!(parse_passwd(content, "/usr/sbin/nologin"), vec!["daemon"]);
    }

    #[test]
    fn test_parse_chage_expiry() {
        assert_eq!(
            parse_chage_expiry(CHAGE_OUTPUT).unwrap(),
            NaiveDate::from_ymd_opt(2025, 4, 15)
        );
        assert_eq!(parse_chage_expiry("Account expires : never\n").unwrap(), None);
        assert_eq!(parse_chage_expiry("nothing relevant\n").unwrap(), None);
        assert!(parse_chage_expiry("Account expires : someday\n").is_err());
    }

    #[test]
    fn test_parse_passwd_status() {
        assert_eq!(parse_passwd_status("alice L 03/01/2025 0 99999 7 -1\n"), Some(true));
        assert_eq!(parse_passwd_status("alice LK 2025-03-01 0 99999 7 -1\n"), Some(true));
        assert_eq!(parse_passwd_status("alice P 03/01/2025 0 99999 7 -1\n"), Some(false));
        assert_eq!(parse_passwd_status("alice NP 03/01/2025 0 99999 7 -1\n"), Some(false));
        assert_eq!(parse_passwd_status(""), None);
    }

    #[tokio::test]
    async fn test_accounts_with_shell_reads_passwd_file() {
        let dir = TempDir::new().unwrap();
        let passwd = dir.path().join("passwd");
        std::fs::write(&passwd, "a:x:1:1::/:/bin/false\nb:x:2:2::/:/bin/sh\n").unwrap();

        let accounts = SystemAccounts::new(passwd, Arc::new(ScriptedRunner::default()));
        assert_eq!(accounts.accounts_with_shell("/bin/false").await.unwrap(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_missing_passwd_file_is_read_error() {
        let dir = TempDir::new().unwrap();
        let accounts = SystemAccounts::new(dir.path().join("nope"), Arc::new(ScriptedRunner::default()));

        let err = accounts.accounts_with_shell("/bin/false").await.unwrap_err();
        assert_eq!(err.kind(), "store_read_error");
    }

    #[tokio::test]
    async fn test_create_invocation() {
        let runner = Arc::new(ScriptedRunner::default());
        let accounts = SystemAccounts::new(PathBuf::from("/etc/passwd"), runner.clone());

        accounts
            .create("alice", "/bin/false", NaiveDate::from_ymd_opt(2025, 4, 15).unwrap())
            .await
            .unwrap();

        let calls = runner.calls();
        assert_eq!(calls[0].0, "useradd");
        assert_eq!(calls[0].1, vec!["-e", "2025-04-15", "-s", "/bin/false", "-M", "alice"]);
    }

    #[tokio::test]
    async fn test_set_password_uses_stdin() {
        let runner = Arc::new(ScriptedRunner::default());
        let accounts = SystemAccounts::new(PathBuf::from("/etc/passwd"), runner.clone());

        accounts.set_password("alice", "pa ss'word").await.unwrap();

        let calls = runner.calls();
        assert_eq!(calls[0].0, "chpasswd");
        assert!(calls[0].1.is_empty());
        assert_eq!(calls[0].2.as_deref(), Some("alice:pa ss'word\n"));
    }

    #[tokio::test]
    async fn test_expiration_via_chage() {
        let runner = Arc::new(ScriptedRunner::replying(CommandOutput::ok(CHAGE_OUTPUT)));
        let accounts = SystemAccounts::new(PathBuf::from("/etc/passwd"), runner.clone());

        let expires = accounts.expiration("alice").await.unwrap();
        assert_eq!(expires, NaiveDate::from_ymd_opt(2025, 4, 15));
        assert_eq!(runner.calls()[0].1, vec!["-l", "alice"]);
    }

    #[tokio::test]
    async fn test_tool_failure_carries_diagnostic() {
        let runner = Arc::new(ScriptedRunner::replying(CommandOutput::failed(
            6,
            "userdel: user 'ghost' does not exist\n",
        )));
        let accounts = SystemAccounts::new(PathBuf::from("/etc/passwd"), runner);

        let err = accounts.remove("ghost").await.unwrap_err();
        match err {
            PanelError::ExternalCommandFailure { command, detail } => {
                assert_eq!(command, "userdel");
                assert!(detail.contains("does not exist"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
