//! External command execution
//!
//! Every OS account tool goes through [`CommandRunner`]. The production
//! runner bounds each invocation with a timeout; a hung tool is reported as
//! [`PanelError::ExternalCommandFailure`] and killed on a best-effort basis.

use crate::error::{PanelError, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code (None if killed by a signal)
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Convenience constructor for a successful run
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Convenience constructor for a failed run
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Turn a non-zero exit into an error carrying the tool's diagnostic
    pub fn check(self, program: &str) -> Result<String> {
        if self.success() {
            return Ok(self.stdout);
        }

        let stderr = self.stderr.trim();
        let detail = if !stderr.is_empty() {
            stderr.to_string()
        } else {
            match self.exit_code {
                Some(code) => format!("exit status {}", code),
                None => "terminated by signal".to_string(),
            }
        };
        Err(PanelError::command(program, detail))
    }
}

/// Launches external programs
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, optionally feeding `stdin`.
    ///
    /// Returns `Err` only if the program could not be run to completion
    /// (spawn failure, I/O error, timeout). A non-zero exit is an `Ok` output.
    async fn run(&self, program: &str, args: &[&str], stdin: Option<&str>) -> Result<CommandOutput>;
}

/// Runs commands on the host through tokio
#[derive(Debug, Clone)]
pub struct TokioCommandRunner {
    timeout: Duration,
}

impl TokioCommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for TokioCommandRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, program: &str, args: &[&str], stdin: Option<&str>) -> Result<CommandOutput> {
        debug!(program, ?args, "Running command");

        let mut cmd = Command::new(program);
        cmd.args(args)
            // Stable, parseable tool output
            .env("LC_ALL", "C")
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| PanelError::command(program, format!("failed to spawn: {}", e)))?;

        let input = stdin.map(|s| s.to_string());
        let result = tokio::time::timeout(self.timeout, async move {
            if let (Some(input), Some(mut pipe)) = (input, child.stdin.take()) {
                pipe.write_all(input.as_bytes()).await?;
                pipe.shutdown().await?;
                drop(pipe);
            }
            child.wait_with_output().await
        })
        .await;

        match result {
            Ok(Ok(output)) => Ok(CommandOutput {
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            }),
            Ok(Err(e)) => Err(PanelError::command(program, e.to_string())),
            Err(_) => {
                // Dropping the future drops the child, which sends SIGKILL.
                // The process may still outlive us briefly.
                warn!(program, "Command timed out after {:?}", self.timeout);
                Err(PanelError::command(
                    program,
                    format!("timed out after {}s", self.timeout.as_secs_f32()),
                ))
            }
        }
    }
}
