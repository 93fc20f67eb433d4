//! Real process execution on tokio.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{CommandOutput, CommandRunner, CommandSpec};

/// Runs commands as child processes.
///
/// Children are killed when their future is dropped, so an interrupted run
/// never leaves a build or test process behind.
#[derive(Debug, Clone, Default)]
pub struct TokioCommandRunner {
    timeout: Option<Duration>,
}

impl TokioCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill commands that run longer than `timeout`
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    #[instrument(skip(self), fields(command = %command))]
    async fn run(&self, command: &CommandSpec) -> DomainResult<CommandOutput> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }

        let child = cmd.output();
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child).await.map_err(|_| {
                DomainError::CommandTimedOut {
                    command: command.to_string(),
                    timeout_secs: limit.as_secs(),
                }
            })?,
            None => child.await,
        }
        .map_err(|e| DomainError::ToolUnavailable {
            program: command.program.clone(),
            reason: e.to_string(),
        })?;

        let result = CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(exit_code = ?result.exit_code, "command finished");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_program_is_unavailable() {
        let runner = TokioCommandRunner::new();
        let result = runner
            .run(&CommandSpec::new("covergen-definitely-not-a-real-binary"))
            .await;
        assert!(matches!(result, Err(DomainError::ToolUnavailable { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_is_not_an_error() {
        let runner = TokioCommandRunner::new();
        let output = runner
            .run(&CommandSpec::new("sh").args(["-c", "echo out; echo err >&2; exit 3"]))
            .await
            .unwrap();
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
        assert!(!output.is_success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout() {
        let runner = TokioCommandRunner::new().with_timeout(Some(Duration::from_millis(100)));
        let result = runner
            .run(&CommandSpec::new("sh").args(["-c", "sleep 5"]))
            .await;
        assert!(matches!(result, Err(DomainError::CommandTimedOut { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let runner = TokioCommandRunner::new();
        let output = runner
            .run(&CommandSpec::new("pwd").current_dir(dir.path()))
            .await
            .unwrap();
        let reported = std::path::PathBuf::from(output.stdout.trim());
        assert_eq!(
            reported.canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }
}
