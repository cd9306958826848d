//! External tool execution with cancellation and deadlines.
//!
//! Every `hdiutil`, `SetFile`, `Rez` or `osascript` call goes through
//! [`run_tool`], which races the child against the build's
//! [`ExecContext`] and captures output for diagnostics.

use crate::bundler::error::{Error, Result};
use std::ffi::{OsStr, OsString};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Upper bound on a single release step (detach, forced detach).
const CLEANUP_TIMEOUT: Duration = Duration::from_secs(60);

/// Cancellation and deadline shared by every external invocation of a build.
#[derive(Clone, Debug, Default)]
pub struct ExecContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl ExecContext {
    /// A context that never times out and is only cancelled explicitly.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a caller-owned cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Fails any tool still running `timeout` from now.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Context for release steps, which must run even after the build was
    /// cancelled. Not linked to this context's token.
    pub fn for_cleanup(&self) -> Self {
        Self::new().with_timeout(CLEANUP_TIMEOUT)
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Time left before the deadline, if one is set.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    async fn deadline_elapsed(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }
}

/// Output of a successful tool run.
#[derive(Debug)]
pub struct ToolOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Runs `program` with `args`, failing on non-zero exit.
///
/// The child is killed if the context is cancelled or its deadline passes.
/// A failed run reports stdout and stderr combined.
pub async fn run_tool<I, S>(ctx: &ExecContext, program: &str, args: I) -> Result<ToolOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<OsString> = args.into_iter().map(|a| a.as_ref().to_owned()).collect();
    let command = describe(program, &args);

    if ctx.is_cancelled() {
        return Err(Error::Cancelled { command });
    }

    log::debug!("running {}", command);

    let child = Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|error| Error::ToolSpawn {
            command: command.clone(),
            error,
        })?;

    let output: Output = tokio::select! {
        output = child.wait_with_output() => output.map_err(|error| Error::ToolSpawn {
            command: command.clone(),
            error,
        })?,
        _ = ctx.cancel.cancelled() => {
            log::warn!("cancelled {}", command);
            return Err(Error::Cancelled { command });
        }
        _ = ctx.deadline_elapsed() => {
            log::warn!("deadline exceeded for {}", command);
            return Err(Error::TimedOut { command });
        }
    };

    if !output.status.success() {
        return Err(Error::ToolFailed {
            command,
            status: output.status.to_string(),
            output: combined(&output.stdout, &output.stderr),
        });
    }

    Ok(ToolOutput {
        stdout: output.stdout,
        stderr: output.stderr,
    })
}

fn describe(program: &str, args: &[OsString]) -> String {
    let mut command = program.to_string();
    for arg in args {
        command.push(' ');
        command.push_str(&arg.to_string_lossy());
    }
    command
}

fn combined(stdout: &[u8], stderr: &[u8]) -> String {
    let stdout = String::from_utf8_lossy(stdout);
    let stderr = String::from_utf8_lossy(stderr);
    match (stdout.trim(), stderr.trim()) {
        ("", err) => err.to_string(),
        (out, "") => out.to_string(),
        (out, err) => format!("{out}\n{err}"),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn non_zero_exit_carries_combined_output() {
        let ctx = ExecContext::new();
        let err = run_tool(&ctx, "sh", ["-c", "echo out; echo err >&2; exit 3"])
            .await
            .unwrap_err();
        match err {
            Error::ToolFailed { command, output, .. } => {
                assert!(command.starts_with("sh -c"));
                assert_eq!(output, "out\nerr");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn success_returns_stdout() {
        let out = run_tool(&ExecContext::new(), "sh", ["-c", "printf hello"])
            .await
            .unwrap();
        assert_eq!(out.stdout, b"hello");
    }

    #[tokio::test]
    async fn cancelled_context_never_spawns() {
        let ctx = ExecContext::new();
        ctx.cancellation_token().cancel();
        let err = run_tool(&ctx, "sh", ["-c", "exit 0"]).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled { .. }));
    }

    #[tokio::test]
    async fn deadline_kills_slow_tool() {
        let ctx = ExecContext::new().with_timeout(Duration::from_millis(100));
        let err = run_tool(&ctx, "sleep", ["5"]).await.unwrap_err();
        assert!(matches!(err, Error::TimedOut { .. }));
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let err = run_tool(&ExecContext::new(), "definitely-not-a-real-tool-xyz", ["x"])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ToolSpawn { .. }));
    }
}
