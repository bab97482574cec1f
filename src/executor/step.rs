//! Step execution
//!
//! Runs a single unit of work as an external command with captured
//! output, exit status, and elapsed time. A nonzero exit is a `failed`
//! result, not an engine fault; only a process that cannot be started at
//! all raises [`EngineError::Launch`]. Timeouts and aborts terminate the
//! process and produce their own distinct outcomes so the runner can tell
//! them apart from ordinary failures.

use crate::executor::abort::AbortSignal;
use crate::graph::context::EnvContext;
use crate::graph::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant, SystemTime};
use tokio::io::AsyncReadExt;
use tokio::process::Command;

/// Marker appended to captured output that hit the buffer limit
pub const TRUNCATION_MARKER: &str = "\n...[output truncated]";

/// Terminal outcome of one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepOutcome {
    /// Exit status zero, or a configured ok exit code
    Succeeded,
    /// Nonzero exit status
    Failed,
    /// Forcibly terminated after the timeout elapsed
    TimedOut,
    /// Forcibly terminated by the run-wide abort signal
    Aborted,
}

impl StepOutcome {
    /// Returns true if the step succeeded
    #[must_use]
    pub fn is_succeeded(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Result record of one executed step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Step name as shown in the report
    pub name: String,
    /// The command after `${VAR}` expansion
    pub command: String,
    /// Terminal outcome
    pub outcome: StepOutcome,
    /// Exit code when the process exited on its own
    pub exit_code: Option<i32>,
    /// Captured standard output, possibly truncated
    pub stdout: String,
    /// Captured standard error, possibly truncated
    pub stderr: String,
    /// Wall-clock start time
    pub started_at: SystemTime,
    /// Elapsed execution time
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        u64::try_from(d.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Executes single steps as external shell commands
#[derive(Debug, Clone)]
pub struct StepExecutor {
    shell: String,
    output_limit: usize,
}

impl StepExecutor {
    /// Creates an executor with the given shell and per-stream capture limit
    #[must_use]
    pub fn new(shell: impl Into<String>, output_limit: usize) -> Self {
        Self {
            shell: shell.into(),
            output_limit,
        }
    }

    /// Runs one command to completion.
    ///
    /// `ok_exit_codes` lists nonzero codes additionally treated as
    /// success, for collaborators with exit-code policies.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Launch`] if the process cannot be spawned
    /// and [`EngineError::Io`] if waiting on it fails. Nonzero exits,
    /// timeouts, and aborts are reported in the record, not as errors.
    pub async fn run(
        &self,
        name: &str,
        command: &str,
        ok_exit_codes: &[i32],
        context: &EnvContext,
        timeout: Duration,
        abort: &AbortSignal,
    ) -> Result<StepRecord, EngineError> {
        let expanded = context.expand(command);
        let started_at = SystemTime::now();
        let start = Instant::now();

        tracing::debug!(step = name, command = %expanded, "Executing step");

        let mut child = Command::new(&self.shell)
            .arg("-c")
            .arg(&expanded)
            .envs(context.snapshot())
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Launch {
                command: expanded.clone(),
                reason: e.to_string(),
            })?;

        // Capture both streams concurrently so a chatty process never
        // blocks on an unread pipe.
        let limit = self.output_limit;
        let stdout_task = child
            .stdout
            .take()
            .map(|r| tokio::spawn(read_capped(r, limit)));
        let stderr_task = child
            .stderr
            .take()
            .map(|r| tokio::spawn(read_capped(r, limit)));

        enum WaitResult {
            Exited(std::process::ExitStatus),
            TimedOut,
            Aborted,
        }

        let waited = tokio::select! {
            status = child.wait() => WaitResult::Exited(status?),
            () = tokio::time::sleep(timeout) => {
                let _ = child.kill().await;
                WaitResult::TimedOut
            }
            () = abort.cancelled() => {
                let _ = child.kill().await;
                WaitResult::Aborted
            }
        };

        let stdout = join_capture(stdout_task).await;
        let stderr = join_capture(stderr_task).await;
        let duration = start.elapsed();

        let (outcome, exit_code) = match waited {
            WaitResult::Exited(status) => {
                let code = status.code().unwrap_or(-1);
                if code == 0 || ok_exit_codes.contains(&code) {
                    (StepOutcome::Succeeded, Some(code))
                } else {
                    (StepOutcome::Failed, Some(code))
                }
            }
            WaitResult::TimedOut => {
                tracing::warn!(step = name, ?timeout, "Step timed out, process killed");
                (StepOutcome::TimedOut, None)
            }
            WaitResult::Aborted => {
                tracing::warn!(step = name, "Step aborted, process killed");
                (StepOutcome::Aborted, None)
            }
        };

        tracing::debug!(
            step = name,
            ?outcome,
            duration_ms = duration.as_millis(),
            "Step finished"
        );

        Ok(StepRecord {
            name: name.to_string(),
            command: expanded,
            outcome,
            exit_code,
            stdout,
            stderr,
            started_at,
            duration,
        })
    }
}

/// Reads a stream to EOF, keeping at most `limit` bytes.
///
/// The stream keeps being drained after the limit is hit so the child is
/// never blocked writing to a full pipe.
async fn read_capped<R: tokio::io::AsyncRead + Unpin>(mut reader: R, limit: usize) -> String {
    let mut kept: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 8192];
    let mut truncated = false;

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if kept.len() < limit {
                    let take = n.min(limit - kept.len());
                    kept.extend_from_slice(&chunk[..take]);
                    if take < n {
                        truncated = true;
                    }
                } else {
                    truncated = true;
                }
            }
        }
    }

    let mut text = String::from_utf8_lossy(&kept).into_owned();
    if truncated {
        text.push_str(TRUNCATION_MARKER);
    }
    text
}

async fn join_capture(task: Option<tokio::task::JoinHandle<String>>) -> String {
    match task {
        Some(handle) => handle.await.unwrap_or_default(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor() -> StepExecutor {
        StepExecutor::new("sh", 64 * 1024)
    }

    fn ctx() -> EnvContext {
        EnvContext::new(
            [("GREETING".to_string(), "hello".to_string())],
            std::iter::empty(),
        )
    }

    #[tokio::test]
    async fn test_successful_command() {
        let record = executor()
            .run(
                "greet",
                "echo ${GREETING}",
                &[],
                &ctx(),
                Duration::from_secs(5),
                &AbortSignal::new(),
            )
            .await
            .unwrap();

        assert_eq!(record.outcome, StepOutcome::Succeeded);
        assert_eq!(record.exit_code, Some(0));
        assert_eq!(record.stdout.trim(), "hello");
        assert_eq!(record.command, "echo hello");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_failed_result_not_error() {
        let record = executor()
            .run(
                "boom",
                "exit 3",
                &[],
                &ctx(),
                Duration::from_secs(5),
                &AbortSignal::new(),
            )
            .await
            .unwrap();

        assert_eq!(record.outcome, StepOutcome::Failed);
        assert_eq!(record.exit_code, Some(3));
    }

    #[tokio::test]
    async fn test_ok_exit_codes_treated_as_success() {
        let record = executor()
            .run(
                "scan",
                "exit 4",
                &[4, 5],
                &ctx(),
                Duration::from_secs(5),
                &AbortSignal::new(),
            )
            .await
            .unwrap();

        assert_eq!(record.outcome, StepOutcome::Succeeded);
        assert_eq!(record.exit_code, Some(4));
    }

    #[tokio::test]
    async fn test_timeout_is_distinct_from_failure() {
        let record = executor()
            .run(
                "slow",
                "sleep 30",
                &[],
                &ctx(),
                Duration::from_millis(100),
                &AbortSignal::new(),
            )
            .await
            .unwrap();

        assert_eq!(record.outcome, StepOutcome::TimedOut);
        assert_eq!(record.exit_code, None);
        assert!(record.duration < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_abort_kills_running_process() {
        let abort = AbortSignal::new();
        let trigger = abort.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.trigger("operator cancel");
        });

        let record = executor()
            .run(
                "slow",
                "sleep 30",
                &[],
                &ctx(),
                Duration::from_secs(60),
                &abort,
            )
            .await
            .unwrap();

        assert_eq!(record.outcome, StepOutcome::Aborted);
        assert!(record.duration < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_launch_error_when_shell_missing() {
        let executor = StepExecutor::new("/nonexistent/shell", 1024);
        let err = executor
            .run(
                "any",
                "true",
                &[],
                &ctx(),
                Duration::from_secs(5),
                &AbortSignal::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Launch { .. }));
    }

    #[tokio::test]
    async fn test_output_truncated_with_marker() {
        let executor = StepExecutor::new("sh", 32);
        let record = executor
            .run(
                "chatty",
                "yes x | head -c 4096",
                &[],
                &ctx(),
                Duration::from_secs(10),
                &AbortSignal::new(),
            )
            .await
            .unwrap();

        assert_eq!(record.outcome, StepOutcome::Succeeded);
        assert!(record.stdout.ends_with(TRUNCATION_MARKER));
        assert!(record.stdout.len() < 4096);
    }

    #[tokio::test]
    async fn test_stderr_captured_separately() {
        let record = executor()
            .run(
                "warns",
                "echo out; echo warn >&2",
                &[],
                &ctx(),
                Duration::from_secs(5),
                &AbortSignal::new(),
            )
            .await
            .unwrap();

        assert_eq!(record.stdout.trim(), "out");
        assert_eq!(record.stderr.trim(), "warn");
    }

    #[tokio::test]
    async fn test_overlay_env_visible_to_process() {
        let base = ctx();
        let scoped = base.overlaid([("TOKEN".to_string(), "sekrit".to_string())]);
        let record = executor()
            .run(
                "secret",
                "printf %s \"$TOKEN\"",
                &[],
                &scoped,
                Duration::from_secs(5),
                &AbortSignal::new(),
            )
            .await
            .unwrap();

        assert_eq!(record.stdout, "sekrit");
    }

    #[test]
    fn test_record_serializes_to_json() {
        let record = StepRecord {
            name: "build".to_string(),
            command: "make".to_string(),
            outcome: StepOutcome::Succeeded,
            exit_code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
            started_at: SystemTime::UNIX_EPOCH,
            duration: Duration::from_millis(1500),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["outcome"], "succeeded");
        assert_eq!(json["duration"], 1500);
    }
}
