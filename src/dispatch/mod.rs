// dispatch/mod.rs - Command Dispatcher

//! Executes `cmd` frames as child processes.
//!
//! The payload is split on whitespace into a program and its arguments;
//! there is no shell. The child gets a null stdin, is killed if the
//! dispatch is dropped, and is bounded by a timeout. How a non-zero exit,
//! a spawn failure or a timeout shows up in the result is decided by the
//! [`FailurePolicy`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::frame::CommandFrame;
use crate::observability;

/// How execution failures are reported back to the controller
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Failures produce `"error: <reason>"`
    #[default]
    Report,

    /// Always return trimmed stdout, possibly empty, whatever the outcome
    Silent,
}

/// Outcome of one execution
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecutionStatus {
    Succeeded,
    /// Non-zero exit; `None` when killed by a signal
    Failed { code: Option<i32> },
    SpawnFailed,
    TimedOut,
}

impl ExecutionStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionStatus::Succeeded)
    }

    fn label(&self) -> &'static str {
        match self {
            ExecutionStatus::Succeeded => "succeeded",
            ExecutionStatus::Failed { .. } => "failed",
            ExecutionStatus::SpawnFailed => "spawn_failed",
            ExecutionStatus::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result to be encoded and published back
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResultMessage {
    pub content: String,
    pub status: ExecutionStatus,
}

/// Runs commands carried by frames
#[derive(Clone, Debug)]
pub struct CommandDispatcher {
    timeout: Duration,
    policy: FailurePolicy,
}

impl CommandDispatcher {
    pub fn new(timeout: Duration, policy: FailurePolicy) -> Self {
        Self { timeout, policy }
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Handle one frame.
    ///
    /// Returns `None` for any message type other than `cmd`.
    pub async fn dispatch(&self, frame: &CommandFrame) -> Option<ResultMessage> {
        if !frame.is_command() {
            info!(
                sender = %frame.sender_label,
                message_type = %frame.message_type,
                "Unsupported message type, dropped"
            );
            return None;
        }

        info!(sender = %frame.sender_label, command = %frame.payload, "Executing command");
        let started = Instant::now();
        let result = self.execute(&frame.payload).await;
        observability::record_command_executed(result.status.label(), started.elapsed());
        Some(result)
    }

    /// Run a command line and shape the output according to the policy
    pub async fn execute(&self, command_line: &str) -> ResultMessage {
        let mut argv = command_line.split_whitespace();
        let Some(program) = argv.next() else {
            return self.failure(ExecutionStatus::SpawnFailed, "empty command", String::new());
        };

        let child = Command::new(program)
            .args(argv)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, child).await {
            Err(_) => {
                warn!(program, timeout = ?self.timeout, "Command timed out");
                let reason = format!("timed out after {}s", self.timeout.as_secs_f64());
                return self.failure(ExecutionStatus::TimedOut, &reason, String::new());
            }
            Ok(Err(e)) => {
                warn!(program, error = %e, "Command failed to start");
                return self.failure(ExecutionStatus::SpawnFailed, &e.to_string(), String::new());
            }
            Ok(Ok(output)) => output,
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if output.status.success() {
            debug!(program, bytes = stdout.len(), "Command succeeded");
            return ResultMessage {
                content: stdout,
                status: ExecutionStatus::Succeeded,
            };
        }

        let code = output.status.code();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        warn!(program, ?code, "Command exited unsuccessfully");

        let mut reason = match code {
            Some(code) => format!("exit status {}", code),
            None => "terminated by signal".to_string(),
        };
        if !stderr.is_empty() {
            reason.push_str(": ");
            reason.push_str(&stderr);
        }
        self.failure(ExecutionStatus::Failed { code }, &reason, stdout)
    }

    fn failure(&self, status: ExecutionStatus, reason: &str, stdout: String) -> ResultMessage {
        let content = match self.policy {
            FailurePolicy::Report => format!("error: {}", reason),
            FailurePolicy::Silent => stdout,
        };
        ResultMessage { content, status }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame;

    fn dispatcher(policy: FailurePolicy) -> CommandDispatcher {
        CommandDispatcher::new(Duration::from_secs(10), policy)
    }

    #[tokio::test]
    async fn test_parsed_frame_executes_and_trims() {
        let frame = frame::parse(b"node-42: cmd: echo hi").unwrap();
        assert_eq!(frame, CommandFrame::new("node-42", "cmd", "echo hi"));

        let result = dispatcher(FailurePolicy::Report).dispatch(&frame).await.unwrap();
        assert_eq!(result.content, "hi");
        assert_eq!(result.status, ExecutionStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_other_message_types_produce_nothing() {
        let frame = CommandFrame::new("node-1", "ping", "echo hi");
        assert!(dispatcher(FailurePolicy::Report).dispatch(&frame).await.is_none());
    }

    #[tokio::test]
    async fn test_nonzero_exit_reported() {
        let result = dispatcher(FailurePolicy::Report)
            .execute("ls /definitely/not/a/real/path")
            .await;
        assert!(matches!(result.status, ExecutionStatus::Failed { code: Some(c) } if c != 0));
        assert!(result.content.starts_with("error: exit status"));
        assert!(result.content.len() > "error: exit status 2".len());
    }

    #[tokio::test]
    async fn test_nonzero_exit_silent() {
        let result = dispatcher(FailurePolicy::Silent).execute("false").await;
        assert!(matches!(result.status, ExecutionStatus::Failed { .. }));
        assert_eq!(result.content, "");
    }

    #[tokio::test]
    async fn test_missing_program() {
        let report = dispatcher(FailurePolicy::Report)
            .execute("cmdmesh-no-such-program --flag")
            .await;
        assert_eq!(report.status, ExecutionStatus::SpawnFailed);
        assert!(report.content.starts_with("error: "));

        let silent = dispatcher(FailurePolicy::Silent)
            .execute("cmdmesh-no-such-program")
            .await;
        assert_eq!(silent.status, ExecutionStatus::SpawnFailed);
        assert!(silent.content.is_empty());
    }

    #[tokio::test]
    async fn test_empty_payload() {
        let result = dispatcher(FailurePolicy::Report).execute("   ").await;
        assert_eq!(result.status, ExecutionStatus::SpawnFailed);
        assert_eq!(result.content, "error: empty command");
    }

    #[tokio::test]
    async fn test_timeout_kills_command() {
        let dispatcher = CommandDispatcher::new(Duration::from_millis(100), FailurePolicy::Report);
        let started = Instant::now();
        let result = dispatcher.execute("sleep 5").await;
        assert_eq!(result.status, ExecutionStatus::TimedOut);
        assert!(result.content.starts_with("error: timed out"));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_no_shell_interpretation() {
        let result = dispatcher(FailurePolicy::Report)
            .execute("echo $HOME; rm -rf /tmp/x")
            .await;
        assert_eq!(result.content, "$HOME; rm -rf /tmp/x");
    }

    #[test]
    fn test_policy_serde() {
        #[derive(Deserialize)]
        struct Wrapper {
            policy: FailurePolicy,
        }
        let w: Wrapper = serde_json::from_str(r#"{"policy":"silent"}"#).unwrap();
        assert_eq!(w.policy, FailurePolicy::Silent);
        assert_eq!(FailurePolicy::default(), FailurePolicy::Report);
    }
}
