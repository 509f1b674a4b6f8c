//! Single-command execution types.

use std::{fmt, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message carried by a result whose execution was cancelled by the caller.
pub const CANCELLED_MESSAGE: &str = "Execution was cancelled by user";

/// Generic message for results whose process could not be run.
pub const EXECUTION_FAILED_MESSAGE: &str = "Command execution failed";

/// Platform a command targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Platform {
    /// Windows, executed with PowerShell.
    #[default]
    Windows,
    /// Linux, executed with Bash.
    Linux,
    /// Either platform. Resolved to the host's native shell at execution time.
    Both,
}

impl Platform {
    /// Resolve `Both` to the platform of the running host.
    #[must_use]
    pub const fn resolve_for_host(self) -> Self {
        match self {
            Self::Both => {
                if cfg!(windows) {
                    Self::Windows
                } else {
                    Self::Linux
                }
            }
            other => other,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Windows => "Windows",
            Self::Linux => "Linux",
            Self::Both => "Both",
        };
        f.write_str(name)
    }
}

/// A single line of process output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputLine {
    pub text: String,
    /// Whether the line came from stderr.
    pub is_error: bool,
    pub timestamp: DateTime<Utc>,
}

impl OutputLine {
    /// Create a line stamped with the current time.
    #[must_use]
    pub fn new(text: impl Into<String>, is_error: bool) -> Self {
        Self {
            text: text.into(),
            is_error,
            timestamp: Utc::now(),
        }
    }

    /// Create a stdout line.
    #[must_use]
    pub fn stdout(text: impl Into<String>) -> Self {
        Self::new(text, false)
    }

    /// Create a stderr line.
    #[must_use]
    pub fn stderr(text: impl Into<String>) -> Self {
        Self::new(text, true)
    }
}

/// How an execution ended. Exactly one holds for every [`ExecutionResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// The process ran to completion and reported an exit code.
    Exited,
    /// The caller's cancellation token fired first.
    Cancelled,
    /// The per-call timeout fired first.
    TimedOut,
    /// The process could not be started or awaited.
    FailedToStart,
}

/// Result of executing one command.
///
/// Built once by the executor and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// Process exit code, `-1` when the process did not exit on its own.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Wall-clock time from just before spawn to return.
    pub duration: Duration,
    /// `true` only for a normal exit with code 0.
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub was_cancelled: bool,
    pub timed_out: bool,
    /// Set for every outcome except a normal exit.
    pub error_message: Option<String>,
}

impl ExecutionResult {
    /// A process that exited on its own.
    #[must_use]
    pub const fn exited(
        started_at: DateTime<Utc>,
        exit_code: i32,
        stdout: String,
        stderr: String,
        duration: Duration,
    ) -> Self {
        Self {
            exit_code,
            stdout,
            stderr,
            duration,
            success: exit_code == 0,
            started_at,
            was_cancelled: false,
            timed_out: false,
            error_message: None,
        }
    }

    /// A process killed because the caller cancelled.
    #[must_use]
    pub fn cancelled(
        started_at: DateTime<Utc>,
        stdout: String,
        stderr: String,
        duration: Duration,
    ) -> Self {
        Self {
            exit_code: -1,
            stdout,
            stderr,
            duration,
            success: false,
            started_at,
            was_cancelled: true,
            timed_out: false,
            error_message: Some(CANCELLED_MESSAGE.to_string()),
        }
    }

    /// A process killed because it outlived `timeout_seconds`.
    #[must_use]
    pub fn timed_out(
        started_at: DateTime<Utc>,
        timeout_seconds: u64,
        stdout: String,
        stderr: String,
        duration: Duration,
    ) -> Self {
        Self {
            exit_code: -1,
            stdout,
            stderr,
            duration,
            success: false,
            started_at,
            was_cancelled: false,
            timed_out: true,
            error_message: Some(format!(
                "Execution timed out after {timeout_seconds} seconds"
            )),
        }
    }

    /// A process that could not be started. `detail` lands in `stderr` only.
    #[must_use]
    pub fn failed_to_start(
        started_at: DateTime<Utc>,
        detail: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            exit_code: -1,
            stdout: String::new(),
            stderr: detail.into(),
            duration,
            success: false,
            started_at,
            was_cancelled: false,
            timed_out: false,
            error_message: Some(EXECUTION_FAILED_MESSAGE.to_string()),
        }
    }

    /// Classify how the execution ended.
    #[must_use]
    pub const fn outcome(&self) -> ExecutionOutcome {
        if self.was_cancelled {
            ExecutionOutcome::Cancelled
        } else if self.timed_out {
            ExecutionOutcome::TimedOut
        } else if self.error_message.is_some() {
            ExecutionOutcome::FailedToStart
        } else {
            ExecutionOutcome::Exited
        }
    }
}
