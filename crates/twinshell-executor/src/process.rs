//! Single-command process executor.

use std::{
    path::PathBuf,
    process::Stdio,
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use command_group::{AsyncCommandGroup, AsyncGroupChild};
use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::Command,
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use twinshell_core::{CommandExecutor, ExecutionResult, OutputCallback, OutputLine, Platform};

use crate::command::{CommandBuildError, ShellInvocation};

/// How long to wait for output readers once the process is gone.
///
/// A detached grandchild can keep a pipe open after the shell exits.
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Executor error. Never leaves this module as an error value.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Command build error: {0}")]
    CommandBuild(#[from] CommandBuildError),
    #[error("Spawn failed: {0}")]
    SpawnFailed(#[source] std::io::Error),
    #[error("Wait failed: {0}")]
    WaitFailed(#[source] std::io::Error),
}

/// How the race between exit, cancellation and timeout ended.
enum Race {
    Exited(std::io::Result<std::process::ExitStatus>),
    Interrupted,
}

/// Runs commands as child process groups of PowerShell or Bash.
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor {
    working_dir: Option<PathBuf>,
}

impl ProcessExecutor {
    /// Create an executor that inherits the current directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run commands in `dir`.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    #[allow(clippy::too_many_arguments)]
    async fn run(
        &self,
        command: &str,
        platform: Platform,
        cancel: &CancellationToken,
        timeout_seconds: u64,
        on_output: Option<OutputCallback>,
        started_at: DateTime<Utc>,
        start: Instant,
    ) -> Result<ExecutionResult, ExecutorError> {
        let invocation = ShellInvocation::new(command, platform)?;
        tracing::debug!(
            shell = %invocation.shell(),
            invocation = %invocation.display_line(),
            timeout_seconds,
            "Spawning command"
        );
        let parts = invocation.into_resolved().await?;

        let mut cmd = Command::new(&parts.program);
        cmd.args(&parts.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        // The group builder owns the creation flags on Windows.
        #[cfg(windows)]
        let spawned = cmd.group().creation_flags(CREATE_NO_WINDOW).spawn();
        #[cfg(not(windows))]
        let spawned = cmd.group_spawn();
        let mut child = spawned.map_err(ExecutorError::SpawnFailed)?;

        let stdout_buf = Arc::new(Mutex::new(String::new()));
        let stderr_buf = Arc::new(Mutex::new(String::new()));
        let readers = [
            child.inner().stdout.take().map(|out| {
                spawn_line_reader(out, false, Arc::clone(&stdout_buf), on_output.clone())
            }),
            child.inner().stderr.take().map(|err| {
                spawn_line_reader(err, true, Arc::clone(&stderr_buf), on_output.clone())
            }),
        ];

        let timeout_seconds = timeout_seconds.max(1);
        let timeout = Duration::from_secs(timeout_seconds);
        let race = tokio::select! {
            biased;
            status = child.wait() => Race::Exited(status),
            () = cancel.cancelled() => Race::Interrupted,
            () = tokio::time::sleep(timeout) => Race::Interrupted,
        };

        match race {
            Race::Exited(Ok(status)) => {
                drain_readers(readers).await;
                let exit_code = status.code().unwrap_or(-1);
                tracing::debug!(exit_code, "Command exited");
                Ok(ExecutionResult::exited(
                    started_at,
                    exit_code,
                    take(&stdout_buf),
                    take(&stderr_buf),
                    start.elapsed(),
                ))
            }
            Race::Exited(Err(e)) => {
                kill_group(&mut child).await;
                drain_readers(readers).await;
                Err(ExecutorError::WaitFailed(e))
            }
            Race::Interrupted => {
                kill_group(&mut child).await;
                drain_readers(readers).await;
                // The caller's token wins when both fired.
                if cancel.is_cancelled() {
                    tracing::debug!("Command cancelled by caller");
                    Ok(ExecutionResult::cancelled(
                        started_at,
                        take(&stdout_buf),
                        take(&stderr_buf),
                        start.elapsed(),
                    ))
                } else {
                    tracing::debug!(timeout_seconds, "Command timed out");
                    Ok(ExecutionResult::timed_out(
                        started_at,
                        timeout_seconds,
                        take(&stdout_buf),
                        take(&stderr_buf),
                        start.elapsed(),
                    ))
                }
            }
        }
    }
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn execute(
        &self,
        command: &str,
        platform: Platform,
        cancel: &CancellationToken,
        timeout_seconds: u64,
        on_output: Option<OutputCallback>,
    ) -> ExecutionResult {
        let started_at = Utc::now();
        let start = Instant::now();

        if cancel.is_cancelled() {
            return ExecutionResult::cancelled(
                started_at,
                String::new(),
                String::new(),
                start.elapsed(),
            );
        }

        match self
            .run(command, platform, cancel, timeout_seconds, on_output, started_at, start)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, %platform, "Command execution failed");
                ExecutionResult::failed_to_start(started_at, e.to_string(), start.elapsed())
            }
        }
    }
}

/// Kill the whole process group. Failures are ignored.
async fn kill_group(child: &mut AsyncGroupChild) {
    if let Err(e) = child.kill().await {
        tracing::debug!(error = %e, "Failed to kill process group");
    }
}

fn spawn_line_reader<R>(
    reader: R,
    is_error: bool,
    buffer: Arc<Mutex<String>>,
    on_output: Option<OutputCallback>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut raw = Vec::new();
        loop {
            raw.clear();
            match reader.read_until(b'\n', &mut raw).await {
                Ok(0) => break, // EOF
                Ok(_) => {
                    let text = String::from_utf8_lossy(&raw);
                    let line = text.trim_end_matches(['\n', '\r']);
                    if line.is_empty() {
                        continue;
                    }
                    {
                        let mut buf = buffer.lock().unwrap_or_else(PoisonError::into_inner);
                        buf.push_str(line);
                        buf.push('\n');
                    }
                    if let Some(callback) = &on_output {
                        callback(OutputLine::new(line, is_error));
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, is_error, "Output reader stopped");
                    break;
                }
            }
        }
    })
}

async fn drain_readers(readers: [Option<JoinHandle<()>>; 2]) {
    // One deadline covers both pipes.
    let deadline = tokio::time::Instant::now() + READER_DRAIN_TIMEOUT;
    for mut handle in readers.into_iter().flatten() {
        if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
            tracing::warn!("Output pipe still open after process end, abandoning reader");
            handle.abort();
        }
    }
}

fn take(buffer: &Mutex<String>) -> String {
    std::mem::take(&mut *buffer.lock().unwrap_or_else(PoisonError::into_inner))
}
