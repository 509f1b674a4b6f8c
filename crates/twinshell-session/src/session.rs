//! UI-facing execution session.
//!
//! One [`ExecutionSession`] drives a single command at a time through
//! `Idle -> Requested -> Confirming -> Running -> <terminal> -> Idle`,
//! publishing its state on a `watch` channel and its output on an
//! [`OutputLog`]. A new request supersedes the one in flight.

use std::{
    fmt::Display,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use chrono::Local;
use thiserror::Error;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tokio_util::sync::CancellationToken;
use twinshell_core::{
    CommandExecutor, CommandHistoryStore, ExecutionOutcome, ExecutionResult, OutputCallback,
    OutputLine, OutputLog, SettingsProvider,
};
use twinshell_executor::ProcessExecutor;

use crate::{
    confirm::{AutoDecline, ConfirmationDecision, ConfirmationHandler, ConfirmationPrompt},
    request::ExecuteRequest,
};

/// Refresh period of the elapsed-time display.
const TICK_INTERVAL: Duration = Duration::from_millis(250);

pub const STATUS_READY: &str = "Ready";
pub const STATUS_EXECUTING: &str = "Executing...";
pub const STATUS_COMPLETED: &str = "Execution completed successfully";
pub const STATUS_FAILED: &str = "Execution failed";
pub const STATUS_ERROR: &str = "Execution error";

/// Line written when the user declines a dangerous command.
pub const DECLINED_LINE: &str = "Execution cancelled by user";

const SUMMARY_RULE: &str = "─────────────────────────────────────";

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Requested,
    Confirming,
    Running,
    Completed,
    Cancelled,
    TimedOut,
    Failed,
}

impl SessionState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Cancelled | Self::TimedOut | Self::Failed
        )
    }

    /// Terminal state reached by a finished execution.
    #[must_use]
    pub const fn from_result(result: &ExecutionResult) -> Self {
        match result.outcome() {
            ExecutionOutcome::Exited if result.success => Self::Completed,
            ExecutionOutcome::Exited | ExecutionOutcome::FailedToStart => Self::Failed,
            ExecutionOutcome::Cancelled => Self::Cancelled,
            ExecutionOutcome::TimedOut => Self::TimedOut,
        }
    }
}

/// Observable view of the session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    /// Terminal state of the most recent run.
    pub last_outcome: Option<SessionState>,
    pub status_message: String,
    /// 0 while running, 100 once a run has finished.
    pub progress: f64,
    /// Elapsed time of the current or last run, `MM:SS`.
    pub elapsed: String,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
            last_outcome: None,
            status_message: STATUS_READY.to_string(),
            progress: 0.0,
            elapsed: format_elapsed(Duration::ZERO),
        }
    }
}

impl SessionSnapshot {
    #[must_use]
    pub const fn is_executing(&self) -> bool {
        matches!(self.state, SessionState::Running)
    }
}

/// Caller misuse. Everything else is reported through [`RunOutcome`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("No command to execute")]
    EmptyCommand,
    #[error("Session has been disposed")]
    Disposed,
}

/// How a call to [`ExecutionSession::execute`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The user declined a dangerous command; nothing was spawned.
    Declined,
    /// A newer request took over before this one started running.
    Superseded,
    /// The executor ran and returned a result.
    Finished(ExecutionResult),
    /// A collaborator failed; details were logged, not shown.
    Errored,
}

#[derive(Default)]
struct RunSlot {
    cancel: Option<CancellationToken>,
    ticker: Option<JoinHandle<()>>,
}

impl RunSlot {
    fn stop_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }

    fn release(&mut self, cancel: bool) {
        if let Some(token) = self.cancel.take() {
            if cancel {
                token.cancel();
            }
        }
        self.stop_ticker();
    }
}

/// Runs one command at a time on behalf of a UI.
pub struct ExecutionSession {
    executor: Arc<dyn CommandExecutor>,
    history: Arc<dyn CommandHistoryStore>,
    settings: Arc<dyn SettingsProvider>,
    confirmation: Arc<dyn ConfirmationHandler>,
    output: Arc<OutputLog>,
    state: Arc<watch::Sender<SessionSnapshot>>,
    /// Cancellation source and ticker of the current run. Shared by
    /// `cancel`, `dispose` and the run itself.
    run: Mutex<RunSlot>,
    /// Identifies the current run; stale runs stop touching the UI.
    current: Arc<AtomicU64>,
    disposed: AtomicBool,
}

impl ExecutionSession {
    /// Create a session. Dangerous commands are declined until a
    /// confirmation handler is installed with [`Self::with_confirmation`].
    #[must_use]
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        history: Arc<dyn CommandHistoryStore>,
        settings: Arc<dyn SettingsProvider>,
    ) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::default());
        Self {
            executor,
            history,
            settings,
            confirmation: Arc::new(AutoDecline),
            output: Arc::new(OutputLog::new()),
            state: Arc::new(state),
            run: Mutex::new(RunSlot::default()),
            current: Arc::new(AtomicU64::new(0)),
            disposed: AtomicBool::new(false),
        }
    }

    /// Session backed by a local [`ProcessExecutor`].
    #[must_use]
    pub fn with_process_executor(
        history: Arc<dyn CommandHistoryStore>,
        settings: Arc<dyn SettingsProvider>,
    ) -> Self {
        Self::new(Arc::new(ProcessExecutor::new()), history, settings)
    }

    #[must_use]
    pub fn with_confirmation(mut self, handler: Arc<dyn ConfirmationHandler>) -> Self {
        self.confirmation = handler;
        self
    }

    /// The session's output log.
    #[must_use]
    pub fn output(&self) -> Arc<OutputLog> {
        Arc::clone(&self.output)
    }

    /// Follow state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    /// Run `request`, superseding any run in flight.
    ///
    /// # Errors
    /// Returns error if the command is blank or the session was disposed.
    pub async fn execute(&self, request: ExecuteRequest) -> Result<RunOutcome, SessionError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(SessionError::Disposed);
        }
        if request.command.trim().is_empty() {
            return Err(SessionError::EmptyCommand);
        }

        let generation = self.supersede();
        self.state.send_modify(|s| s.state = SessionState::Requested);

        let settings = match self.settings.load_settings().await {
            Ok(settings) => settings,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load settings");
                return Ok(self.fail_run(generation));
            }
        };

        if request.needs_confirmation() && settings.confirm_dangerous_actions {
            self.state.send_modify(|s| s.state = SessionState::Confirming);
            let prompt = ConfirmationPrompt::for_command(&request.command, request.platform);
            let decision = match self.confirmation.confirm(&prompt).await {
                Ok(decision) => decision,
                Err(e) => {
                    tracing::warn!(error = %e, "Confirmation failed, treating as declined");
                    ConfirmationDecision::Declined
                }
            };
            if decision != ConfirmationDecision::Accepted {
                tracing::info!(command = %request.command, "Dangerous command declined");
                if self.is_current(generation) {
                    self.output.push(OutputLine::stderr(DECLINED_LINE));
                    self.state.send_modify(|s| s.state = SessionState::Idle);
                }
                return Ok(RunOutcome::Declined);
            }
        }

        let started = Instant::now();
        let Some(cancel) = self.start_run(generation, started) else {
            return Ok(RunOutcome::Superseded);
        };
        let timeout_seconds = settings.effective_timeout_seconds();

        let history_id = match request.history_record() {
            Some(record) => match self.history.add_command(record).await {
                Ok(id) => Some(id),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to open history entry");
                    return Ok(self.fail_run(generation));
                }
            },
            None => None,
        };

        self.output
            .push_text(stamp(format_args!("Executing command: {}", request.command)), false);
        self.output
            .push_text(stamp(format_args!("Platform: {}", request.platform)), false);
        self.output
            .push_text(stamp(format_args!("Timeout: {timeout_seconds} seconds")), false);
        self.output.push_text("", false);

        let received = Arc::new(AtomicBool::new(false));
        let on_output: OutputCallback = {
            let output = Arc::clone(&self.output);
            let current = Arc::clone(&self.current);
            let received = Arc::clone(&received);
            Arc::new(move |line: OutputLine| {
                if current.load(Ordering::Acquire) == generation {
                    received.store(true, Ordering::Release);
                    output.push(line);
                }
            })
        };

        tracing::info!(
            command = %request.command,
            platform = %request.platform,
            timeout_seconds,
            "Executing command"
        );
        let result = self
            .executor
            .execute(
                &request.command,
                request.platform,
                &cancel,
                timeout_seconds,
                Some(on_output),
            )
            .await;

        self.stop_ticker(generation, started);
        if self.is_current(generation) {
            if !received.load(Ordering::Acquire) {
                self.write_fallback(&result);
            }
            self.write_summary(&result);
        }

        if let Some(id) = history_id {
            let closed = self
                .history
                .update_with_execution_results(&id, result.exit_code, result.duration, result.success)
                .await;
            if let Err(e) = closed {
                tracing::error!(history_id = %id, error = %e, "Failed to close history entry");
                return Ok(self.fail_run(generation));
            }
        }

        self.finish_run(generation, &result);
        Ok(RunOutcome::Finished(result))
    }

    /// Cancel the run in flight. Returns whether anything was cancelled.
    pub fn cancel(&self) -> bool {
        let slot = self.lock_slot();
        match &slot.cancel {
            Some(token) if !token.is_cancelled() => {
                self.output.push_text(stamp("Cancelling execution..."), true);
                token.cancel();
                tracing::info!("Cancellation requested");
                true
            }
            _ => false,
        }
    }

    /// Reset the output log and the status display.
    pub fn clear_output(&self) {
        self.output.clear();
        self.state.send_modify(|s| {
            s.status_message = STATUS_READY.to_string();
            s.elapsed = format_elapsed(Duration::ZERO);
            s.progress = 0.0;
        });
    }

    /// Cancel any run in flight and refuse further requests.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut slot = self.lock_slot();
        slot.release(true);
        self.current.fetch_add(1, Ordering::AcqRel);
        tracing::debug!("Execution session disposed");
    }

    fn lock_slot(&self) -> MutexGuard<'_, RunSlot> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.current.load(Ordering::Acquire) == generation
    }

    /// Tear down the previous run and claim a new generation.
    fn supersede(&self) -> u64 {
        let mut slot = self.lock_slot();
        if slot.cancel.is_some() {
            tracing::debug!("Superseding run in flight");
        }
        slot.release(true);
        self.current.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Enter `Running`. `None` if a newer request took over meanwhile.
    fn start_run(&self, generation: u64, started: Instant) -> Option<CancellationToken> {
        let mut slot = self.lock_slot();
        if !self.is_current(generation) {
            return None;
        }

        let token = CancellationToken::new();
        slot.cancel = Some(token.clone());

        self.output.clear();
        self.state.send_modify(|s| {
            s.state = SessionState::Running;
            s.status_message = STATUS_EXECUTING.to_string();
            s.progress = 0.0;
            s.elapsed = format_elapsed(Duration::ZERO);
        });
        slot.ticker = Some(spawn_ticker(Arc::clone(&self.state), started));

        Some(token)
    }

    fn stop_ticker(&self, generation: u64, started: Instant) {
        let mut slot = self.lock_slot();
        if !self.is_current(generation) {
            return;
        }
        slot.stop_ticker();
        let elapsed = format_elapsed(started.elapsed());
        self.state.send_modify(|s| s.elapsed = elapsed);
    }

    fn finish_run(&self, generation: u64, result: &ExecutionResult) {
        let mut slot = self.lock_slot();
        if !self.is_current(generation) {
            return;
        }
        slot.release(false);
        drop(slot);

        let terminal = SessionState::from_result(result);
        let status = if result.success {
            STATUS_COMPLETED
        } else {
            STATUS_FAILED
        };
        tracing::info!(
            outcome = ?terminal,
            exit_code = result.exit_code,
            duration_ms = u64::try_from(result.duration.as_millis()).unwrap_or(u64::MAX),
            "Execution finished"
        );
        self.state.send_modify(|s| {
            s.state = terminal;
            s.last_outcome = Some(terminal);
            s.status_message = status.to_string();
            s.progress = 100.0;
        });
        self.state.send_modify(|s| s.state = SessionState::Idle);
    }

    fn fail_run(&self, generation: u64) -> RunOutcome {
        let mut slot = self.lock_slot();
        if !self.is_current(generation) {
            return RunOutcome::Errored;
        }
        slot.release(false);
        drop(slot);

        self.output.push_text("", false);
        self.output
            .push_text(stamp("ERROR: Command execution failed"), true);
        self.state.send_modify(|s| {
            s.state = SessionState::Failed;
            s.last_outcome = Some(SessionState::Failed);
            s.status_message = STATUS_ERROR.to_string();
        });
        self.state.send_modify(|s| s.state = SessionState::Idle);
        RunOutcome::Errored
    }

    /// Output of a run whose lines never came through the callback.
    fn write_fallback(&self, result: &ExecutionResult) {
        for line in non_empty_lines(&result.stdout) {
            self.output.push(OutputLine::stdout(line));
        }
        // Start failures carry diagnostics in stderr; those stay in the logs.
        if result.outcome() != ExecutionOutcome::FailedToStart {
            for line in non_empty_lines(&result.stderr) {
                self.output.push(OutputLine::stderr(line));
            }
        }
    }

    fn write_summary(&self, result: &ExecutionResult) {
        let failed = !result.success;
        self.output.push_text("", false);
        self.output.push_text(stamp(SUMMARY_RULE), false);
        self.output
            .push_text(stamp(format_args!("Exit Code: {}", result.exit_code)), failed);
        self.output.push_text(
            stamp(format_args!(
                "Duration: {:.2}s",
                result.duration.as_secs_f64()
            )),
            false,
        );
        let status = if result.success {
            "✓ SUCCESS"
        } else {
            "✗ FAILED"
        };
        self.output
            .push_text(stamp(format_args!("Status: {status}")), failed);

        match result.outcome() {
            ExecutionOutcome::Cancelled => {
                self.output
                    .push_text(stamp("⚠ Execution was cancelled"), true);
            }
            ExecutionOutcome::TimedOut => {
                self.output.push_text(stamp("⚠ Execution timed out"), true);
            }
            ExecutionOutcome::Exited | ExecutionOutcome::FailedToStart => {}
        }

        if let Some(message) = &result.error_message {
            self.output
                .push_text(stamp(format_args!("Error: {message}")), true);
        }
    }
}

impl Drop for ExecutionSession {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn spawn_ticker(state: Arc<watch::Sender<SessionSnapshot>>, started: Instant) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticks = interval(TICK_INTERVAL);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticks.tick().await;
            let elapsed = format_elapsed(started.elapsed());
            state.send_if_modified(|s| {
                if s.elapsed == elapsed {
                    false
                } else {
                    s.elapsed = elapsed;
                    true
                }
            });
        }
    })
}

/// `MM:SS`. Minutes keep counting past the hour.
#[must_use]
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

fn stamp(message: impl Display) -> String {
    format!("[{}] {message}", Local::now().format("%H:%M:%S"))
}

fn non_empty_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::atomic::AtomicUsize};

    use async_trait::async_trait;
    use chrono::Utc;
    use twinshell_core::{
        NewCommandHistory, Platform, SettingsProvider, StaticSettings, UserSettings,
        settings::SettingsError,
        traits::StorageError,
    };

    use super::*;
    use crate::{
        confirm::{AutoConfirm, ConfirmationError},
        storage::MemoryHistory,
    };

    /// Command that runs until cancelled.
    const BLOCK: &str = "block";

    #[derive(Default)]
    struct ScriptedExecutor {
        exit_codes: HashMap<String, i32>,
        /// Report output only in the result, never through the callback.
        silent: bool,
        timed_out: bool,
        calls: AtomicUsize,
        history: Option<Arc<MemoryHistory>>,
        history_seen: AtomicUsize,
    }

    #[async_trait]
    impl CommandExecutor for ScriptedExecutor {
        async fn execute(
            &self,
            command: &str,
            _platform: Platform,
            cancel: &CancellationToken,
            timeout_seconds: u64,
            on_output: Option<OutputCallback>,
        ) -> ExecutionResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(history) = &self.history {
                let open = history.recent(10).await.unwrap().len();
                self.history_seen.store(open, Ordering::SeqCst);
            }
            let started_at = Utc::now();

            if command == BLOCK {
                tokio::time::timeout(Duration::from_secs(5), cancel.cancelled())
                    .await
                    .unwrap();
                return ExecutionResult::cancelled(
                    started_at,
                    String::new(),
                    String::new(),
                    Duration::from_millis(20),
                );
            }
            if self.timed_out {
                return ExecutionResult::timed_out(
                    started_at,
                    timeout_seconds,
                    String::new(),
                    String::new(),
                    Duration::from_secs(timeout_seconds),
                );
            }

            let stdout = format!("out: {command}\n");
            let stderr = "warn: noisy\n".to_string();
            if let Some(callback) = on_output.filter(|_| !self.silent) {
                callback(OutputLine::stdout(format!("out: {command}")));
                callback(OutputLine::stderr("warn: noisy"));
            }
            let code = self.exit_codes.get(command).copied().unwrap_or(0);
            ExecutionResult::exited(
                started_at,
                code,
                stdout,
                stderr,
                Duration::from_millis(12),
            )
        }
    }

    struct BrokenSettings;

    #[async_trait]
    impl SettingsProvider for BrokenSettings {
        async fn load_settings(&self) -> Result<UserSettings, SettingsError> {
            Err(SettingsError::Parse {
                path: "settings.json".into(),
                source: serde_json::from_str::<UserSettings>("{").unwrap_err(),
            })
        }
    }

    struct BrokenHistory;

    #[async_trait]
    impl CommandHistoryStore for BrokenHistory {
        async fn add_command(&self, _entry: NewCommandHistory) -> Result<String, StorageError> {
            Err(StorageError::Internal("database is locked".into()))
        }

        async fn update_with_execution_results(
            &self,
            _history_id: &str,
            _exit_code: i32,
            _duration: Duration,
            _success: bool,
        ) -> Result<(), StorageError> {
            Ok(())
        }

        async fn get(&self, _history_id: &str) -> Result<Option<twinshell_core::CommandHistoryEntry>, StorageError> {
            Ok(None)
        }

        async fn recent(&self, _count: usize) -> Result<Vec<twinshell_core::CommandHistoryEntry>, StorageError> {
            Ok(Vec::new())
        }
    }

    struct FailingConfirm;

    #[async_trait]
    impl ConfirmationHandler for FailingConfirm {
        async fn confirm(
            &self,
            _prompt: &ConfirmationPrompt,
        ) -> Result<ConfirmationDecision, ConfirmationError> {
            Err(ConfirmationError::Unavailable)
        }
    }

    fn session_with(executor: Arc<ScriptedExecutor>) -> ExecutionSession {
        ExecutionSession::new(
            executor,
            Arc::new(MemoryHistory::new()),
            Arc::new(StaticSettings::with_timeout(30)),
        )
    }

    fn texts(session: &ExecutionSession) -> Vec<String> {
        session.output().texts()
    }

    fn contains(lines: &[String], needle: &str) -> bool {
        lines.iter().any(|l| l.contains(needle))
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::ZERO), "00:00");
        assert_eq!(format_elapsed(Duration::from_millis(65_900)), "01:05");
        assert_eq!(format_elapsed(Duration::from_secs(3725)), "62:05");
    }

    #[test]
    fn test_terminal_state_mapping() {
        let now = Utc::now();
        let ok = ExecutionResult::exited(now, 0, String::new(), String::new(), Duration::ZERO);
        let bad = ExecutionResult::exited(now, 2, String::new(), String::new(), Duration::ZERO);
        let start = ExecutionResult::failed_to_start(now, "no shell", Duration::ZERO);
        let cancelled =
            ExecutionResult::cancelled(now, String::new(), String::new(), Duration::ZERO);
        let timed_out =
            ExecutionResult::timed_out(now, 1, String::new(), String::new(), Duration::ZERO);

        assert_eq!(SessionState::from_result(&ok), SessionState::Completed);
        assert_eq!(SessionState::from_result(&bad), SessionState::Failed);
        assert_eq!(SessionState::from_result(&start), SessionState::Failed);
        assert_eq!(SessionState::from_result(&cancelled), SessionState::Cancelled);
        assert_eq!(SessionState::from_result(&timed_out), SessionState::TimedOut);
        assert!(SessionState::TimedOut.is_terminal());
        assert!(!SessionState::Running.is_terminal());
    }

    #[tokio::test]
    async fn test_blank_command_is_rejected() {
        let session = session_with(Arc::new(ScriptedExecutor::default()));
        let err = session
            .execute(ExecuteRequest::new("  ", Platform::Linux))
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::EmptyCommand);
        assert_eq!(session.snapshot().state, SessionState::Idle);
    }

    #[tokio::test]
    async fn test_successful_run_writes_header_output_and_summary() {
        let session = session_with(Arc::new(ScriptedExecutor::default()));

        let outcome = session
            .execute(ExecuteRequest::new("uptime", Platform::Linux))
            .await
            .unwrap();

        assert!(matches!(outcome, RunOutcome::Finished(ref r) if r.success));
        let lines = texts(&session);
        assert!(lines[0].ends_with("Executing command: uptime"));
        assert!(lines[1].ends_with("Platform: Linux"));
        assert!(lines[2].ends_with("Timeout: 30 seconds"));
        assert_eq!(lines[3], "");
        // Delivered once, through the callback only.
        assert_eq!(lines.iter().filter(|l| *l == "out: uptime").count(), 1);
        assert_eq!(lines.iter().filter(|l| *l == "warn: noisy").count(), 1);
        assert!(contains(&lines, "Exit Code: 0"));
        assert!(contains(&lines, "Status: ✓ SUCCESS"));

        let snapshot = session.snapshot();
        assert_eq!(snapshot.state, SessionState::Idle);
        assert_eq!(snapshot.last_outcome, Some(SessionState::Completed));
        assert_eq!(snapshot.status_message, STATUS_COMPLETED);
        assert!((snapshot.progress - 100.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_result_output_used_when_no_callbacks_arrive() {
        let session = session_with(Arc::new(ScriptedExecutor {
            silent: true,
            ..ScriptedExecutor::default()
        }));

        session
            .execute(ExecuteRequest::new("hostname", Platform::Linux))
            .await
            .unwrap();

        let history = session.output().get_history();
        assert!(history.iter().any(|l| l.text == "out: hostname" && !l.is_error));
        assert!(history.iter().any(|l| l.text == "warn: noisy" && l.is_error));
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_failed() {
        let executor = ScriptedExecutor {
            exit_codes: HashMap::from([("false".to_string(), 1)]),
            ..ScriptedExecutor::default()
        };
        let session = session_with(Arc::new(executor));

        session
            .execute(ExecuteRequest::new("false", Platform::Linux))
            .await
            .unwrap();

        let snapshot = session.snapshot();
        assert_eq!(snapshot.last_outcome, Some(SessionState::Failed));
        assert_eq!(snapshot.status_message, STATUS_FAILED);
        assert!(contains(&texts(&session), "Status: ✗ FAILED"));
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let session = session_with(Arc::new(ScriptedExecutor {
            timed_out: true,
            ..ScriptedExecutor::default()
        }));

        session
            .execute(ExecuteRequest::new("sleep 60", Platform::Linux))
            .await
            .unwrap();

        let lines = texts(&session);
        assert!(contains(&lines, "⚠ Execution timed out"));
        assert!(contains(&lines, "Error: Execution timed out after 30 seconds"));
        assert_eq!(session.snapshot().last_outcome, Some(SessionState::TimedOut));
    }

    #[tokio::test]
    async fn test_declined_dangerous_command_never_runs() {
        let executor = Arc::new(ScriptedExecutor::default());
        let session = session_with(Arc::clone(&executor));

        let outcome = session
            .execute(ExecuteRequest::new("Format-Volume C", Platform::Windows).dangerous())
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Declined);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
        assert_eq!(texts(&session), vec![DECLINED_LINE.to_string()]);
        assert_eq!(session.snapshot().state, SessionState::Idle);
    }

    #[tokio::test]
    async fn test_confirmation_error_counts_as_decline() {
        let executor = Arc::new(ScriptedExecutor::default());
        let session =
            session_with(Arc::clone(&executor)).with_confirmation(Arc::new(FailingConfirm));

        let outcome = session
            .execute(ExecuteRequest::new("rm -rf /var/tmp/x", Platform::Linux).dangerous())
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Declined);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_accepted_dangerous_command_runs() {
        let executor = Arc::new(ScriptedExecutor::default());
        let session = session_with(Arc::clone(&executor)).with_confirmation(Arc::new(AutoConfirm));

        let outcome = session
            .execute(ExecuteRequest::new("Restart-Service spooler", Platform::Windows).dangerous())
            .await
            .unwrap();

        assert!(matches!(outcome, RunOutcome::Finished(_)));
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_confirmation_skipped_when_disabled() {
        let executor = Arc::new(ScriptedExecutor::default());
        let settings = StaticSettings(UserSettings {
            confirm_dangerous_actions: false,
            ..UserSettings::default()
        });
        let session = ExecutionSession::new(
            Arc::clone(&executor) as Arc<dyn CommandExecutor>,
            Arc::new(MemoryHistory::new()),
            Arc::new(settings),
        );

        session
            .execute(ExecuteRequest::new("reboot", Platform::Linux).dangerous())
            .await
            .unwrap();
        session
            .execute(
                ExecuteRequest::new("reboot", Platform::Linux)
                    .dangerous()
                    .without_confirmation(),
            )
            .await
            .unwrap();

        assert_eq!(executor.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_history_is_opened_before_and_closed_after() {
        let history = Arc::new(MemoryHistory::new());
        let executor = Arc::new(ScriptedExecutor {
            exit_codes: HashMap::from([("Test-Connection db01".to_string(), 1)]),
            history: Some(Arc::clone(&history)),
            ..ScriptedExecutor::default()
        });
        let session = ExecutionSession::new(
            Arc::clone(&executor) as Arc<dyn CommandExecutor>,
            Arc::clone(&history) as Arc<dyn CommandHistoryStore>,
            Arc::new(StaticSettings::default()),
        );

        session
            .execute(
                ExecuteRequest::new("Test-Connection db01", Platform::Windows)
                    .with_action("ping-host", "Ping host", "Network")
                    .with_parameter("host", "db01"),
            )
            .await
            .unwrap();

        assert_eq!(executor.history_seen.load(Ordering::SeqCst), 1);
        let entries = history.recent(10).await.unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.action_id, "ping-host");
        assert_eq!(entry.generated_command, "Test-Connection db01");
        assert!(entry.is_executed);
        assert_eq!(entry.exit_code, Some(1));
        assert_eq!(entry.execution_success, Some(false));
    }

    #[tokio::test]
    async fn test_no_history_without_action() {
        let history = Arc::new(MemoryHistory::new());
        let session = ExecutionSession::new(
            Arc::new(ScriptedExecutor::default()),
            Arc::clone(&history) as Arc<dyn CommandHistoryStore>,
            Arc::new(StaticSettings::default()),
        );

        session
            .execute(ExecuteRequest::new("ls", Platform::Linux))
            .await
            .unwrap();

        assert!(history.recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_settings_failure_is_generic_error() {
        let executor = Arc::new(ScriptedExecutor::default());
        let session = ExecutionSession::new(
            Arc::clone(&executor) as Arc<dyn CommandExecutor>,
            Arc::new(MemoryHistory::new()),
            Arc::new(BrokenSettings),
        );

        let outcome = session
            .execute(ExecuteRequest::new("ls", Platform::Linux))
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Errored);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
        let lines = texts(&session);
        assert!(contains(&lines, "ERROR: Command execution failed"));
        assert!(!contains(&lines, "settings.json"));
        let snapshot = session.snapshot();
        assert_eq!(snapshot.status_message, STATUS_ERROR);
        assert_eq!(snapshot.state, SessionState::Idle);
    }

    #[tokio::test]
    async fn test_history_failure_is_generic_error() {
        let executor = Arc::new(ScriptedExecutor::default());
        let session = ExecutionSession::new(
            Arc::clone(&executor) as Arc<dyn CommandExecutor>,
            Arc::new(BrokenHistory),
            Arc::new(StaticSettings::default()),
        );

        let outcome = session
            .execute(ExecuteRequest::new("ls", Platform::Linux).with_action("a", "A", "Files"))
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Errored);
        assert!(!contains(&texts(&session), "database is locked"));
        assert_eq!(session.snapshot().status_message, STATUS_ERROR);
    }

    #[tokio::test]
    async fn test_cancel_stops_running_command() {
        let session = Arc::new(session_with(Arc::new(ScriptedExecutor::default())));
        let mut states = session.subscribe();

        let run = tokio::spawn({
            let session = Arc::clone(&session);
            async move {
                session
                    .execute(ExecuteRequest::new(BLOCK, Platform::Linux))
                    .await
            }
        });
        states
            .wait_for(|s| s.state == SessionState::Running)
            .await
            .unwrap();

        assert!(session.cancel());
        assert!(!session.cancel());

        let outcome = run.await.unwrap().unwrap();
        assert!(matches!(outcome, RunOutcome::Finished(ref r) if r.was_cancelled));
        let lines = texts(&session);
        assert!(contains(&lines, "Cancelling execution..."));
        assert!(contains(&lines, "⚠ Execution was cancelled"));
        assert_eq!(session.snapshot().last_outcome, Some(SessionState::Cancelled));
    }

    #[tokio::test]
    async fn test_cancel_when_idle_does_nothing() {
        let session = session_with(Arc::new(ScriptedExecutor::default()));
        assert!(!session.cancel());
        assert!(session.output().is_empty());
    }

    #[tokio::test]
    async fn test_new_request_supersedes_running_one() {
        let session = Arc::new(session_with(Arc::new(ScriptedExecutor::default())));
        let mut states = session.subscribe();

        let first = tokio::spawn({
            let session = Arc::clone(&session);
            async move {
                session
                    .execute(ExecuteRequest::new(BLOCK, Platform::Linux))
                    .await
            }
        });
        states
            .wait_for(|s| s.state == SessionState::Running)
            .await
            .unwrap();

        let second = session
            .execute(ExecuteRequest::new("whoami", Platform::Linux))
            .await
            .unwrap();
        let first = first.await.unwrap().unwrap();

        assert!(matches!(first, RunOutcome::Finished(ref r) if r.was_cancelled));
        assert!(matches!(second, RunOutcome::Finished(ref r) if r.success));
        let lines = texts(&session);
        assert!(lines[0].ends_with("Executing command: whoami"));
        assert!(!contains(&lines, "Execution was cancelled"));
        assert_eq!(session.snapshot().last_outcome, Some(SessionState::Completed));
    }

    #[tokio::test]
    async fn test_clear_output_resets_display() {
        let session = session_with(Arc::new(ScriptedExecutor::default()));
        session
            .execute(ExecuteRequest::new("date", Platform::Linux))
            .await
            .unwrap();
        assert!(!session.output().is_empty());

        session.clear_output();

        assert!(session.output().is_empty());
        let snapshot = session.snapshot();
        assert_eq!(snapshot.status_message, STATUS_READY);
        assert_eq!(snapshot.elapsed, "00:00");
        assert!(snapshot.progress.abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_dispose_cancels_and_refuses_new_work() {
        let session = Arc::new(session_with(Arc::new(ScriptedExecutor::default())));
        let mut states = session.subscribe();

        let run = tokio::spawn({
            let session = Arc::clone(&session);
            async move {
                session
                    .execute(ExecuteRequest::new(BLOCK, Platform::Linux))
                    .await
            }
        });
        states
            .wait_for(|s| s.state == SessionState::Running)
            .await
            .unwrap();

        session.dispose();
        session.dispose();

        let outcome = run.await.unwrap().unwrap();
        assert!(matches!(outcome, RunOutcome::Finished(ref r) if r.was_cancelled));
        assert_eq!(
            session
                .execute(ExecuteRequest::new("ls", Platform::Linux))
                .await
                .unwrap_err(),
            SessionError::Disposed
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_local_process_executor() {
        let session = ExecutionSession::with_process_executor(
            Arc::new(MemoryHistory::new()),
            Arc::new(StaticSettings::with_timeout(10)),
        );

        let outcome = session
            .execute(ExecuteRequest::new("echo hello", Platform::Linux))
            .await
            .unwrap();

        assert!(matches!(outcome, RunOutcome::Finished(ref r) if r.exit_code == 0));
        assert_eq!(
            session
                .output()
                .texts()
                .iter()
                .filter(|l| *l == "hello")
                .count(),
            1
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_history_holds_every_line_once_execute_returns() {
        let session = ExecutionSession::with_process_executor(
            Arc::new(MemoryHistory::new()),
            Arc::new(StaticSettings::with_timeout(10)),
        );

        let outcome = tokio_test::assert_ok!(
            session
                .execute(ExecuteRequest::new(
                    "for i in $(seq 1 200); do echo line$i; done",
                    Platform::Linux,
                ))
                .await
        );
        assert!(matches!(outcome, RunOutcome::Finished(ref r) if r.success));

        let lines: Vec<String> = session
            .output()
            .get_history()
            .into_iter()
            .filter(|l| !l.is_error && l.text.starts_with("line"))
            .map(|l| l.text)
            .collect();
        assert_eq!(lines.len(), 200);
        assert_eq!(lines.first().map(String::as_str), Some("line1"));
        assert_eq!(lines.last().map(String::as_str), Some("line200"));
    }
}
