//! Sequential batch orchestration.

use std::time::Instant;

use chrono::Utc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use twinshell_core::{
    AuditLogEntry, AuditLogSink, BatchExecutionMode, BatchExecutionProgress, BatchExecutionResult,
    CommandBatch, CommandExecutor, OutputCallback, traits::AuditError,
};

/// Message returned when a run aborts on an internal error.
const BATCH_FAILED_MESSAGE: &str = "Batch execution failed";

/// Progress callback. The snapshot only lives for the call.
pub type ProgressFn<'a> = &'a (dyn Fn(&BatchExecutionProgress<'_>) + Send + Sync);

/// Why a batch was refused before running.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchValidationError {
    #[error("Invalid batch: must contain at least one command")]
    NoCommands,
    #[error("Invalid batch: command {index} is empty")]
    BlankCommand { index: usize },
}

/// Error that aborts a batch mid-run.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Audit log write failed: {0}")]
    Audit(#[from] AuditError),
}

/// What to do when the audit sink rejects an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuditFailurePolicy {
    /// Abort the batch; the result carries a generic failure message.
    #[default]
    Abort,
    /// Log a warning and keep going.
    Ignore,
}

/// Check a batch before running it.
///
/// # Errors
/// Returns the first problem found.
pub fn check_batch(batch: &CommandBatch) -> Result<(), BatchValidationError> {
    if batch.commands.is_empty() {
        return Err(BatchValidationError::NoCommands);
    }
    if let Some(index) = batch.commands.iter().position(|c| c.is_blank()) {
        return Err(BatchValidationError::BlankCommand { index });
    }
    Ok(())
}

#[derive(Debug, Default)]
struct Tally {
    executed: usize,
    succeeded: usize,
    failed: usize,
    skipped: usize,
    cancelled: bool,
}

/// Runs the commands of a batch one at a time, in order.
pub struct BatchRunner<E, A>
where
    E: CommandExecutor,
    A: AuditLogSink,
{
    executor: E,
    audit: A,
    audit_policy: AuditFailurePolicy,
}

impl<E, A> BatchRunner<E, A>
where
    E: CommandExecutor,
    A: AuditLogSink,
{
    /// Create a runner that aborts on audit failures.
    #[must_use]
    pub fn new(executor: E, audit: A) -> Self {
        Self {
            executor,
            audit,
            audit_policy: AuditFailurePolicy::default(),
        }
    }

    /// Override the audit failure policy.
    #[must_use]
    pub const fn with_audit_policy(mut self, policy: AuditFailurePolicy) -> Self {
        self.audit_policy = policy;
        self
    }

    /// Whether `batch` can be run.
    #[must_use]
    pub fn validate_batch(&self, batch: &CommandBatch) -> bool {
        check_batch(batch).is_ok()
    }

    /// Run `batch` and hand it back, results attached, inside the result.
    ///
    /// Cancellation is checked before each command; the command in flight
    /// is stopped by the executor observing the same token. Previous
    /// execution state on the batch is cleared first.
    pub async fn execute_batch(
        &self,
        mut batch: CommandBatch,
        cancel: &CancellationToken,
        timeout_seconds: u64,
        on_progress: Option<ProgressFn<'_>>,
        on_output: Option<OutputCallback>,
    ) -> BatchExecutionResult {
        if let Err(e) = check_batch(&batch) {
            tracing::warn!(batch_id = %batch.id, error = %e, "Rejected batch");
            return BatchExecutionResult::rejected(batch, e.to_string());
        }

        tracing::info!(
            batch_id = %batch.id,
            commands = batch.commands.len(),
            mode = ?batch.execution_mode,
            "Starting batch"
        );

        let started_at = Utc::now();
        let start = Instant::now();
        batch.reset_execution();

        let mut tally = Tally::default();
        let outcome = self
            .run_commands(
                &mut batch,
                cancel,
                timeout_seconds,
                on_progress,
                on_output,
                &mut tally,
            )
            .await;
        let total_duration = start.elapsed();

        let total = batch.commands.len();
        let error_message = match outcome {
            Ok(()) => None,
            Err(e) => {
                tracing::error!(batch_id = %batch.id, error = %e, "Batch execution failed");
                tally.skipped = total - tally.executed;
                Some(BATCH_FAILED_MESSAGE.to_string())
            }
        };

        emit(
            on_progress,
            &BatchExecutionProgress {
                current_command_index: total,
                total_commands: total,
                current_command: None,
                completed_count: tally.executed,
                success_count: tally.succeeded,
                failure_count: tally.failed,
                is_running: false,
                error_message: None,
            },
        );

        let completed_at = Utc::now();
        batch.last_executed_at = Some(completed_at);

        let success = error_message.is_none() && tally.failed == 0 && !tally.cancelled;
        tracing::info!(
            batch_id = %batch.id,
            success,
            executed = tally.executed,
            failed = tally.failed,
            skipped = tally.skipped,
            cancelled = tally.cancelled,
            "Batch finished"
        );

        BatchExecutionResult {
            batch,
            success,
            executed_count: tally.executed,
            success_count: tally.succeeded,
            failure_count: tally.failed,
            skipped_count: tally.skipped,
            was_cancelled: tally.cancelled,
            total_duration,
            started_at,
            completed_at: Some(completed_at),
            error_message,
        }
    }

    async fn run_commands(
        &self,
        batch: &mut CommandBatch,
        cancel: &CancellationToken,
        timeout_seconds: u64,
        on_progress: Option<ProgressFn<'_>>,
        on_output: Option<OutputCallback>,
        tally: &mut Tally,
    ) -> Result<(), BatchError> {
        let total = batch.commands.len();

        for index in 0..total {
            if cancel.is_cancelled() {
                tally.cancelled = true;
                tally.skipped = total - index;
                break;
            }

            emit(
                on_progress,
                &BatchExecutionProgress {
                    current_command_index: index,
                    total_commands: total,
                    current_command: Some(&batch.commands[index]),
                    completed_count: tally.executed,
                    success_count: tally.succeeded,
                    failure_count: tally.failed,
                    is_running: true,
                    error_message: None,
                },
            );

            let (text, platform) = {
                let command = &batch.commands[index];
                (command.command.clone(), command.platform)
            };
            tracing::debug!(batch_id = %batch.id, index, %platform, "Running batch command");
            let result = self
                .executor
                .execute(&text, platform, cancel, timeout_seconds, on_output.clone())
                .await;

            let entry = AuditLogEntry::for_batch_command(batch, &batch.commands[index], &result);
            let succeeded = result.success;
            if result.was_cancelled {
                tally.cancelled = true;
            }
            batch.commands[index].record_result(result);
            tally.executed += 1;
            if succeeded {
                tally.succeeded += 1;
            } else {
                tally.failed += 1;
            }

            self.write_audit(entry).await?;

            let command = &batch.commands[index];
            if !succeeded && batch.execution_mode == BatchExecutionMode::StopOnError {
                tally.skipped = total - (index + 1);
                tracing::info!(batch_id = %batch.id, index, "Command failed, stopping batch");
                emit(
                    on_progress,
                    &BatchExecutionProgress {
                        current_command_index: index,
                        total_commands: total,
                        current_command: Some(command),
                        completed_count: tally.executed,
                        success_count: tally.succeeded,
                        failure_count: tally.failed,
                        is_running: false,
                        error_message: Some(format!(
                            "Command failed: {}. Stopping execution.",
                            command.action_title
                        )),
                    },
                );
                break;
            }

            emit(
                on_progress,
                &BatchExecutionProgress {
                    current_command_index: index,
                    total_commands: total,
                    current_command: Some(command),
                    completed_count: tally.executed,
                    success_count: tally.succeeded,
                    failure_count: tally.failed,
                    is_running: index + 1 < total,
                    error_message: None,
                },
            );
        }

        Ok(())
    }

    async fn write_audit(&self, entry: AuditLogEntry) -> Result<(), BatchError> {
        match self.audit.add_log(entry).await {
            Ok(()) => Ok(()),
            Err(e) if self.audit_policy == AuditFailurePolicy::Ignore => {
                tracing::warn!(error = %e, "Audit log write failed, continuing");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn emit(on_progress: Option<ProgressFn<'_>>, progress: &BatchExecutionProgress<'_>) {
    if let Some(callback) = on_progress {
        callback(progress);
    }
}
