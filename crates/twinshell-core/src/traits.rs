//! Core traits for execution and the collaborators it reports to.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{
    execution::{ExecutionResult, OutputLine, Platform},
    records::{AuditLogEntry, CommandHistoryEntry, NewCommandHistory},
};

/// Callback receiving each output line as soon as it is read.
///
/// Invoked synchronously from the reader task; any UI-thread marshaling is
/// the callee's business.
pub type OutputCallback = Arc<dyn Fn(OutputLine) + Send + Sync>;

/// Trait for running a single command through a shell.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Execute `command` on `platform`'s shell.
    ///
    /// Never fails: every outcome, including a shell that cannot be
    /// started, is reported through the returned [`ExecutionResult`].
    async fn execute(
        &self,
        command: &str,
        platform: Platform,
        cancel: &CancellationToken,
        timeout_seconds: u64,
        on_output: Option<OutputCallback>,
    ) -> ExecutionResult;
}

#[async_trait]
impl<T: CommandExecutor + ?Sized> CommandExecutor for Arc<T> {
    async fn execute(
        &self,
        command: &str,
        platform: Platform,
        cancel: &CancellationToken,
        timeout_seconds: u64,
        on_output: Option<OutputCallback>,
    ) -> ExecutionResult {
        (**self)
            .execute(command, platform, cancel, timeout_seconds, on_output)
            .await
    }
}

/// Audit sink error.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Audit log unavailable")]
    Unavailable,
    #[error("Audit write failed: {0}")]
    Write(String),
}

/// Append-only audit trail.
#[async_trait]
pub trait AuditLogSink: Send + Sync {
    /// Append one entry.
    async fn add_log(&self, entry: AuditLogEntry) -> Result<(), AuditError>;
}

#[async_trait]
impl<T: AuditLogSink + ?Sized> AuditLogSink for Arc<T> {
    async fn add_log(&self, entry: AuditLogEntry) -> Result<(), AuditError> {
        (**self).add_log(entry).await
    }
}

/// Storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("History entry not found: {0}")]
    NotFound(String),
    #[error("Storage error: {0}")]
    Internal(String),
}

/// Trait for command history backends.
#[async_trait]
pub trait CommandHistoryStore: Send + Sync {
    /// Open a history entry and return its id.
    async fn add_command(&self, entry: NewCommandHistory) -> Result<String, StorageError>;

    /// Close an entry with execution results.
    async fn update_with_execution_results(
        &self,
        history_id: &str,
        exit_code: i32,
        duration: Duration,
        success: bool,
    ) -> Result<(), StorageError>;

    /// Get an entry by id.
    async fn get(&self, history_id: &str) -> Result<Option<CommandHistoryEntry>, StorageError>;

    /// Most recent entries, newest first.
    async fn recent(&self, count: usize) -> Result<Vec<CommandHistoryEntry>, StorageError>;
}
