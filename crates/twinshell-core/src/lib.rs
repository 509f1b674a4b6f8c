//! Core types for TwinShell command execution.
//!
//! This crate provides the shared building blocks:
//! - `ExecutionResult` / `OutputLine` - single-command outcomes
//! - `CommandBatch` and batch progress/result types
//! - `OutputLog` - broadcast + history output log
//! - Executor, audit, history and settings traits

pub mod batch;
pub mod execution;
pub mod output_log;
pub mod records;
pub mod settings;
pub mod traits;

pub use batch::{
    BatchCommand, BatchExecutionMode, BatchExecutionProgress, BatchExecutionResult, CommandBatch,
};
pub use execution::{ExecutionOutcome, ExecutionResult, OutputLine, Platform};
pub use output_log::{OutputEvent, OutputLog};
pub use records::{AuditLogEntry, CommandHistoryEntry, NewCommandHistory};
pub use settings::{JsonFileSettings, SettingsProvider, StaticSettings, UserSettings};
pub use traits::{AuditLogSink, CommandExecutor, CommandHistoryStore, OutputCallback};

pub use tokio_util::sync::CancellationToken;
