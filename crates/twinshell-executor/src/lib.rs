//! Command execution for TwinShell.
//!
//! Provides:
//! - `ProcessExecutor` - run one command in PowerShell or Bash with
//!   streaming output, timeout and cancellation
//! - `BatchRunner` - run a `CommandBatch` sequentially with progress,
//!   audit logging and stop/continue-on-error policies
//! - Shell invocation building

pub mod batch;
pub mod command;
pub mod process;

pub use batch::{
    AuditFailurePolicy, BatchError, BatchRunner, BatchValidationError, ProgressFn, check_batch,
};
pub use command::{CommandBuildError, CommandParts, ShellInvocation};
pub use process::{ExecutorError, ProcessExecutor};
