//! UI-facing execution session for TwinShell.
//!
//! Provides:
//! - `ExecutionSession` - run one command at a time with confirmation,
//!   observable state, output log and command history
//! - `ConfirmationHandler` - seam for asking the user about dangerous commands
//! - Storage implementations (in-memory history and audit log)

pub mod confirm;
pub mod request;
pub mod session;
pub mod storage;

pub use confirm::{
    AutoConfirm, AutoDecline, ConfirmationDecision, ConfirmationError, ConfirmationHandler,
    ConfirmationPrompt,
};
pub use request::ExecuteRequest;
pub use session::{
    ExecutionSession, RunOutcome, SessionError, SessionSnapshot, SessionState, format_elapsed,
};
#[cfg(feature = "memory")]
pub use storage::{MemoryAuditLog, MemoryHistory};
