//! Shell resolution for command execution.
//!
//! Provides:
//! - `ShellKind` - PowerShell or Bash, chosen from a command's platform
//! - Executable lookup on `PATH`
//! - Best-effort quoting helpers for both shells

pub mod shell;

pub use shell::{
    ShellError, ShellKind, escape_for_bash, escape_for_powershell, resolve_executable_path,
};
