//! Shell invocation building.

use std::path::PathBuf;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use thiserror::Error;
use twinshell_core::Platform;
use twinshell_shell::{ShellError, ShellKind};

/// Command build error.
#[derive(Debug, Error)]
pub enum CommandBuildError {
    #[error("Command is empty")]
    EmptyCommand,
    #[error(transparent)]
    Shell(#[from] ShellError),
}

/// Resolved command parts (program + args).
#[derive(Debug, Clone)]
pub struct CommandParts {
    pub program: PathBuf,
    pub args: Vec<String>,
}

/// A command bound to the shell that will run it.
#[derive(Debug, Clone)]
pub struct ShellInvocation {
    shell: ShellKind,
    command: String,
}

impl ShellInvocation {
    /// Bind `command` to the shell for `platform`.
    ///
    /// # Errors
    /// Returns error if the command is blank.
    pub fn new(command: impl Into<String>, platform: Platform) -> Result<Self, CommandBuildError> {
        let command = command.into();
        if command.trim().is_empty() {
            return Err(CommandBuildError::EmptyCommand);
        }
        Ok(Self {
            shell: ShellKind::for_platform(platform),
            command,
        })
    }

    #[must_use]
    pub const fn shell(&self) -> ShellKind {
        self.shell
    }

    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Arguments passed to the shell executable.
    ///
    /// PowerShell gets the command as `-EncodedCommand` (base64 of UTF-16LE),
    /// which needs no quoting at all. Bash gets it as one `-c` argument.
    #[must_use]
    pub fn args(&self) -> Vec<String> {
        match self.shell {
            ShellKind::PowerShell => vec![
                "-NoProfile".into(),
                "-NonInteractive".into(),
                "-EncodedCommand".into(),
                encode_powershell(&self.command),
            ],
            ShellKind::Bash => vec!["-c".into(), self.command.clone()],
        }
    }

    /// Single-line, human-readable form of the invocation.
    #[must_use]
    pub fn display_line(&self) -> String {
        let escaped = self.shell.escape(&self.command);
        match self.shell {
            ShellKind::PowerShell => {
                format!("powershell -NoProfile -NonInteractive -Command \"{escaped}\"")
            }
            ShellKind::Bash => format!("bash -c \"{escaped}\""),
        }
    }

    /// Resolve the shell executable.
    ///
    /// # Errors
    /// Returns error if no executable for the shell is found.
    pub async fn into_resolved(self) -> Result<CommandParts, CommandBuildError> {
        let program = self.shell.resolve().await?;
        Ok(CommandParts {
            program,
            args: self.args(),
        })
    }
}

fn encode_powershell(command: &str) -> String {
    let bytes: Vec<u8> = command.encode_utf16().flat_map(u16::to_le_bytes).collect();
    BASE64.encode(bytes)
}
