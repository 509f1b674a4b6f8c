//! Cross-platform shell utilities.

use std::path::{Path, PathBuf};

use thiserror::Error;
use twinshell_core::Platform;

/// Shell resolution error.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("No {shell} executable found (tried: {tried})")]
    NotFound { shell: ShellKind, tried: String },
}

/// Shell used to run a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShellKind {
    PowerShell,
    Bash,
}

impl ShellKind {
    /// Shell for `platform`. `Both` picks the host's native shell.
    #[must_use]
    pub const fn for_platform(platform: Platform) -> Self {
        match platform.resolve_for_host() {
            Platform::Windows => Self::PowerShell,
            Platform::Linux | Platform::Both => Self::Bash,
        }
    }

    /// Executable names tried in order.
    ///
    /// Windows PowerShell comes first on Windows; elsewhere only the
    /// cross-platform `pwsh` is realistically present.
    #[must_use]
    pub const fn candidates(self) -> &'static [&'static str] {
        match self {
            Self::PowerShell => {
                if cfg!(windows) {
                    &["powershell.exe", "pwsh.exe"]
                } else {
                    &["pwsh", "powershell"]
                }
            }
            Self::Bash => &["bash"],
        }
    }

    /// Resolve the first available executable for this shell.
    ///
    /// # Errors
    /// Returns error if no candidate is found on `PATH`.
    pub async fn resolve(self) -> Result<PathBuf, ShellError> {
        for candidate in self.candidates() {
            if let Some(path) = resolve_executable_path(candidate).await {
                tracing::debug!(shell = %self, path = %path.display(), "Resolved shell");
                return Ok(path);
            }
        }
        Err(ShellError::NotFound {
            shell: self,
            tried: self.candidates().join(", "),
        })
    }

    /// Quote `command` for use inside a double-quoted argument of this shell.
    #[must_use]
    pub fn escape(self, command: &str) -> String {
        match self {
            Self::PowerShell => escape_for_powershell(command),
            Self::Bash => escape_for_bash(command),
        }
    }
}

impl std::fmt::Display for ShellKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PowerShell => f.write_str("PowerShell"),
            Self::Bash => f.write_str("Bash"),
        }
    }
}

/// Resolve an executable by name.
///
/// The search order is:
/// 1. Explicit absolute paths.
/// 2. The current process PATH via `which`.
pub async fn resolve_executable_path(executable: &str) -> Option<PathBuf> {
    if executable.trim().is_empty() {
        return None;
    }

    let path = Path::new(executable);
    if path.is_absolute() && path.is_file() {
        return Some(path.to_path_buf());
    }

    which_async(executable).await
}

async fn which_async(executable: &str) -> Option<PathBuf> {
    let executable = executable.to_string();
    tokio::task::spawn_blocking(move || which::which(executable))
        .await
        .ok()
        .and_then(Result::ok)
}

/// Escape for a PowerShell double-quoted string: `"` becomes `""`.
///
/// Best-effort only. Command text is trusted input.
#[must_use]
pub fn escape_for_powershell(command: &str) -> String {
    command.replace('"', "\"\"")
}

/// Escape for a Bash double-quoted string.
///
/// Backslash-escapes `\`, `"`, `$` and `` ` ``. Best-effort only.
#[must_use]
pub fn escape_for_bash(command: &str) -> String {
    let mut escaped = String::with_capacity(command.len() + 8);
    for ch in command.chars() {
        if matches!(ch, '\\' | '"' | '$' | '`') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
