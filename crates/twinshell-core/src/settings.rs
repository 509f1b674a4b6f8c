//! User settings consumed by the execution session.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lower bound applied to the configured execution timeout.
pub const MIN_TIMEOUT_SECONDS: u64 = 1;

/// Upper bound applied to the configured execution timeout.
pub const MAX_TIMEOUT_SECONDS: u64 = 300;

/// Timeout used when nothing is configured.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Settings relevant to command execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserSettings {
    /// Raw configured timeout; see [`Self::effective_timeout_seconds`].
    pub execution_timeout_seconds: u64,
    /// Whether dangerous actions ask for confirmation before running.
    pub confirm_dangerous_actions: bool,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            execution_timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            confirm_dangerous_actions: true,
        }
    }
}

impl UserSettings {
    /// Configured timeout clamped to `[1, 300]` seconds.
    #[must_use]
    pub fn effective_timeout_seconds(&self) -> u64 {
        self.execution_timeout_seconds
            .clamp(MIN_TIMEOUT_SECONDS, MAX_TIMEOUT_SECONDS)
    }
}

/// Settings error.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Source of [`UserSettings`].
#[async_trait]
pub trait SettingsProvider: Send + Sync {
    /// Load the current settings.
    async fn load_settings(&self) -> Result<UserSettings, SettingsError>;
}

/// Provider returning a fixed value.
#[derive(Debug, Clone, Default)]
pub struct StaticSettings(pub UserSettings);

impl StaticSettings {
    /// Fixed settings with the given timeout.
    #[must_use]
    pub fn with_timeout(execution_timeout_seconds: u64) -> Self {
        Self(UserSettings {
            execution_timeout_seconds,
            ..UserSettings::default()
        })
    }
}

#[async_trait]
impl SettingsProvider for StaticSettings {
    async fn load_settings(&self) -> Result<UserSettings, SettingsError> {
        Ok(self.0.clone())
    }
}

/// Provider reading a camelCase JSON file on every load.
///
/// A missing file yields defaults.
#[derive(Debug, Clone)]
pub struct JsonFileSettings {
    path: PathBuf,
}

impl JsonFileSettings {
    /// Read settings from `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/twinshell/settings.json`, when a config dir exists.
    #[must_use]
    pub fn default_location() -> Option<Self> {
        dirs::config_dir().map(|dir| Self::new(dir.join("twinshell").join("settings.json")))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SettingsProvider for JsonFileSettings {
    async fn load_settings(&self) -> Result<UserSettings, SettingsError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No settings file, using defaults");
                return Ok(UserSettings::default());
            }
            Err(source) => {
                return Err(SettingsError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        serde_json::from_str(&raw).map_err(|source| SettingsError::Parse {
            path: self.path.clone(),
            source,
        })
    }
}
