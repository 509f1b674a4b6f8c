//! Confirmation seam for dangerous commands.

use async_trait::async_trait;
use thiserror::Error;
use twinshell_core::Platform;

/// Title shown by confirmation front ends.
pub const CONFIRMATION_TITLE: &str = "Dangerous Command Confirmation";

/// What the user is asked to confirm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationPrompt {
    pub title: String,
    pub message: String,
    pub command: String,
    pub platform: Platform,
}

impl ConfirmationPrompt {
    /// Standard prompt for a dangerous command.
    #[must_use]
    pub fn for_command(command: &str, platform: Platform) -> Self {
        Self {
            title: CONFIRMATION_TITLE.to_string(),
            message: format!(
                "ATTENTION: This command may cause significant system changes.\n\n\
                 Command: {command}\n\n\
                 Are you sure you want to execute this command?"
            ),
            command: command.to_string(),
            platform,
        }
    }
}

/// The user's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationDecision {
    Accepted,
    Declined,
}

/// Confirmation error.
#[derive(Debug, Error)]
pub enum ConfirmationError {
    #[error("Confirmation service unavailable")]
    Unavailable,
    #[error("Confirmation request failed: {0}")]
    Failed(String),
}

/// Asks the user whether a dangerous command may run.
///
/// The session only spawns a dangerous command after an explicit
/// [`ConfirmationDecision::Accepted`]; errors count as a decline.
#[async_trait]
pub trait ConfirmationHandler: Send + Sync {
    async fn confirm(
        &self,
        prompt: &ConfirmationPrompt,
    ) -> Result<ConfirmationDecision, ConfirmationError>;
}

/// Accepts every prompt. For headless runs.
#[derive(Debug, Default, Clone)]
pub struct AutoConfirm;

#[async_trait]
impl ConfirmationHandler for AutoConfirm {
    async fn confirm(
        &self,
        prompt: &ConfirmationPrompt,
    ) -> Result<ConfirmationDecision, ConfirmationError> {
        tracing::debug!(command = %prompt.command, "Auto-confirming dangerous command");
        Ok(ConfirmationDecision::Accepted)
    }
}

/// Declines every prompt.
#[derive(Debug, Default, Clone)]
pub struct AutoDecline;

#[async_trait]
impl ConfirmationHandler for AutoDecline {
    async fn confirm(
        &self,
        _prompt: &ConfirmationPrompt,
    ) -> Result<ConfirmationDecision, ConfirmationError> {
        Ok(ConfirmationDecision::Declined)
    }
}
