//! Command batches, progress snapshots and batch results.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::execution::{ExecutionResult, Platform};

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// How a batch reacts to a failing command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BatchExecutionMode {
    /// Stop at the first command whose result is not successful.
    #[default]
    StopOnError,
    /// Run every command regardless of earlier failures.
    ContinueOnError,
}

/// One command inside a [`CommandBatch`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCommand {
    pub id: String,
    #[serde(default)]
    pub batch_id: String,
    /// 0-based, contiguous position within the batch.
    #[serde(default)]
    pub order: usize,
    pub action_id: Option<String>,
    #[serde(default)]
    pub action_title: String,
    pub command: String,
    pub platform: Platform,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_executed: bool,
    #[serde(default)]
    pub execution_result: Option<ExecutionResult>,
}

impl BatchCommand {
    /// Create an unexecuted command.
    #[must_use]
    pub fn new(command: impl Into<String>, platform: Platform) -> Self {
        Self {
            id: new_id(),
            batch_id: String::new(),
            order: 0,
            action_id: None,
            action_title: String::new(),
            command: command.into(),
            platform,
            description: None,
            is_executed: false,
            execution_result: None,
        }
    }

    /// Attach the catalog action this command was generated from.
    #[must_use]
    pub fn with_action(mut self, action_id: impl Into<String>, title: impl Into<String>) -> Self {
        self.action_id = Some(action_id.into());
        self.action_title = title.into();
        self
    }

    /// Set a display title without an action reference.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.action_title = title.into();
        self
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Mark the command executed and attach its result.
    pub fn record_result(&mut self, result: ExecutionResult) {
        self.is_executed = true;
        self.execution_result = Some(result);
    }

    /// Forget any previous run.
    pub fn reset_execution(&mut self) {
        self.is_executed = false;
        self.execution_result = None;
    }

    /// Whether the command is blank and therefore not runnable.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.command.trim().is_empty()
    }
}

/// An ordered list of commands executed one after another.
///
/// The orchestrator takes the batch by value for the duration of a run and
/// hands it back inside the [`BatchExecutionResult`] for the caller to persist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandBatch {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub execution_mode: BatchExecutionMode,
    #[serde(default)]
    pub commands: Vec<BatchCommand>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub last_executed_at: Option<DateTime<Utc>>,
    #[serde(default = "default_user_created")]
    pub is_user_created: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

const fn default_user_created() -> bool {
    true
}

impl CommandBatch {
    /// Create an empty batch.
    #[must_use]
    pub fn new(name: impl Into<String>, execution_mode: BatchExecutionMode) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            name: name.into(),
            description: None,
            execution_mode,
            commands: Vec::new(),
            created_at: now,
            updated_at: now,
            last_executed_at: None,
            is_user_created: true,
            tags: Vec::new(),
        }
    }

    /// Append a command, assigning its order and batch reference.
    pub fn push_command(&mut self, mut command: BatchCommand) {
        command.batch_id.clone_from(&self.id);
        command.order = self.commands.len();
        self.commands.push(command);
        self.updated_at = Utc::now();
    }

    /// Builder form of [`Self::push_command`].
    #[must_use]
    pub fn with_command(mut self, command: BatchCommand) -> Self {
        self.push_command(command);
        self
    }

    /// Re-assign contiguous 0-based orders in list order.
    pub fn renumber(&mut self) {
        for (index, command) in self.commands.iter_mut().enumerate() {
            command.order = index;
            command.batch_id.clone_from(&self.id);
        }
    }

    #[must_use]
    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    /// Whether every command has run.
    #[must_use]
    pub fn is_fully_executed(&self) -> bool {
        self.commands.iter().all(|c| c.is_executed)
    }

    /// Commands whose result succeeded.
    #[must_use]
    pub fn success_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| c.execution_result.as_ref().is_some_and(|r| r.success))
            .count()
    }

    /// Executed commands whose result failed.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| c.is_executed && c.execution_result.as_ref().is_some_and(|r| !r.success))
            .count()
    }

    /// Clear execution state of every command.
    pub fn reset_execution(&mut self) {
        for command in &mut self.commands {
            command.reset_execution();
        }
    }

    /// Serialize the batch as pretty camelCase JSON.
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse a batch exported by [`Self::export_json`].
    ///
    /// The imported batch gets fresh ids, no execution state and a
    /// contiguous command order, so it never collides with the original.
    ///
    /// # Errors
    /// Returns error if the JSON does not describe a batch.
    pub fn import_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut batch: Self = serde_json::from_str(json)?;
        let now = Utc::now();
        batch.id = new_id();
        batch.created_at = now;
        batch.updated_at = now;
        batch.last_executed_at = None;
        for command in &mut batch.commands {
            command.id = new_id();
            command.reset_execution();
        }
        batch.renumber();
        Ok(batch)
    }
}

/// Snapshot passed to progress callbacks. Only valid for the duration of the call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchExecutionProgress<'a> {
    pub current_command_index: usize,
    pub total_commands: usize,
    pub current_command: Option<&'a BatchCommand>,
    pub completed_count: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub is_running: bool,
    pub error_message: Option<String>,
}

impl BatchExecutionProgress<'_> {
    /// Completed share of the batch in percent.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn progress_percentage(&self) -> f64 {
        if self.total_commands == 0 {
            0.0
        } else {
            self.completed_count as f64 / self.total_commands as f64 * 100.0
        }
    }
}

/// Terminal result of one batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchExecutionResult {
    /// The batch, with per-command results attached.
    pub batch: CommandBatch,
    /// No failures and not cancelled.
    pub success: bool,
    pub executed_count: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub skipped_count: usize,
    pub was_cancelled: bool,
    pub total_duration: Duration,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Caller-safe message; never raw error detail.
    pub error_message: Option<String>,
}

impl BatchExecutionResult {
    /// A result for a batch that was refused before any command ran.
    #[must_use]
    pub fn rejected(batch: CommandBatch, message: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            batch,
            success: false,
            executed_count: 0,
            success_count: 0,
            failure_count: 0,
            skipped_count: 0,
            was_cancelled: false,
            total_duration: Duration::ZERO,
            started_at: now,
            completed_at: Some(now),
            error_message: Some(message.into()),
        }
    }

    #[must_use]
    pub fn total_commands(&self) -> usize {
        self.batch.commands.len()
    }
}
