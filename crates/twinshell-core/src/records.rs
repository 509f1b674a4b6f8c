//! Audit and history records written by the execution core.

use std::{collections::HashMap, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    batch::{BatchCommand, CommandBatch},
    execution::{ExecutionResult, Platform},
};

/// Category stamped on audit entries produced by batch runs.
pub const BATCH_AUDIT_CATEGORY: &str = "Batch Execution";

/// One audit trail record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<String>,
    pub action_id: String,
    pub command: String,
    pub platform: Platform,
    pub exit_code: i32,
    pub success: bool,
    pub duration: Duration,
    pub action_title: String,
    pub category: String,
    pub was_dangerous: bool,
}

impl AuditLogEntry {
    /// Record for a batch command that just ran.
    ///
    /// Commands without an action reference are filed under the batch id.
    #[must_use]
    pub fn for_batch_command(
        batch: &CommandBatch,
        command: &BatchCommand,
        result: &ExecutionResult,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            user_id: None,
            action_id: command
                .action_id
                .clone()
                .unwrap_or_else(|| batch.id.clone()),
            command: command.command.clone(),
            platform: command.platform,
            exit_code: result.exit_code,
            success: result.success,
            duration: result.duration,
            action_title: command.action_title.clone(),
            category: BATCH_AUDIT_CATEGORY.to_string(),
            was_dangerous: false,
        }
    }
}

/// Data needed to open a history entry before a command runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCommandHistory {
    pub action_id: String,
    pub command: String,
    pub parameters: HashMap<String, String>,
    pub platform: Platform,
    pub action_title: String,
    pub category: String,
}

/// Persisted command history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandHistoryEntry {
    pub id: String,
    pub action_id: String,
    pub generated_command: String,
    #[serde(default)]
    pub parameters: HashMap<String, String>,
    pub platform: Platform,
    pub created_at: DateTime<Utc>,
    pub category: String,
    pub action_title: String,
    /// Whether the command was executed rather than just generated.
    pub is_executed: bool,
    pub exit_code: Option<i32>,
    pub execution_duration: Option<Duration>,
    pub execution_success: Option<bool>,
}

impl CommandHistoryEntry {
    /// Open an entry that has not run yet.
    #[must_use]
    pub fn from_new(new: NewCommandHistory) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            action_id: new.action_id,
            generated_command: new.command,
            parameters: new.parameters,
            platform: new.platform,
            created_at: Utc::now(),
            category: new.category,
            action_title: new.action_title,
            is_executed: false,
            exit_code: None,
            execution_duration: None,
            execution_success: None,
        }
    }

    /// Close the entry with its execution results.
    pub fn complete(&mut self, exit_code: i32, duration: Duration, success: bool) {
        self.is_executed = true;
        self.exit_code = Some(exit_code);
        self.execution_duration = Some(duration);
        self.execution_success = Some(success);
    }
}
