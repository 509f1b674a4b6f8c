//! In-memory history and audit storage.

use std::{collections::HashMap, sync::RwLock, time::Duration};

use async_trait::async_trait;
use twinshell_core::{
    AuditLogEntry, AuditLogSink, CommandHistoryEntry, CommandHistoryStore, NewCommandHistory,
    traits::{AuditError, StorageError},
};

/// In-memory command history.
///
/// Useful for development and single-process deployments.
/// Data is lost on restart.
pub struct MemoryHistory {
    entries: RwLock<HashMap<String, CommandHistoryEntry>>,
}

impl MemoryHistory {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandHistoryStore for MemoryHistory {
    async fn add_command(&self, entry: NewCommandHistory) -> Result<String, StorageError> {
        let entry = CommandHistoryEntry::from_new(entry);
        let id = entry.id.clone();

        self.entries
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .insert(id.clone(), entry);

        Ok(id)
    }

    async fn update_with_execution_results(
        &self,
        history_id: &str,
        exit_code: i32,
        duration: Duration,
        success: bool,
    ) -> Result<(), StorageError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?;

        let entry = entries
            .get_mut(history_id)
            .ok_or_else(|| StorageError::NotFound(history_id.to_string()))?;

        entry.complete(exit_code, duration, success);

        Ok(())
    }

    async fn get(&self, history_id: &str) -> Result<Option<CommandHistoryEntry>, StorageError> {
        Ok(self
            .entries
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .get(history_id)
            .cloned())
    }

    async fn recent(&self, count: usize) -> Result<Vec<CommandHistoryEntry>, StorageError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?;

        let mut result: Vec<CommandHistoryEntry> = entries.values().cloned().collect();

        // Newest first
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        result.truncate(count);

        Ok(result)
    }
}

/// In-memory audit trail, in append order.
pub struct MemoryAuditLog {
    entries: RwLock<Vec<AuditLogEntry>>,
}

impl MemoryAuditLog {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Snapshot of every entry written so far.
    ///
    /// # Errors
    /// Returns error if the lock is poisoned.
    pub fn entries(&self) -> Result<Vec<AuditLogEntry>, AuditError> {
        Ok(self
            .entries
            .read()
            .map_err(|e| AuditError::Write(e.to_string()))?
            .clone())
    }
}

impl Default for MemoryAuditLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditLogSink for MemoryAuditLog {
    async fn add_log(&self, entry: AuditLogEntry) -> Result<(), AuditError> {
        self.entries
            .write()
            .map_err(|e| AuditError::Write(e.to_string()))?
            .push(entry);
        Ok(())
    }
}
