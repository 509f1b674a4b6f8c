//! Parameters of a single session run.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use twinshell_core::{NewCommandHistory, Platform};

/// A request to run one command through the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecuteRequest {
    pub command: String,
    pub platform: Platform,
    pub is_dangerous: bool,
    /// Only consulted when `is_dangerous` is set.
    pub require_confirmation: bool,
    /// History is only recorded for requests tied to an action.
    pub action_id: Option<String>,
    pub action_title: String,
    pub category: String,
    pub parameters: HashMap<String, String>,
}

impl Default for ExecuteRequest {
    fn default() -> Self {
        Self {
            command: String::new(),
            platform: Platform::default(),
            is_dangerous: false,
            require_confirmation: true,
            action_id: None,
            action_title: String::new(),
            category: String::new(),
            parameters: HashMap::new(),
        }
    }
}

impl ExecuteRequest {
    #[must_use]
    pub fn new(command: impl Into<String>, platform: Platform) -> Self {
        Self {
            command: command.into(),
            platform,
            ..Self::default()
        }
    }

    /// Mark the command as dangerous.
    #[must_use]
    pub const fn dangerous(mut self) -> Self {
        self.is_dangerous = true;
        self
    }

    /// Skip the confirmation prompt even if dangerous.
    #[must_use]
    pub const fn without_confirmation(mut self) -> Self {
        self.require_confirmation = false;
        self
    }

    #[must_use]
    pub fn with_action(
        mut self,
        action_id: impl Into<String>,
        title: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        self.action_id = Some(action_id.into());
        self.action_title = title.into();
        self.category = category.into();
        self
    }

    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Whether the user must be asked before running.
    #[must_use]
    pub const fn needs_confirmation(&self) -> bool {
        self.is_dangerous && self.require_confirmation
    }

    /// History record to open before running, if the request has an action.
    #[must_use]
    pub fn history_record(&self) -> Option<NewCommandHistory> {
        let action_id = self.action_id.clone()?;
        Some(NewCommandHistory {
            action_id,
            command: self.command.clone(),
            parameters: self.parameters.clone(),
            platform: self.platform,
            action_title: self.action_title.clone(),
            category: self.category.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmation_only_for_dangerous_requests() {
        let request = ExecuteRequest::new("Get-Process", Platform::Windows);
        assert!(request.require_confirmation);
        assert!(!request.needs_confirmation());
        assert!(request.clone().dangerous().needs_confirmation());
        assert!(
            !request
                .dangerous()
                .without_confirmation()
                .needs_confirmation()
        );
    }

    #[test]
    fn test_history_record_requires_action() {
        let request = ExecuteRequest::new("ls", Platform::Linux);
        assert!(request.history_record().is_none());

        let record = request
            .with_action("list-files", "List files", "Files")
            .with_parameter("path", "/tmp")
            .history_record()
            .unwrap();
        assert_eq!(record.action_id, "list-files");
        assert_eq!(record.command, "ls");
        assert_eq!(record.parameters.get("path").map(String::as_str), Some("/tmp"));
    }

    #[test]
    fn test_deserialize_defaults_confirmation_on() {
        let request: ExecuteRequest =
            serde_json::from_str(r#"{"command":"whoami","platform":"Linux","isDangerous":true}"#)
                .unwrap();
        assert!(request.needs_confirmation());
        assert!(request.parameters.is_empty());
    }
}
