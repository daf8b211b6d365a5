//! Permission rule domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted auto-approve rule.
///
/// A rule applies to one provider (`server_id`) or to all of them (`None`).
/// It targets an exact tool name, a wildcard pattern, or, with both unset,
/// every tool (catch-all).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRule {
    pub id: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_id: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_pattern: Option<String>,

    pub auto_approve: bool,

    /// Higher priorities are evaluated first.
    pub priority: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PermissionRule {
    /// Whether the rule applies to every tool of its scope.
    pub const fn is_catch_all(&self) -> bool {
        self.tool_name.is_none() && self.tool_pattern.is_none()
    }

    /// Short human-readable description of what the rule targets.
    pub fn target(&self) -> String {
        let scope = self
            .server_id
            .map_or_else(|| "any provider".to_string(), |id| format!("provider {id}"));
        match (&self.tool_name, &self.tool_pattern) {
            (Some(name), _) => format!("{name} on {scope}"),
            (None, Some(pattern)) => format!("{pattern} on {scope}"),
            (None, None) => format!("* on {scope}"),
        }
    }
}

/// A rule to be inserted (no ID yet).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPermissionRule {
    #[serde(default)]
    pub server_id: Option<i64>,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub tool_pattern: Option<String>,
    pub auto_approve: bool,
    #[serde(default)]
    pub priority: i64,
}

impl NewPermissionRule {
    /// Rule deciding every tool of every provider.
    #[must_use]
    pub fn global(auto_approve: bool) -> Self {
        Self {
            auto_approve,
            ..Self::default()
        }
    }

    /// Rule deciding one exact tool name.
    #[must_use]
    pub fn for_tool(tool_name: impl Into<String>, auto_approve: bool) -> Self {
        Self {
            tool_name: Some(tool_name.into()),
            auto_approve,
            ..Self::default()
        }
    }

    /// Rule deciding every tool whose name matches a wildcard pattern.
    #[must_use]
    pub fn for_pattern(pattern: impl Into<String>, auto_approve: bool) -> Self {
        Self {
            tool_pattern: Some(pattern.into()),
            auto_approve,
            ..Self::default()
        }
    }

    /// Restrict the rule to one provider.
    #[must_use]
    pub const fn on_server(mut self, server_id: i64) -> Self {
        self.server_id = Some(server_id);
        self
    }

    /// Set the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// A rule targets either a name or a pattern, never both.
    pub fn validate(&self) -> Result<(), String> {
        validate_target(self.tool_name.as_deref(), self.tool_pattern.as_deref())
    }
}

/// Partial update of a rule.
///
/// Nullable fields use `Option<Option<T>>`: `None` leaves the field alone,
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRulePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<Option<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_pattern: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_approve: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
}

impl PermissionRule {
    /// Apply a patch in place and validate the result.
    pub fn apply(&mut self, patch: &PermissionRulePatch) -> Result<(), String> {
        if let Some(server_id) = patch.server_id {
            self.server_id = server_id;
        }
        if let Some(ref tool_name) = patch.tool_name {
            self.tool_name.clone_from(tool_name);
        }
        if let Some(ref tool_pattern) = patch.tool_pattern {
            self.tool_pattern.clone_from(tool_pattern);
        }
        if let Some(auto_approve) = patch.auto_approve {
            self.auto_approve = auto_approve;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        self.updated_at = Utc::now();
        validate_target(self.tool_name.as_deref(), self.tool_pattern.as_deref())
    }
}

fn validate_target(tool_name: Option<&str>, tool_pattern: Option<&str>) -> Result<(), String> {
    match (tool_name, tool_pattern) {
        (Some(_), Some(_)) => {
            Err("A rule may set tool_name or tool_pattern, not both".to_string())
        }
        (Some(name), None) if name.is_empty() => Err("tool_name cannot be empty".to_string()),
        (None, Some(pattern)) if pattern.is_empty() => {
            Err("tool_pattern cannot be empty".to_string())
        }
        _ => Ok(()),
    }
}
