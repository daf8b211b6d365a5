//! Tool-provider domain types.
//!
//! These types are shared between the control plane and its adapters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Environment variable override for a provider process.
///
/// Note: values are stored base64-encoded by the SQLite adapter. This is
/// encoding, NOT encryption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEnvEntry {
    /// Environment variable key
    pub key: String,
    /// Environment variable value
    pub value: String,
}

impl ProviderEnvEntry {
    /// Create a new environment variable entry.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A configured tool provider with a storage ID.
///
/// Use `NewToolProvider` for providers that haven't been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolProvider {
    /// Storage ID of the provider.
    pub id: i64,

    /// User-friendly, unique display name.
    pub name: String,

    /// Executable to launch (name resolved via PATH, or absolute path).
    pub command: String,

    /// Arguments passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment overrides for the process.
    #[serde(default)]
    pub env: Vec<ProviderEnvEntry>,

    /// Working directory for the process (must be absolute if set).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,

    /// Whether the provider is started by the process manager.
    pub enabled: bool,

    /// Whether the provider's resources are exposed alongside its tools.
    pub include_resources: bool,

    /// When the provider was added.
    pub created_at: DateTime<Utc>,

    /// When the configuration was last changed.
    pub updated_at: DateTime<Utc>,
}

impl ToolProvider {
    /// Environment overrides as key/value tuples.
    pub fn env_pairs(&self) -> Vec<(String, String)> {
        self.env
            .iter()
            .map(|e| (e.key.clone(), e.value.clone()))
            .collect()
    }

    /// Apply a patch, returning whether any launch-relevant field changed.
    ///
    /// The `enabled` flag is applied but not counted: callers compare it
    /// separately to decide between start, stop and restart.
    pub fn apply(&mut self, patch: &ToolProviderPatch) -> bool {
        let mut changed = false;

        if let Some(ref name) = patch.name {
            changed |= *name != self.name;
            self.name.clone_from(name);
        }
        if let Some(ref command) = patch.command {
            changed |= *command != self.command;
            self.command.clone_from(command);
        }
        if let Some(ref args) = patch.args {
            changed |= *args != self.args;
            self.args.clone_from(args);
        }
        if let Some(ref env) = patch.env {
            changed |= *env != self.env;
            self.env.clone_from(env);
        }
        if let Some(ref working_dir) = patch.working_dir {
            changed |= *working_dir != self.working_dir;
            self.working_dir.clone_from(working_dir);
        }
        if let Some(include_resources) = patch.include_resources {
            changed |= include_resources != self.include_resources;
            self.include_resources = include_resources;
        }
        if let Some(enabled) = patch.enabled {
            self.enabled = enabled;
        }

        self.updated_at = Utc::now();
        changed
    }

    /// Validate the launch configuration.
    pub fn validate(&self) -> Result<(), String> {
        validate_launch(&self.command, self.working_dir.as_deref())
    }
}

/// A tool provider to be inserted (no ID yet).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewToolProvider {
    /// User-friendly, unique display name.
    pub name: String,

    /// Executable to launch.
    pub command: String,

    /// Arguments passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment overrides for the process.
    #[serde(default)]
    pub env: Vec<ProviderEnvEntry>,

    /// Working directory for the process.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,

    /// Whether the provider is started by the process manager.
    pub enabled: bool,

    /// Whether the provider's resources are exposed alongside its tools.
    pub include_resources: bool,
}

impl NewToolProvider {
    /// Create a new enabled provider launched with `command args...`.
    #[must_use]
    pub fn new(name: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args,
            env: Vec::new(),
            working_dir: None,
            enabled: true,
            include_resources: false,
        }
    }

    /// Add an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push(ProviderEnvEntry::new(key, value));
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set enabled status.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set whether resources are exposed.
    #[must_use]
    pub const fn with_include_resources(mut self, include: bool) -> Self {
        self.include_resources = include;
        self
    }

    /// Validate the launch configuration.
    pub fn validate(&self) -> Result<(), String> {
        validate_launch(&self.command, self.working_dir.as_deref())
    }
}

/// Partial update for an existing provider.
///
/// All fields are optional - only provided fields are updated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolProviderPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<ProviderEnvEntry>>,

    /// `Some(None)` clears the working directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<Option<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_resources: Option<bool>,
}

impl ToolProviderPatch {
    /// Patch that only toggles the `enabled` flag.
    #[must_use]
    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            ..Self::default()
        }
    }
}

fn validate_launch(command: &str, working_dir: Option<&str>) -> Result<(), String> {
    if command.trim().is_empty() {
        return Err("Provider command cannot be empty".to_string());
    }

    if command.contains(char::is_whitespace) {
        return Err(
            "Command must be an executable name/path only (e.g., 'npx'). \
             Put flags and arguments in the 'args' field."
                .to_string(),
        );
    }

    if let Some(cwd) = working_dir {
        if !cwd.is_empty() && !std::path::Path::new(cwd).is_absolute() {
            return Err(format!("Provider working_dir must be absolute: {cwd}"));
        }
    }

    Ok(())
}

/// Runtime state of a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderState {
    /// Not running (initial state)
    #[default]
    Stopped,
    /// Handshake completed, tools callable
    Connected,
    /// Start failed or the process died
    Error,
}

impl ProviderState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for ProviderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-memory runtime status of a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRuntimeStatus {
    pub state: ProviderState,

    /// Short, user-facing error message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Verbose diagnostics: stderr tail and exit reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,

    pub updated_at: DateTime<Utc>,
}

impl ProviderRuntimeStatus {
    /// A fresh `stopped` status.
    pub fn stopped() -> Self {
        Self {
            state: ProviderState::Stopped,
            error: None,
            diagnostics: None,
            updated_at: Utc::now(),
        }
    }

    /// A fresh `connected` status.
    pub fn connected() -> Self {
        Self {
            state: ProviderState::Connected,
            error: None,
            diagnostics: None,
            updated_at: Utc::now(),
        }
    }

    /// A fresh `error` status.
    pub fn error(message: impl Into<String>, diagnostics: Option<String>) -> Self {
        Self {
            state: ProviderState::Error,
            error: Some(message.into()),
            diagnostics: diagnostics.filter(|d| !d.is_empty()),
            updated_at: Utc::now(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == ProviderState::Connected
    }
}

impl Default for ProviderRuntimeStatus {
    fn default() -> Self {
        Self::stopped()
    }
}

/// Tool definition reported by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderTool {
    /// Tool name as known to the provider.
    pub name: String,

    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON Schema for input parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<serde_json::Value>,
}

impl ProviderTool {
    /// Create a new tool definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema: None,
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Set the input schema.
    #[must_use]
    pub fn with_input_schema(mut self, schema: serde_json::Value) -> Self {
        self.input_schema = Some(schema);
        self
    }
}

/// Read-only resource advertised by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderResource {
    pub uri: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Prompt template advertised by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderPrompt {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Value>,
}

/// Entry of the aggregated tool catalog.
///
/// `name` is the catalog-wide key the agent loop sees; `tool.name` is the
/// provider's own name used when calling it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCatalogEntry {
    pub name: String,
    pub server_id: i64,
    pub server_name: String,
    pub tool: ProviderTool,
}

/// Result of a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// Whether the call succeeded.
    pub success: bool,

    /// Result content (if success).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    /// Error message reported by the tool (if failed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolCallResult {
    /// Create a success result.
    #[must_use]
    pub const fn success(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Create an error result.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}
