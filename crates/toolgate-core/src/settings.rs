//! Control plane settings and validation.
//!
//! Pure configuration types with no infrastructure dependencies. Adapters
//! build a `ControlPlaneSettings` from defaults, then layer environment
//! overrides and explicit updates on top.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default time a tool call may wait for a human decision.
pub const DEFAULT_APPROVAL_TIMEOUT_SECS: u64 = 300;

/// Default lifetime of the cached permission rule list.
pub const DEFAULT_RULE_CACHE_TTL_MS: u64 = 5_000;

/// Default number of stderr lines kept per provider.
pub const DEFAULT_DIAGNOSTIC_LINES: usize = 10;

/// Default timeout for a single protocol request (handshake, list, call).
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default bound on a single `tools/call`. Callers stop sooner by cancelling.
pub const DEFAULT_TOOL_CALL_TIMEOUT_SECS: u64 = 600;

pub const ENV_APPROVAL_TIMEOUT_SECS: &str = "TOOLGATE_APPROVAL_TIMEOUT_SECS";
pub const ENV_RULE_CACHE_TTL_MS: &str = "TOOLGATE_RULE_CACHE_TTL_MS";
pub const ENV_DIAGNOSTIC_LINES: &str = "TOOLGATE_DIAGNOSTIC_LINES";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "TOOLGATE_REQUEST_TIMEOUT_SECS";
pub const ENV_TOOL_CALL_TIMEOUT_SECS: &str = "TOOLGATE_TOOL_CALL_TIMEOUT_SECS";

/// Control plane settings.
///
/// All fields are optional to support partial updates and graceful defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ControlPlaneSettings {
    /// Seconds before a pending approval is declined automatically.
    pub approval_timeout_secs: Option<u64>,

    /// Milliseconds the permission rule cache stays fresh.
    pub rule_cache_ttl_ms: Option<u64>,

    /// Stderr lines retained for start-failure diagnostics (1-1000).
    pub diagnostic_lines: Option<usize>,

    /// Seconds before an unanswered provider request fails.
    pub request_timeout_secs: Option<u64>,

    /// Seconds before an unanswered tool call fails.
    pub tool_call_timeout_secs: Option<u64>,
}

impl ControlPlaneSettings {
    /// Create settings with sensible defaults.
    #[must_use]
    pub const fn with_defaults() -> Self {
        Self {
            approval_timeout_secs: Some(DEFAULT_APPROVAL_TIMEOUT_SECS),
            rule_cache_ttl_ms: Some(DEFAULT_RULE_CACHE_TTL_MS),
            diagnostic_lines: Some(DEFAULT_DIAGNOSTIC_LINES),
            request_timeout_secs: Some(DEFAULT_REQUEST_TIMEOUT_SECS),
            tool_call_timeout_secs: Some(DEFAULT_TOOL_CALL_TIMEOUT_SECS),
        }
    }

    #[must_use]
    pub const fn approval_timeout(&self) -> Duration {
        match self.approval_timeout_secs {
            Some(secs) => Duration::from_secs(secs),
            None => Duration::from_secs(DEFAULT_APPROVAL_TIMEOUT_SECS),
        }
    }

    #[must_use]
    pub const fn rule_cache_ttl(&self) -> Duration {
        match self.rule_cache_ttl_ms {
            Some(ms) => Duration::from_millis(ms),
            None => Duration::from_millis(DEFAULT_RULE_CACHE_TTL_MS),
        }
    }

    #[must_use]
    pub const fn effective_diagnostic_lines(&self) -> usize {
        match self.diagnostic_lines {
            Some(lines) => lines,
            None => DEFAULT_DIAGNOSTIC_LINES,
        }
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        match self.request_timeout_secs {
            Some(secs) => Duration::from_secs(secs),
            None => Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    #[must_use]
    pub const fn tool_call_timeout(&self) -> Duration {
        match self.tool_call_timeout_secs {
            Some(secs) => Duration::from_secs(secs),
            None => Duration::from_secs(DEFAULT_TOOL_CALL_TIMEOUT_SECS),
        }
    }

    /// Merge an update into these settings, only touching fields that are Some.
    pub fn merge(&mut self, other: &SettingsUpdate) {
        if let Some(secs) = other.approval_timeout_secs {
            self.approval_timeout_secs = secs;
        }
        if let Some(ms) = other.rule_cache_ttl_ms {
            self.rule_cache_ttl_ms = ms;
        }
        if let Some(lines) = other.diagnostic_lines {
            self.diagnostic_lines = lines;
        }
        if let Some(secs) = other.request_timeout_secs {
            self.request_timeout_secs = secs;
        }
        if let Some(secs) = other.tool_call_timeout_secs {
            self.tool_call_timeout_secs = secs;
        }
    }

    /// Apply `TOOLGATE_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), SettingsError> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Unset and blank keys are ignored; unparseable values are an error.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &'static str| -> Result<Option<u64>, SettingsError> {
            match lookup(key) {
                Some(raw) if !raw.trim().is_empty() => raw
                    .trim()
                    .parse::<u64>()
                    .map(Some)
                    .map_err(|_| SettingsError::InvalidEnvValue { key, value: raw }),
                _ => Ok(None),
            }
        };

        if let Some(secs) = read(ENV_APPROVAL_TIMEOUT_SECS)? {
            self.approval_timeout_secs = Some(secs);
        }
        if let Some(ms) = read(ENV_RULE_CACHE_TTL_MS)? {
            self.rule_cache_ttl_ms = Some(ms);
        }
        if let Some(lines) = read(ENV_DIAGNOSTIC_LINES)? {
            let lines = usize::try_from(lines).map_err(|_| SettingsError::InvalidEnvValue {
                key: ENV_DIAGNOSTIC_LINES,
                value: lines.to_string(),
            })?;
            self.diagnostic_lines = Some(lines);
        }
        if let Some(secs) = read(ENV_REQUEST_TIMEOUT_SECS)? {
            self.request_timeout_secs = Some(secs);
        }
        if let Some(secs) = read(ENV_TOOL_CALL_TIMEOUT_SECS)? {
            self.tool_call_timeout_secs = Some(secs);
        }
        Ok(())
    }
}

/// Partial settings update.
///
/// Each field is `Option<Option<T>>`:
/// - `None` = don't change this field
/// - `Some(None)` = reset field to its default
/// - `Some(Some(value))` = set field to value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsUpdate {
    pub approval_timeout_secs: Option<Option<u64>>,
    pub rule_cache_ttl_ms: Option<Option<u64>>,
    pub diagnostic_lines: Option<Option<usize>>,
    pub request_timeout_secs: Option<Option<u64>>,
    pub tool_call_timeout_secs: Option<Option<u64>>,
}

/// Settings validation error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SettingsError {
    #[error("Approval timeout must be at least 1 second")]
    InvalidApprovalTimeout,

    #[error("Request timeout must be at least 1 second")]
    InvalidRequestTimeout,

    #[error("Diagnostic lines must be between 1 and 1000, got {0}")]
    InvalidDiagnosticLines(usize),

    #[error("Invalid value for {key}: {value:?}")]
    InvalidEnvValue { key: &'static str, value: String },
}

/// Validate settings values.
pub fn validate_settings(settings: &ControlPlaneSettings) -> Result<(), SettingsError> {
    if settings.approval_timeout_secs == Some(0) {
        return Err(SettingsError::InvalidApprovalTimeout);
    }

    if settings.request_timeout_secs == Some(0) || settings.tool_call_timeout_secs == Some(0) {
        return Err(SettingsError::InvalidRequestTimeout);
    }

    if let Some(lines) = settings.diagnostic_lines {
        if !(1..=1000).contains(&lines) {
            return Err(SettingsError::InvalidDiagnosticLines(lines));
        }
    }

    // A zero TTL is valid: every evaluation reloads the rules.
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_settings() {
        let settings = ControlPlaneSettings::with_defaults();
        assert_eq!(settings.approval_timeout(), Duration::from_secs(300));
        assert_eq!(settings.rule_cache_ttl(), Duration::from_millis(5_000));
        assert_eq!(settings.effective_diagnostic_lines(), 10);
        assert_eq!(settings.request_timeout(), Duration::from_secs(30));
        assert_eq!(settings.tool_call_timeout(), Duration::from_secs(600));
        assert!(validate_settings(&settings).is_ok());
    }

    #[test]
    fn test_empty_settings_fall_back_to_defaults() {
        let settings = ControlPlaneSettings::default();
        assert_eq!(settings.approval_timeout(), Duration::from_secs(300));
        assert_eq!(settings.effective_diagnostic_lines(), DEFAULT_DIAGNOSTIC_LINES);
    }

    #[test]
    fn test_merge_only_touches_set_fields() {
        let mut settings = ControlPlaneSettings::with_defaults();
        settings.merge(&SettingsUpdate {
            approval_timeout_secs: Some(Some(5)),
            diagnostic_lines: Some(None),
            ..Default::default()
        });
        assert_eq!(settings.approval_timeout_secs, Some(5));
        assert_eq!(settings.diagnostic_lines, None);
        assert_eq!(settings.rule_cache_ttl_ms, Some(DEFAULT_RULE_CACHE_TTL_MS));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_APPROVAL_TIMEOUT_SECS, "12"),
            (ENV_RULE_CACHE_TTL_MS, " "),
            (ENV_DIAGNOSTIC_LINES, "25"),
            (ENV_TOOL_CALL_TIMEOUT_SECS, "1800"),
        ]
        .into_iter()
        .collect();

        let mut settings = ControlPlaneSettings::with_defaults();
        settings
            .apply_overrides_from(|key| vars.get(key).map(|v| (*v).to_string()))
            .unwrap();

        assert_eq!(settings.approval_timeout_secs, Some(12));
        assert_eq!(settings.rule_cache_ttl_ms, Some(DEFAULT_RULE_CACHE_TTL_MS));
        assert_eq!(settings.diagnostic_lines, Some(25));
        assert_eq!(settings.tool_call_timeout(), Duration::from_secs(1800));
        assert_eq!(settings.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut settings = ControlPlaneSettings::with_defaults();
        let result = settings.apply_overrides_from(|key| {
            (key == ENV_REQUEST_TIMEOUT_SECS).then(|| "soon".to_string())
        });
        assert!(matches!(
            result,
            Err(SettingsError::InvalidEnvValue { key: ENV_REQUEST_TIMEOUT_SECS, .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_timeouts() {
        let settings = ControlPlaneSettings {
            approval_timeout_secs: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            validate_settings(&settings),
            Err(SettingsError::InvalidApprovalTimeout)
        ));

        let settings = ControlPlaneSettings {
            tool_call_timeout_secs: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            validate_settings(&settings),
            Err(SettingsError::InvalidRequestTimeout)
        ));

        let settings = ControlPlaneSettings {
            diagnostic_lines: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            validate_settings(&settings),
            Err(SettingsError::InvalidDiagnosticLines(0))
        ));
    }
}
