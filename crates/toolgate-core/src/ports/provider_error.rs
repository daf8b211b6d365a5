//! Process manager error types.

use thiserror::Error;

use super::ProviderRepositoryError;

/// Errors returned by process manager operations.
///
/// Infrastructure failures (spawn errors, broken pipes) are converted into
/// these variants at the connection boundary with diagnostics attached.
#[derive(Debug, Error)]
pub enum ProviderServiceError {
    /// No configuration with this ID is registered.
    #[error("Tool provider config not found: {0}")]
    ConfigNotFound(i64),

    /// Repository operation failed.
    #[error(transparent)]
    Repository(ProviderRepositoryError),

    /// Spawn or handshake failed.
    #[error("Failed to start tool provider: {message}")]
    StartFailed {
        message: String,
        /// Stderr tail and exit reason captured from the process.
        diagnostics: Option<String>,
    },

    /// Provider failed to stop cleanly.
    #[error("Failed to stop tool provider: {0}")]
    StopFailed(String),

    /// Provider is not connected.
    #[error("Tool provider not running: {0}")]
    NotRunning(i64),

    /// Listing tools failed on a connected provider.
    #[error("Failed to list tools: {0}")]
    ToolListFailed(String),

    /// The provider rejected or failed a request.
    #[error("Tool provider request failed: {0}")]
    Request(String),

    /// Configuration validation error.
    #[error("Invalid tool provider configuration: {0}")]
    InvalidConfig(String),
}

impl From<ProviderRepositoryError> for ProviderServiceError {
    fn from(error: ProviderRepositoryError) -> Self {
        match error {
            ProviderRepositoryError::NotFound(id) => id
                .parse()
                .map_or(Self::Repository(ProviderRepositoryError::NotFound(id)), Self::ConfigNotFound),
            other => Self::Repository(other),
        }
    }
}

impl ProviderServiceError {
    /// Message plus diagnostics block, for verbose rendering.
    pub fn detailed(&self) -> String {
        match self {
            Self::StartFailed {
                message,
                diagnostics: Some(diag),
            } => format!("{message}\n\n{diag}"),
            other => other.to_string(),
        }
    }
}

/// User-safe error information for provider events.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderErrorInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_id: Option<i64>,

    pub server_name: String,

    /// Short, user-friendly message.
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,

    pub category: ProviderErrorCategory,
}

/// Categories of provider errors for UI handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorCategory {
    /// Process lifecycle error (spawn, handshake, crash).
    Process,
    /// Protocol communication error.
    Protocol,
    /// Configuration error.
    Configuration,
    /// Unknown/internal error.
    Unknown,
}

impl ProviderErrorInfo {
    /// Create error info for a process error.
    pub fn process(
        server_id: Option<i64>,
        server_name: impl Into<String>,
        message: impl Into<String>,
        diagnostics: Option<String>,
    ) -> Self {
        Self {
            server_id,
            server_name: server_name.into(),
            message: message.into(),
            diagnostics,
            category: ProviderErrorCategory::Process,
        }
    }
}

impl From<&ProviderServiceError> for ProviderErrorCategory {
    fn from(error: &ProviderServiceError) -> Self {
        match error {
            ProviderServiceError::Repository(_) => Self::Unknown,
            ProviderServiceError::StartFailed { .. }
            | ProviderServiceError::StopFailed(_)
            | ProviderServiceError::NotRunning(_) => Self::Process,
            ProviderServiceError::ToolListFailed(_) | ProviderServiceError::Request(_) => {
                Self::Protocol
            }
            ProviderServiceError::ConfigNotFound(_) | ProviderServiceError::InvalidConfig(_) => {
                Self::Configuration
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_not_found_maps_to_config_not_found() {
        let err: ProviderServiceError = ProviderRepositoryError::NotFound("7".to_string()).into();
        assert!(matches!(err, ProviderServiceError::ConfigNotFound(7)));

        let err: ProviderServiceError =
            ProviderRepositoryError::NotFound("by-name".to_string()).into();
        assert!(matches!(err, ProviderServiceError::Repository(_)));
    }

    #[test]
    fn test_detailed_includes_diagnostics() {
        let err = ProviderServiceError::StartFailed {
            message: "handshake failed".to_string(),
            diagnostics: Some("stderr:\n  boom\nexit: code 1".to_string()),
        };
        let text = err.detailed();
        assert!(text.starts_with("handshake failed"));
        assert!(text.contains("exit: code 1"));
        assert_eq!(ProviderErrorCategory::from(&err), ProviderErrorCategory::Process);
    }
}
