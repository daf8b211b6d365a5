//! CLI-specific error types and mappings.
//!
//! Maps control-plane errors to exit codes and user-facing messages.

use thiserror::Error;
use toolgate_core::{PathError, ProviderServiceError, SettingsError};
use toolgate_mcp::{PermissionError, ToolExecutionError};

/// CLI-specific error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Control-plane error without a more specific category.
    #[error("{0}")]
    Core(String),

    /// Argument parsing error.
    #[error("Invalid arguments: {0}")]
    Arguments(String),

    /// IO error (file not found, permission denied, etc.).
    #[error("IO error: {0}")]
    Io(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// Provider process error.
    #[error("Process error: {0}")]
    Process(String),

    /// Requested provider, rule or tool does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The tool call was declined or cancelled.
    #[error("{0}")]
    Declined(String),
}

impl CliError {
    /// Map error to appropriate exit code.
    ///
    /// Exit codes follow Unix conventions:
    /// - 0: Success
    /// - 1: General error
    /// - 2: Misuse of shell command (invalid arguments)
    /// - 64-78: Reserved for specific error categories (see sysexits.h)
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Core(_) | Self::Declined(_) => 1,
            Self::Arguments(_) => 2,  // EX_USAGE
            Self::NotFound(_) => 66,  // EX_NOINPUT
            Self::Io(_) => 74,        // EX_IOERR
            Self::Config(_) => 78,    // EX_CONFIG
            Self::Database(_) => 73,  // EX_CANTCREAT (closest fit)
            Self::Process(_) => 71,   // EX_OSERR
        }
    }
}

impl From<ProviderServiceError> for CliError {
    fn from(err: ProviderServiceError) -> Self {
        match err {
            ProviderServiceError::ConfigNotFound(id) => Self::NotFound(format!("provider {id}")),
            ProviderServiceError::Repository(e) => Self::Database(e.to_string()),
            ProviderServiceError::InvalidConfig(msg) => Self::Arguments(msg),
            other @ (ProviderServiceError::StartFailed { .. }
            | ProviderServiceError::StopFailed(_)
            | ProviderServiceError::NotRunning(_)) => Self::Process(other.detailed()),
            other => Self::Core(other.to_string()),
        }
    }
}

impl From<PermissionError> for CliError {
    fn from(err: PermissionError) -> Self {
        match err {
            PermissionError::Validation(msg) => Self::Arguments(msg),
            PermissionError::Repository(toolgate_core::PermissionRepositoryError::NotFound(id)) => {
                Self::NotFound(format!("rule {id}"))
            }
            PermissionError::Repository(e) => Self::Database(e.to_string()),
        }
    }
}

impl From<ToolExecutionError> for CliError {
    fn from(err: ToolExecutionError) -> Self {
        match err {
            ToolExecutionError::UnknownTool(name) => Self::NotFound(format!("tool '{name}'")),
            ToolExecutionError::Provider(e) => e.into(),
            e @ (ToolExecutionError::Declined { .. } | ToolExecutionError::Cancelled) => {
                Self::Declined(e.to_string())
            }
            e @ ToolExecutionError::ToolFault(_) => Self::Core(e.to_string()),
        }
    }
}

impl From<SettingsError> for CliError {
    fn from(err: SettingsError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<PathError> for CliError {
    fn from(err: PathError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::Arguments("x".into()).exit_code(), 2);
        assert_eq!(CliError::Config("x".into()).exit_code(), 78);
        assert_eq!(CliError::NotFound("x".into()).exit_code(), 66);
        assert_eq!(CliError::Declined("x".into()).exit_code(), 1);
    }

    #[test]
    fn test_provider_errors_map_to_categories() {
        let err: CliError = ProviderServiceError::ConfigNotFound(3).into();
        assert!(matches!(err, CliError::NotFound(ref m) if m == "provider 3"));

        let err: CliError = ProviderServiceError::InvalidConfig("bad".into()).into();
        assert!(matches!(err, CliError::Arguments(_)));

        let err: CliError = ProviderServiceError::StartFailed {
            message: "spawn failed".into(),
            diagnostics: Some("exit: code 127".into()),
        }
        .into();
        match err {
            CliError::Process(msg) => assert!(msg.contains("exit: code 127")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_execution_errors_map_to_categories() {
        let err: CliError = ToolExecutionError::Declined {
            reason: Some("Approval timed out".into()),
        }
        .into();
        assert!(matches!(err, CliError::Declined(ref m) if m.contains("Approval timed out")));

        let err: CliError = ToolExecutionError::UnknownTool("nope".into()).into();
        assert_eq!(err.exit_code(), 66);

        let err: CliError =
            ToolExecutionError::Provider(ProviderServiceError::NotRunning(2)).into();
        assert!(matches!(err, CliError::Process(_)));
    }

    #[test]
    fn test_settings_error_is_config() {
        let err: CliError = SettingsError::InvalidApprovalTimeout.into();
        assert_eq!(err.exit_code(), 78);
    }
}
