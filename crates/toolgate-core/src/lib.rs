//! Core domain types, ports and configuration for the toolgate control plane.
//!
//! This crate has no process, database or terminal dependencies. Adapters
//! (`toolgate-mcp`, `toolgate-db`, `toolgate-cli`) implement or consume the
//! ports defined here.

pub mod domain;
pub mod events;
pub mod paths;
pub mod ports;
pub mod settings;

// Re-export commonly used types for convenience
pub use domain::{
    APPROVAL_TIMEOUT_REASON, ApprovalContext, ApprovalDecision, ApprovalRequest, ApprovalStatus,
    InvocationStatus, NewPermissionRule, NewToolProvider, PermissionRule, PermissionRulePatch,
    ProviderEnvEntry, ProviderPrompt, ProviderResource, ProviderRuntimeStatus, ProviderState,
    ProviderTool, ToolCallResult, ToolCatalogEntry, ToolInvocationRecord, ToolProvider,
    ToolProviderPatch,
};
pub use events::{AppEvent, ApprovalEvent, ProviderStatusChange, ProviderSummary};
pub use ports::{
    AppEventEmitter, NoopEmitter, NoopRecorder, PermissionRepositoryError,
    PermissionRuleRepository, ProviderErrorCategory, ProviderErrorInfo, ProviderRepositoryError,
    ProviderServiceError, RecorderError, Repos, ToolInvocationRecorder, ToolProviderRepository,
};
pub use settings::{ControlPlaneSettings, SettingsError, SettingsUpdate, validate_settings};

pub use paths::{PathError, data_root, database_path};
