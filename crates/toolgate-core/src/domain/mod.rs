//! Core domain types.
//!
//! These types represent the pure domain model, independent of any
//! infrastructure concerns (database, process management, etc.).
//!
//! # Structure
//!
//! - `provider` - Tool provider configuration, runtime status, tools and catalog entries
//! - `permission` - Auto-approve rules
//! - `approval` - In-flight human approval requests
//! - `invocation` - Tool call outcome records

pub mod approval;
pub mod invocation;
pub mod permission;
pub mod provider;

pub use approval::{
    APPROVAL_TIMEOUT_REASON, ApprovalContext, ApprovalDecision, ApprovalRequest, ApprovalStatus,
};
pub use invocation::{InvocationStatus, ToolInvocationRecord};
pub use permission::{NewPermissionRule, PermissionRule, PermissionRulePatch};
pub use provider::{
    NewToolProvider, ProviderEnvEntry, ProviderPrompt, ProviderResource, ProviderRuntimeStatus,
    ProviderState, ProviderTool, ToolCallResult, ToolCatalogEntry, ToolProvider,
    ToolProviderPatch,
};
