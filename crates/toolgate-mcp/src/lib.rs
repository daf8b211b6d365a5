//! Tool execution control plane.
//!
//! - [`ProcessManager`] supervises tool-provider subprocesses and aggregates
//!   their tool catalogs.
//! - [`PermissionEngine`] decides which calls run without asking.
//! - [`ApprovalCoordinator`] suspends the remaining calls until a human
//!   decides.
//! - [`ToolExecutor`] is the single entry point the agent loop uses.

#![deny(unsafe_code)]

pub mod approval;
pub mod connection;
pub mod executor;
pub(crate) mod manager;
pub mod permissions;

#[cfg(test)]
pub(crate) mod test_support;

pub use approval::{ApprovalCoordinator, ApprovalTicket};
pub use connection::{
    ConnectionError, ConnectionFactory, ExitReason, ProviderConnection, StartFailure,
    StdioConnectionFactory,
};
pub use executor::{ToolCall, ToolExecution, ToolExecutionError, ToolExecutor};
pub use manager::{NAMESPACE_SEPARATOR, ProcessManager};
pub use permissions::{PermissionEngine, PermissionError};

// Re-export domain types from core for convenience
pub use toolgate_core::{
    ApprovalContext, ApprovalDecision, ApprovalRequest, ProviderRuntimeStatus, ProviderState,
    ProviderTool, ToolCallResult, ToolCatalogEntry, ToolProvider,
};
