//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces the control plane expects from infrastructure.
//! They contain no implementation details and use only domain types.
//!
//! # Design Rules
//!
//! - No `sqlx` types in any signature
//! - No process implementation details
//! - Traits are minimal and CRUD-focused for repositories

pub mod event_emitter;
pub mod invocation_recorder;
pub mod permission_repository;
pub mod provider_error;
pub mod provider_repository;

use std::sync::Arc;

pub use event_emitter::{AppEventEmitter, NoopEmitter};
pub use invocation_recorder::{NoopRecorder, RecorderError, ToolInvocationRecorder};
pub use permission_repository::{PermissionRepositoryError, PermissionRuleRepository};
pub use provider_error::{ProviderErrorCategory, ProviderErrorInfo, ProviderServiceError};
pub use provider_repository::{ProviderRepositoryError, ToolProviderRepository};

/// Container for all repository trait objects.
///
/// Lives in `toolgate-core` so that services can accept it without
/// depending on `toolgate-db`.
///
/// # Example
///
/// ```ignore
/// // In toolgate-db factory:
/// let repos = CoreFactory::build_repos(pool);
///
/// // In adapter bootstrap:
/// let manager = ProcessManager::new(repos.providers.clone(), ...);
/// ```
#[derive(Clone)]
pub struct Repos {
    /// Tool provider configurations.
    pub providers: Arc<dyn ToolProviderRepository>,
    /// Auto-approve permission rules.
    pub permission_rules: Arc<dyn PermissionRuleRepository>,
    /// Tool invocation outcome sink.
    pub invocations: Arc<dyn ToolInvocationRecorder>,
}

impl Repos {
    pub fn new(
        providers: Arc<dyn ToolProviderRepository>,
        permission_rules: Arc<dyn PermissionRuleRepository>,
        invocations: Arc<dyn ToolInvocationRecorder>,
    ) -> Self {
        Self {
            providers,
            permission_rules,
            invocations,
        }
    }
}
