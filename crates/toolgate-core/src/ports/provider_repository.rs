//! Tool provider repository trait and error types.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::provider::{NewToolProvider, ToolProvider};

/// Domain-specific errors for provider repository operations.
#[derive(Debug, Error)]
pub enum ProviderRepositoryError {
    /// The requested provider was not found.
    #[error("Tool provider not found: {0}")]
    NotFound(String),

    /// A provider with the same name already exists.
    #[error("Tool provider already exists: {0}")]
    Conflict(String),

    /// Storage backend error (database, etc.).
    #[error("Storage error: {0}")]
    Internal(String),
}

/// Repository trait for provider configuration persistence.
///
/// # Design Rules
///
/// - Environment variables are embedded in `ToolProvider` - no separate env API
/// - `update()` replaces the entire provider including env atomically
/// - Constraint: unique `name` across all providers
#[async_trait]
pub trait ToolProviderRepository: Send + Sync {
    /// Insert a new provider, returning it with its assigned ID and timestamps.
    ///
    /// # Errors
    ///
    /// - `Conflict` if a provider with the same name already exists
    /// - `Internal` for storage errors
    async fn insert(&self, provider: NewToolProvider)
    -> Result<ToolProvider, ProviderRepositoryError>;

    /// Get a provider by its storage ID.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no provider with the given ID exists
    async fn get_by_id(&self, id: i64) -> Result<ToolProvider, ProviderRepositoryError>;

    /// Get a provider by its unique name.
    async fn get_by_name(&self, name: &str) -> Result<ToolProvider, ProviderRepositoryError>;

    /// List all providers ordered by ID.
    async fn list(&self) -> Result<Vec<ToolProvider>, ProviderRepositoryError>;

    /// Replace an existing provider.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no provider with the given ID exists
    /// - `Conflict` if the new name conflicts with another provider
    async fn update(&self, provider: &ToolProvider) -> Result<(), ProviderRepositoryError>;

    /// Delete a provider by its storage ID.
    async fn delete(&self, id: i64) -> Result<(), ProviderRepositoryError>;
}
