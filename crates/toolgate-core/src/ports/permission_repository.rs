//! Permission rule repository trait and error types.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::permission::{NewPermissionRule, PermissionRule};

/// Errors for permission rule storage.
#[derive(Debug, Error)]
pub enum PermissionRepositoryError {
    #[error("Permission rule not found: {0}")]
    NotFound(i64),

    #[error("Storage error: {0}")]
    Internal(String),
}

/// Persistence port for permission rules.
///
/// `list()` returns rules ordered by `priority` descending, ties in storage
/// (insertion) order.
#[async_trait]
pub trait PermissionRuleRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<PermissionRule>, PermissionRepositoryError>;

    async fn get_by_id(&self, id: i64) -> Result<PermissionRule, PermissionRepositoryError>;

    async fn insert(
        &self,
        rule: NewPermissionRule,
    ) -> Result<PermissionRule, PermissionRepositoryError>;

    /// Replace an existing rule.
    async fn update(&self, rule: &PermissionRule) -> Result<(), PermissionRepositoryError>;

    async fn delete(&self, id: i64) -> Result<(), PermissionRepositoryError>;

    /// Delete every rule, returning how many were removed.
    async fn delete_all(&self) -> Result<u64, PermissionRepositoryError>;
}
