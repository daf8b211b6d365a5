//! Composition utilities for building [`Repos`] with `SQLite` backends.
//!
//! Focused purely on construction; no domain logic lives here.

use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;

use toolgate_core::Repos;

use crate::repositories::{
    SqliteInvocationRecorder, SqlitePermissionRuleRepository, SqliteProviderRepository,
};
use crate::setup::setup_database;

/// Factory for creating repository instances with `SQLite` backends.
pub struct CoreFactory;

impl CoreFactory {
    /// Open the database at `db_path` and build every repository.
    pub async fn open(db_path: &Path) -> anyhow::Result<Repos> {
        let pool = setup_database(db_path).await?;
        Ok(Self::build_repos(pool))
    }

    /// Build all `SQLite` repositories from a pool.
    ///
    /// This is the recommended way for adapters to obtain repositories.
    pub fn build_repos(pool: SqlitePool) -> Repos {
        Repos::new(
            Self::provider_repository(pool.clone()),
            Self::permission_repository(pool.clone()),
            Self::invocation_recorder(pool),
        )
    }

    pub fn provider_repository(pool: SqlitePool) -> Arc<SqliteProviderRepository> {
        Arc::new(SqliteProviderRepository::new(pool))
    }

    pub fn permission_repository(pool: SqlitePool) -> Arc<SqlitePermissionRuleRepository> {
        Arc::new(SqlitePermissionRuleRepository::new(pool))
    }

    pub fn invocation_recorder(pool: SqlitePool) -> Arc<SqliteInvocationRecorder> {
        Arc::new(SqliteInvocationRecorder::new(pool))
    }
}

/// Test database helper for integration tests.
///
/// Provides an in-memory `SQLite` database with the production schema.
#[cfg(any(test, feature = "test-utils"))]
pub struct TestDb {
    pool: SqlitePool,
}

#[cfg(any(test, feature = "test-utils"))]
impl TestDb {
    pub async fn new() -> anyhow::Result<Self> {
        let pool = crate::setup::setup_test_database().await?;
        Ok(Self { pool })
    }

    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn repos(&self) -> Repos {
        CoreFactory::build_repos(self.pool.clone())
    }

    pub fn provider_repository(&self) -> SqliteProviderRepository {
        SqliteProviderRepository::new(self.pool.clone())
    }

    pub fn permission_repository(&self) -> SqlitePermissionRuleRepository {
        SqlitePermissionRuleRepository::new(self.pool.clone())
    }

    pub fn invocation_recorder(&self) -> SqliteInvocationRecorder {
        SqliteInvocationRecorder::new(self.pool.clone())
    }
}
