//! CLI bootstrap - the composition root.
//!
//! Opens the database, builds the repositories and wires the process
//! manager, permission engine, approval coordinator and executor together.
//! Handlers only ever see a [`CliContext`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use toolgate_core::paths::{data_root, database_path_in};
use toolgate_core::{AppEventEmitter, ControlPlaneSettings, Repos, validate_settings};
use toolgate_db::{CoreFactory, SqliteInvocationRecorder, setup_database};
use toolgate_mcp::{
    ApprovalCoordinator, PermissionEngine, ProcessManager, StdioConnectionFactory, ToolExecutor,
};
use tracing::debug;

use crate::emitter::LogEmitter;
use crate::error::CliError;

/// Configuration for CLI bootstrap.
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Path to the `SQLite` database.
    pub db_path: PathBuf,
    /// Control plane settings (defaults plus `TOOLGATE_*` overrides).
    pub settings: ControlPlaneSettings,
}

impl CliConfig {
    /// Resolve the database path and settings from the environment.
    ///
    /// `data_dir` overrides the platform data root.
    pub fn with_defaults(data_dir: Option<&Path>) -> Result<Self> {
        let root = match data_dir {
            Some(dir) => dir.to_path_buf(),
            None => data_root().map_err(CliError::from)?,
        };

        let mut settings = ControlPlaneSettings::with_defaults();
        settings.apply_env_overrides().map_err(CliError::from)?;

        Self::new(database_path_in(&root).map_err(CliError::from)?, settings)
    }

    /// Build a config from explicit values.
    pub fn new(db_path: PathBuf, settings: ControlPlaneSettings) -> Result<Self> {
        validate_settings(&settings).map_err(CliError::from)?;
        Ok(Self { db_path, settings })
    }
}

/// Dependencies available to every handler.
pub struct CliContext {
    pub manager: ProcessManager,
    pub permissions: Arc<PermissionEngine>,
    pub approvals: ApprovalCoordinator,
    pub executor: ToolExecutor,
    pub history: Arc<SqliteInvocationRecorder>,
    pub settings: ControlPlaneSettings,
    pub db_path: PathBuf,
}

/// Build the CLI context.
///
/// Provider configurations are loaded but nothing is started; commands that
/// need running providers call `manager.initialize()` themselves.
pub async fn bootstrap(config: CliConfig) -> Result<CliContext> {
    let pool = setup_database(&config.db_path).await.map_err(|e| {
        CliError::Database(format!("{}: {e:#}", config.db_path.display()))
    })?;

    let history = CoreFactory::invocation_recorder(pool.clone());
    let repos = Repos::new(
        CoreFactory::provider_repository(pool.clone()),
        CoreFactory::permission_repository(pool),
        history.clone(),
    );

    let emitter: Arc<dyn AppEventEmitter> = Arc::new(LogEmitter);

    let manager = ProcessManager::new(
        repos.providers.clone(),
        Arc::new(StdioConnectionFactory::from_settings(&config.settings)),
        emitter.clone(),
    );
    let loaded = manager.load_configs().await.map_err(CliError::from)?;

    let permissions = Arc::new(PermissionEngine::from_settings(
        repos.permission_rules.clone(),
        &config.settings,
    ));
    let approvals = ApprovalCoordinator::from_settings(emitter, &config.settings);
    let executor = ToolExecutor::new(
        manager.clone(),
        permissions.clone(),
        approvals.clone(),
        repos.invocations.clone(),
    );

    debug!(
        db_path = %config.db_path.display(),
        providers = loaded.len(),
        "CLI context ready"
    );

    Ok(CliContext {
        manager,
        permissions,
        approvals,
        executor,
        history,
        settings: config.settings,
        db_path: config.db_path,
    })
}
