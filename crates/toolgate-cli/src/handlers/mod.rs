//! Command handlers.
//!
//! Each handler follows the same pattern:
//!
//! ```rust,ignore
//! pub async fn execute(ctx: &CliContext, ...) -> Result<()> {
//!     let result = ctx.manager.some_operation(...).await.map_err(CliError::from)?;
//!     // print results
//!     Ok(())
//! }
//! ```
//!
//! Domain errors are converted to [`CliError`] so `main` can pick the exit code.

pub mod call;
pub mod history;
pub mod paths;
pub mod provider;
pub mod rule;
pub mod tools;

use toolgate_core::ToolProvider;

use crate::bootstrap::CliContext;
use crate::error::CliError;

/// Find a provider by numeric ID or by exact name.
pub async fn resolve_provider(ctx: &CliContext, identifier: &str) -> Result<ToolProvider, CliError> {
    let configs = ctx.manager.list_configs().await;

    if let Ok(id) = identifier.parse::<i64>() {
        if let Some(provider) = configs.iter().find(|p| p.id == id) {
            return Ok(provider.clone());
        }
    }

    configs
        .into_iter()
        .find(|p| p.name == identifier)
        .ok_or_else(|| CliError::NotFound(format!("provider '{identifier}'")))
}
