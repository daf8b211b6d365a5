//! Platform-specific data root resolution.

use std::env;
use std::fs;
use std::path::PathBuf;

use super::error::PathError;

/// Environment variable overriding the data root.
pub const DATA_DIR_ENV: &str = "TOOLGATE_DATA_DIR";

/// Get the root directory for application data (database).
///
/// Resolution order:
/// 1. `TOOLGATE_DATA_DIR` environment variable (highest priority)
/// 2. System data directory (e.g., `~/.local/share/toolgate`)
pub fn data_root() -> Result<PathBuf, PathError> {
    resolve_data_root(env::var(DATA_DIR_ENV).ok())
}

pub(super) fn resolve_data_root(override_dir: Option<String>) -> Result<PathBuf, PathError> {
    if let Some(path) = override_dir.filter(|p| !p.trim().is_empty()) {
        return Ok(PathBuf::from(path));
    }

    let root = dirs::data_local_dir()
        .ok_or(PathError::NoDataDir)?
        .join("toolgate");

    if !root.exists() {
        fs::create_dir_all(&root).map_err(|e| PathError::CreateFailed {
            path: root.clone(),
            reason: e.to_string(),
        })?;
    }

    Ok(root)
}
