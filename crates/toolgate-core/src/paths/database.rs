//! Database path resolution.

use std::fs;
use std::path::{Path, PathBuf};

use super::error::PathError;
use super::platform::data_root;

pub const DATABASE_FILE_NAME: &str = "toolgate.db";

/// Get the path to the toolgate database file.
///
/// The `data/` subdirectory of the data root is created if it doesn't exist.
pub fn database_path() -> Result<PathBuf, PathError> {
    database_path_in(&data_root()?)
}

/// Database path under an explicit root.
pub fn database_path_in(root: &Path) -> Result<PathBuf, PathError> {
    if root.exists() && !root.is_dir() {
        return Err(PathError::NotADirectory(root.to_path_buf()));
    }

    let data_dir = root.join("data");
    fs::create_dir_all(&data_dir).map_err(|e| PathError::CreateFailed {
        path: data_dir.clone(),
        reason: e.to_string(),
    })?;

    Ok(data_dir.join(DATABASE_FILE_NAME))
}
