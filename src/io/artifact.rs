//! Read/write model artifacts as JSON snapshots.
//!
//! Each estimator owns exactly one snapshot file; a later stage (or a
//! re-run) can reload it without re-estimating. JSON keeps the artifacts
//! diffable and greppable, which matters more here than compactness; the
//! fitted objects are small.

use std::fs::File;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// Serialize `value` to pretty JSON at `path`.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            AppError::config(format!("Failed to create '{}': {e}", parent.display()))
        })?;
    }
    let file = File::create(path)
        .map_err(|e| AppError::config(format!("Failed to create '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, value)
        .map_err(|e| AppError::config(format!("Failed to write '{}': {e}", path.display())))?;
    Ok(())
}

/// Load a JSON snapshot, if the file exists.
pub fn read_json_optional<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, AppError> {
    if !path.exists() {
        return Ok(None);
    }
    let file = File::open(path)
        .map_err(|e| AppError::config(format!("Failed to open '{}': {e}", path.display())))?;
    let value = serde_json::from_reader(file)
        .map_err(|e| AppError::config(format!("Invalid snapshot '{}': {e}", path.display())))?;
    Ok(Some(value))
}
