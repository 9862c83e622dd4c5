//! File Lifecycle Manager
//!
//! Irreversible deletion of database files. The filename goes through the path
//! guard first; a rejected name or a missing file leaves the filesystem as it
//! was. There is no trash and no recovery, confirmation belongs to the caller.

use std::fs;

use serde::{Deserialize, Serialize};

use crate::error::ShelfError;
use crate::guard::{validate_filename, StorageDir};

/// Outcome of a create or delete request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOperationResult {
    pub success: bool,
    pub message: String,
}

impl FileOperationResult {
    pub fn succeeded(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into() }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into() }
    }
}

impl From<&ShelfError> for FileOperationResult {
    fn from(err: &ShelfError) -> Self {
        Self::failed(err.message())
    }
}

/// Delete `filename` from `storage`
///
/// Never returns an error: every failure is a `success: false` result.
pub fn delete_database(storage: &StorageDir, filename: &str) -> FileOperationResult {
    if let Err(err) = validate_filename(storage, filename) {
        tracing::warn!(filename, reason = %err, "delete rejected by path guard");
        return FileOperationResult::from(&err);
    }

    // The guard resolves symlinks; removal acts on the named entry itself
    let entry = storage.path().join(filename);
    if !fs::symlink_metadata(&entry).is_ok_and(|meta| !meta.is_dir()) {
        return FileOperationResult::failed(format!("Database '{filename}' does not exist."));
    }

    match fs::remove_file(&entry) {
        Ok(()) => {
            tracing::info!(database = filename, "database deleted");
            FileOperationResult::succeeded(format!("Database '{filename}' deleted."))
        }
        Err(e) => FileOperationResult::failed(format!("Could not delete database '{filename}': {e}")),
    }
}

/// Create an empty database, reported as a file operation result
pub fn create_database(storage: &StorageDir, name: &str) -> FileOperationResult {
    match crate::loader::create_database(storage, name) {
        Ok(message) => FileOperationResult::succeeded(message),
        Err(err) => FileOperationResult::from(&err),
    }
}
