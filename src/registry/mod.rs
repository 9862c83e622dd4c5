//! Database Registry
//!
//! Enumerates the database files of a storage directory and reports size and
//! table count for each. A file that cannot be opened as a database gets an
//! error marker in place of its table count; it never aborts the listing.
//! Entries the path guard rejects (symlinks leading out of the storage
//! directory) are skipped without being stat'd.
//!
//! Entries follow filesystem enumeration order. Callers that need a stable
//! order sort the result themselves.

use std::fs;
use std::path::PathBuf;

use serde::Serialize;

use crate::engine::sqlite::SqliteEngine;
use crate::engine::DatabaseEngine;
use crate::error::{Result, ShelfError};
use crate::guard::{has_database_extension, DatabaseHandle, StorageDir};

/// One database file in the storage directory
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatabaseSummary {
    /// Storage-relative filename
    pub filename: String,

    /// File size in kilobytes, rounded to one decimal
    pub size_kb: f64,

    /// Number of user tables, or an error marker
    pub tables: TableCount,

    /// Absolute path of the file
    pub path: PathBuf,
}

/// Table count of a registry entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TableCount {
    Count(usize),
    Unreadable { error: String },
}

impl TableCount {
    #[must_use]
    pub const fn count(&self) -> Option<usize> {
        match self {
            Self::Count(n) => Some(*n),
            Self::Unreadable { .. } => None,
        }
    }
}

/// List every database file in `storage`
///
/// # Errors
/// Fails only when the storage directory itself cannot be read.
pub fn list_databases(storage: &StorageDir) -> Result<Vec<DatabaseSummary>> {
    let entries = fs::read_dir(storage.path()).map_err(|e| {
        ShelfError::io(format!(
            "Could not read storage directory '{}': {e}",
            storage.path().display()
        ))
    })?;

    let mut summaries = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ShelfError::io(format!("Could not read directory entry: {e}")))?;
        let path = entry.path();

        if !has_database_extension(&path) {
            continue;
        }

        let Some(filename) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            tracing::warn!(path = %path.display(), "skipping database with non UTF-8 name");
            continue;
        };

        // Only entries that resolve inside the storage directory are stat'd
        let handle = match storage.handle(&filename) {
            Ok(handle) => handle,
            Err(err) => {
                tracing::warn!(database = %filename, reason = %err, "skipping entry outside storage");
                continue;
            }
        };

        let Ok(metadata) = fs::metadata(handle.path()) else { continue };
        if !metadata.is_file() {
            continue;
        }

        let tables = count_tables(&handle);
        summaries.push(DatabaseSummary { filename, size_kb: kilobytes(metadata.len()), tables, path });
    }

    tracing::debug!(storage = %storage.path().display(), databases = summaries.len(), "registry listed");
    Ok(summaries)
}

fn count_tables(handle: &DatabaseHandle) -> TableCount {
    match SqliteEngine::count_tables(handle) {
        Ok(n) => TableCount::Count(n),
        Err(err) => {
            tracing::warn!(database = %handle, error = %err, "database unreadable");
            TableCount::Unreadable { error: err.message() }
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn kilobytes(bytes: u64) -> f64 {
    (bytes as f64 / 1024.0 * 10.0).round() / 10.0
}
