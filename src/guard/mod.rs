//! Path Guard
//!
//! Every filename that reaches the filesystem goes through [`validate_filename`].
//!
//! # Two-Stage Check
//! 1. Syntactic: the name must be non-empty and free of path separators
//!    (`/` and `\` on every platform) and NUL bytes.
//! 2. Containment: the name is joined to the canonical storage directory and
//!    resolved. Existing entries are canonicalized (symlinks followed), missing
//!    ones are normalized lexically. The result must be a strict descendant of
//!    the storage directory.
//!
//! Rejections are reported as [`ShelfError::InvalidFilename`] values, never panics.

use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::{Result, ShelfError};

/// Reason reported for names rejected by the syntactic stage
pub const INVALID_FILENAME: &str = "Invalid filename";

/// File extension identifying database files in a storage directory
pub const DATABASE_EXTENSION: &str = "db";

/// Canonical storage directory that owns all database files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageDir {
    root: PathBuf,
}

impl StorageDir {
    /// Open an existing storage directory
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let root = path.canonicalize().map_err(|e| {
            ShelfError::not_found(format!(
                "Storage directory '{}' does not exist: {e}",
                path.display()
            ))
        })?;

        if !root.is_dir() {
            return Err(ShelfError::invalid_input(format!(
                "Storage path '{}' is not a directory",
                root.display()
            )));
        }

        Ok(Self { root })
    }

    /// Open a storage directory, creating it first if it is missing
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        fs::create_dir_all(path).map_err(|e| {
            ShelfError::io(format!("Could not create storage directory '{}': {e}", path.display()))
        })?;
        Self::open(path)
    }

    /// Canonical absolute path of the directory
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Resolve a filename inside this directory into a database handle
    pub fn handle(&self, filename: &str) -> Result<DatabaseHandle> {
        DatabaseHandle::resolve(self, filename)
    }
}

/// Validated reference to one database file inside a storage directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseHandle {
    filename: String,
    path: PathBuf,
}

impl DatabaseHandle {
    /// Run `filename` through the path guard and build a handle for it
    pub fn resolve(storage: &StorageDir, filename: &str) -> Result<Self> {
        let path = validate_filename(storage, filename)?;
        Ok(Self { filename: filename.to_string(), path })
    }

    /// Storage-relative filename
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Absolute path inside the storage directory
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the database file currently exists
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }
}

impl fmt::Display for DatabaseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.filename)
    }
}

/// Validate `filename` against `storage` and return its resolved absolute path
///
/// # Errors
/// Returns `ShelfError::InvalidFilename` when the name contains a separator or
/// NUL byte, is empty, or resolves outside the storage directory.
pub fn validate_filename(storage: &StorageDir, filename: &str) -> Result<PathBuf> {
    if filename.is_empty() || filename.contains(['/', '\\', '\0']) {
        return Err(ShelfError::invalid_filename(INVALID_FILENAME));
    }

    let candidate = storage.root.join(filename);

    let resolved = if fs::symlink_metadata(&candidate).is_ok() {
        candidate.canonicalize().map_err(|e| {
            ShelfError::invalid_filename(format!(
                "{INVALID_FILENAME}: '{filename}' cannot be resolved: {e}"
            ))
        })?
    } else {
        normalize(&candidate)
    };

    if resolved == storage.root || !resolved.starts_with(&storage.root) {
        return Err(ShelfError::invalid_filename(format!(
            "{INVALID_FILENAME}: '{filename}' resolves outside the storage directory"
        )));
    }

    Ok(resolved)
}

/// Lexically resolve `.` and `..` components
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Whether `path` carries the database file extension
#[must_use]
pub fn has_database_extension(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some(DATABASE_EXTENSION)
}
