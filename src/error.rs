//! Error Handling Infrastructure
//!
//! This module defines all error types used throughout sqlshelf.
//! All errors are structured and map to specific error codes for JSON output.
//!
//! # Error Categories
//! - `InvalidFilename`: Path Guard rejections (caught before any I/O)
//! - `InvalidInput`: Malformed input or missing required parameters
//! - `NotFound`: Referenced database, table source, or directory is absent
//! - `EngineError`: SQLite errors, surfaced verbatim
//! - `IngestionFailed`: Malformed tabular input during a table load
//! - `ConfigError`: Configuration file errors
//! - `Io`: Filesystem errors outside the engine

use thiserror::Error;

/// Main error type for sqlshelf operations
#[derive(Error, Debug)]
pub enum ShelfError {
    /// Filename rejected by the path guard. The message is the guard's reason.
    #[error("{0}")]
    InvalidFilename(String),

    /// Invalid input or missing required parameters
    #[error("{0}")]
    InvalidInput(String),

    /// Referenced database or file does not exist
    #[error("{0}")]
    NotFound(String),

    /// `SQLite` failure, carrying the engine's own message text
    #[error("{0}")]
    EngineError(String),

    /// Tabular input could not be ingested
    #[error("Ingestion failed: {0}")]
    IngestionFailed(String),

    /// Configuration error (file not found, invalid JSON, etc.)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(String),
}

impl ShelfError {
    /// Convert error to error code string for JSON output
    ///
    /// Error codes are stable and suitable for programmatic handling by agents.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidFilename(_) => "INVALID_FILENAME",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::EngineError(_) => "ENGINE_ERROR",
            Self::IngestionFailed(_) => "INGESTION_FAILED",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::Io(_) => "IO_ERROR",
        }
    }

    /// Get human-readable error message
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Create a path guard rejection
    pub fn invalid_filename(reason: impl Into<String>) -> Self {
        Self::InvalidFilename(reason.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a not-found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create an engine error from the engine's message
    pub fn engine_error(detail: impl Into<String>) -> Self {
        Self::EngineError(detail.into())
    }

    /// Create an ingestion error
    pub fn ingestion_failed(message: impl Into<String>) -> Self {
        Self::IngestionFailed(message.into())
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Create a filesystem error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }
}

impl From<rusqlite::Error> for ShelfError {
    fn from(err: rusqlite::Error) -> Self {
        Self::engine_error(err.to_string())
    }
}

/// Result type alias for sqlshelf operations
pub type Result<T> = std::result::Result<T, ShelfError>;
