//! Statement Classification
//!
//! The Query Executor treats a statement as a read when its trimmed, uppercased
//! text begins with `SELECT`. Everything else is executed as a mutating or DDL
//! statement and reported as an affected-row count.
//!
//! Classification is purely textual. Comments and `WITH` prefixes are not
//! looked through, so `WITH cte AS (...) SELECT ...` is classified as a write
//! and reports an affected count.

use crate::error::{Result, ShelfError};

/// How a statement's outcome is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// Rows are fetched and returned as records
    Read,
    /// The statement is executed and committed; only the affected count is returned
    Write,
}

impl StatementKind {
    /// Lowercase label used in logs
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

/// Classify a raw SQL statement
///
/// # Errors
/// Returns `ShelfError::InvalidInput` for an empty or whitespace-only statement.
pub fn classify(sql: &str) -> Result<StatementKind> {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Err(ShelfError::invalid_input("Query cannot be empty"));
    }

    if trimmed.to_uppercase().starts_with("SELECT") {
        Ok(StatementKind::Read)
    } else {
        Ok(StatementKind::Write)
    }
}
