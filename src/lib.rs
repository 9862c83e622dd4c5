//! sqlshelf - Database Registry & Safe Query Execution
//!
//! sqlshelf manages a single storage directory of `SQLite` database files and
//! executes SQL statements against them on behalf of a natural-language agent.
//!
//! # Core Principles
//! - Every caller-supplied filename passes the path guard before any I/O
//! - Engine failures are reported as data, never raised past the executor
//! - Stateless: one connection per operation, nothing cached between calls
//! - JSON-only output from the CLI, logs on stderr
//!
//! # Architecture
//! This library provides the core functionality for both CLI and MCP interfaces.
//! Both interfaces are thin wrappers that call the same internal library functions.
//!
//! # Module Organization
//! - [`error`] - Error types and handling
//! - [`output`] - JSON output envelope types
//! - [`guard`] - Path guard and database handles
//! - [`classify`] - Read/write statement classification
//! - [`engine`] - Database engine trait, schema inspector, query executor
//! - [`registry`] - Storage directory listing
//! - [`loader`] - Database creation and CSV ingestion
//! - [`lifecycle`] - Database deletion
//! - [`config`] - Configuration management
//! - [`mcp`] - MCP server (manual JSON-RPC 2.0)

pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod guard;
pub mod lifecycle;
pub mod loader;
pub mod mcp;
pub mod output;
pub mod registry;

pub use classify::{classify, StatementKind};
pub use config::{resolve_settings, ConfigLocation, ResolvedSettings, ShelfConfig};
pub use engine::sqlite::SqliteEngine;
pub use engine::{
    ColumnInfo, DatabaseEngine, DatabaseInfo, Preview, QueryOutcome, Record, SampleData, Schema,
    SchemaReport, SqlToolResponse, TableMap,
};
pub use error::{Result, ShelfError};
pub use guard::{validate_filename, DatabaseHandle, StorageDir};
pub use lifecycle::{delete_database, FileOperationResult};
pub use loader::{create_database, load_table, load_table_from_reader, ColumnType, TableLoad};
pub use output::{ErrorEnvelope, ErrorInfo, Metadata, SuccessEnvelope};
pub use registry::{list_databases, DatabaseSummary, TableCount};
