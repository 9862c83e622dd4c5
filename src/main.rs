//! sqlshelf CLI Entry Point
//!
//! This is the main binary entry point for the sqlshelf CLI.
//! Subcommands:
//! - `init` - Record the storage directory in a config file
//! - `create` / `load` / `delete` - Database file lifecycle
//! - `list` - Registry listing of the storage directory
//! - `tables` / `schema` / `samples` / `info` / `preview` - Schema inspection
//! - `query` - Execute one SQL statement
//! - `mcp` - MCP server mode (hidden, for AI agent integration)
//!
//! All output to stdout is JSON-only. Logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, Subcommand};
use dialoguer::Confirm;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use sqlshelf::config::{resolve_settings, save_storage_dir, ConfigLocation, ResolvedSettings};
use sqlshelf::engine::sqlite::SqliteEngine;
use sqlshelf::engine::DatabaseEngine;
use sqlshelf::guard::StorageDir;
use sqlshelf::lifecycle::{self, FileOperationResult};
use sqlshelf::loader;
use sqlshelf::mcp::{self, ToolContext};
use sqlshelf::registry::list_databases;
use sqlshelf::{ErrorEnvelope, ErrorInfo, Metadata, ShelfError, SuccessEnvelope};

/// Environment variable holding the log filter directive
const LOG_ENV: &str = "SQLSHELF_LOG";

/// sqlshelf - Database registry and safe query execution
#[derive(Parser)]
#[command(name = "sqlshelf")]
#[command(about = "Manage a directory of SQLite databases and run SQL against them safely")]
#[command(version)]
struct Cli {
    /// Storage directory holding the database files
    #[arg(long, global = true)]
    storage_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Save the storage directory to a config file (created if missing)
    Init {
        /// Directory to store databases in
        dir: PathBuf,

        /// Write the per-user config instead of `.sqlshelf/config.json`
        #[arg(long)]
        global: bool,

        /// Default row limit for `preview`
        #[arg(long)]
        preview_limit: Option<usize>,
    },

    /// Create (or truncate) an empty database; `.db` is appended if missing
    Create { name: String },

    /// Load a CSV file into a table, replacing any existing table of that name
    Load {
        database: String,
        csv: PathBuf,
        table: String,

        /// Delete the CSV file after a successful load
        #[arg(long)]
        remove_source: bool,
    },

    /// List databases with size and table count
    List,

    /// List the tables of a database
    Tables { database: String },

    /// Show the first rows of a table
    Preview {
        database: String,
        table: String,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show column metadata for every table
    Schema { database: String },

    /// Show up to 3 sample rows per table
    Samples { database: String },

    /// Show schema and sample rows together
    Info { database: String },

    /// Execute one SQL statement
    Query { database: String, sql: String },

    /// Permanently delete a database file
    Delete {
        filename: String,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Start MCP server (hidden from help, for AI agent integration)
    #[command(hide = true)]
    Mcp,
}

impl Commands {
    const fn name(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
            Self::Create { .. } => "create",
            Self::Load { .. } => "load",
            Self::List => "list",
            Self::Tables { .. } => "tables",
            Self::Preview { .. } => "preview",
            Self::Schema { .. } => "schema",
            Self::Samples { .. } => "samples",
            Self::Info { .. } => "info",
            Self::Query { .. } => "query",
            Self::Delete { .. } => "delete",
            Self::Mcp => "mcp",
        }
    }
}

/// What a command produced, before it is wrapped in an envelope
enum Output {
    Success { data: serde_json::Value, rows: Option<usize> },
    Failure(ErrorInfo),
}

impl Output {
    fn data(data: impl Serialize) -> Result<Self, ShelfError> {
        Ok(Self::Success { data: to_json(data)?, rows: None })
    }

    fn rows(data: impl Serialize, rows: usize) -> Result<Self, ShelfError> {
        Ok(Self::Success { data: to_json(data)?, rows: Some(rows) })
    }

    fn file_operation(result: FileOperationResult) -> Result<Self, ShelfError> {
        if result.success {
            Self::data(result)
        } else {
            Ok(Self::Failure(ErrorInfo::new("OPERATION_FAILED", result.message)))
        }
    }
}

fn to_json(data: impl Serialize) -> Result<serde_json::Value, ShelfError> {
    serde_json::to_value(data).map_err(|e| ShelfError::io(format!("Could not serialize output: {e}")))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    let command = cli.command.name();

    if let Commands::Mcp = cli.command {
        return match serve_mcp(cli.storage_dir).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!(error = %e, "mcp server stopped");
                ExitCode::FAILURE
            }
        };
    }

    let start = Instant::now();
    let result = run(cli.command, cli.storage_dir);
    let execution_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

    let (json, ok) = match result {
        Ok(Output::Success { data, rows }) => {
            let meta = match rows {
                Some(n) => Metadata::with_rows(execution_ms, n),
                None => Metadata::new(execution_ms),
            };
            (serde_json::to_string_pretty(&SuccessEnvelope::new(command, data, meta)), true)
        }
        Ok(Output::Failure(info)) => {
            (serde_json::to_string_pretty(&ErrorEnvelope::new(command, info)), false)
        }
        Err(err) => (serde_json::to_string_pretty(&ErrorEnvelope::from_error(command, &err)), false),
    };

    match json {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Could not serialize output: {e}");
            return ExitCode::FAILURE;
        }
    }

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn serve_mcp(storage_dir: Option<PathBuf>) -> anyhow::Result<()> {
    let settings = resolve_settings(storage_dir, None)?;
    let storage = StorageDir::open(&settings.storage_dir)?;
    mcp::serve(ToolContext { storage, preview_limit: settings.preview_limit }).await
}

fn run(command: Commands, storage_dir: Option<PathBuf>) -> Result<Output, ShelfError> {
    if let Commands::Init { dir, global, preview_limit } = command {
        return init(dir, global, preview_limit);
    }

    let limit_flag = match &command {
        Commands::Preview { limit, .. } => *limit,
        _ => None,
    };
    let settings = resolve_settings(storage_dir, limit_flag)?;
    let storage = StorageDir::open(&settings.storage_dir)?;
    tracing::debug!(storage = %storage.path().display(), "storage directory resolved");

    dispatch(command, &storage, &settings)
}

fn init(dir: PathBuf, global: bool, preview_limit: Option<usize>) -> Result<Output, ShelfError> {
    let storage = StorageDir::create(&dir)?;
    let location = if global { ConfigLocation::Global } else { ConfigLocation::Local };
    let config_path = save_storage_dir(location, storage.path().to_path_buf(), preview_limit)?;

    Output::data(serde_json::json!({
        "storage_dir": storage.path(),
        "config_path": config_path,
    }))
}

fn dispatch(
    command: Commands,
    storage: &StorageDir,
    settings: &ResolvedSettings,
) -> Result<Output, ShelfError> {
    match command {
        Commands::Create { name } => Output::file_operation(lifecycle::create_database(storage, &name)),
        Commands::Load { database, csv, table, remove_source } => {
            let handle = storage.handle(&database)?;
            let load = loader::load_table(&handle, &csv, &table)?;
            if remove_source {
                loader::discard_staged_upload(&csv);
            }
            let rows = load.rows;
            Output::rows(load, rows)
        }
        Commands::List => {
            let mut summaries = list_databases(storage)?;
            summaries.sort_by(|a, b| a.filename.cmp(&b.filename));
            let rows = summaries.len();
            Output::rows(summaries, rows)
        }
        Commands::Tables { database } => {
            let tables = SqliteEngine::list_tables(&storage.handle(&database)?)?;
            let rows = tables.len();
            Output::rows(tables, rows)
        }
        Commands::Preview { database, table, .. } => {
            let handle = storage.handle(&database)?;
            let preview = SqliteEngine::preview_table(&handle, &table, settings.preview_limit)?;
            let rows = preview.rows.len();
            Output::rows(preview, rows)
        }
        Commands::Schema { database } => {
            Output::data(SqliteEngine::get_schema(&storage.handle(&database)?)?)
        }
        Commands::Samples { database } => {
            Output::data(SqliteEngine::get_sample_data(&storage.handle(&database)?))
        }
        Commands::Info { database } => {
            Output::data(SqliteEngine::database_info(&storage.handle(&database)?))
        }
        Commands::Query { database, sql } => {
            let outcome = SqliteEngine::run_query(&storage.handle(&database)?, &sql);
            match outcome.error() {
                Some(message) => Ok(Output::Failure(ErrorInfo::new("ENGINE_ERROR", message))),
                None => {
                    let rows = outcome.len();
                    Output::rows(outcome, rows)
                }
            }
        }
        Commands::Delete { filename, yes } => {
            if !yes && !confirm_delete(&filename)? {
                return Ok(Output::Failure(ErrorInfo::new("CANCELLED", "Deletion cancelled.")));
            }
            Output::file_operation(lifecycle::delete_database(storage, &filename))
        }
        Commands::Init { .. } | Commands::Mcp => {
            Err(ShelfError::invalid_input("command handled before dispatch"))
        }
    }
}

fn confirm_delete(filename: &str) -> Result<bool, ShelfError> {
    Confirm::new()
        .with_prompt(format!("Permanently delete '{filename}'? This cannot be undone"))
        .default(false)
        .interact()
        .map_err(|e| ShelfError::io(format!("Could not read confirmation: {e}")))
}
