//! Dataset Loader
//!
//! Creates empty database files and loads CSV data into tables.
//!
//! # Load Semantics
//! A load replaces any existing table of the same name; it never appends.
//! The whole input is parsed and typed before the database is touched, and the
//! drop / create / insert sequence runs inside one transaction, so a failed
//! load leaves the previous table exactly as it was.
//!
//! # Type Inference
//! Per column, over the non-empty cells:
//! - every cell parses as a 64-bit integer → `INTEGER`
//! - every cell parses as a finite float → `REAL`
//! - otherwise, or when the column has no non-empty cell → `TEXT`
//!
//! Empty cells are stored as `NULL`.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;

use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OpenFlags};
use serde::Serialize;

use crate::engine::quote_identifier;
use crate::error::{Result, ShelfError};
use crate::guard::{validate_filename, DatabaseHandle, StorageDir, DATABASE_EXTENSION};

/// Storage class chosen for a loaded column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    /// Declared type used in `CREATE TABLE`
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Text => "TEXT",
        }
    }

    /// Infer a column type from its raw cells
    pub fn infer<'a>(cells: impl IntoIterator<Item = &'a str>) -> Self {
        let mut inferred: Option<Self> = None;

        for cell in cells.into_iter().map(str::trim).filter(|c| !c.is_empty()) {
            let cell_type = if cell.parse::<i64>().is_ok() {
                Self::Integer
            } else if parse_finite(cell).is_some() {
                Self::Real
            } else {
                return Self::Text;
            };

            inferred = Some(match (inferred, cell_type) {
                (Some(Self::Real), _) | (_, Self::Real) => Self::Real,
                _ => Self::Integer,
            });
        }

        inferred.unwrap_or(Self::Text)
    }

    /// Convert a raw cell into a value of this type
    fn convert(self, cell: &str) -> SqlValue {
        let trimmed = cell.trim();
        if trimmed.is_empty() {
            return SqlValue::Null;
        }

        match self {
            Self::Integer => trimmed
                .parse::<i64>()
                .map_or_else(|_| SqlValue::Text(cell.to_string()), SqlValue::Integer),
            Self::Real => parse_finite(trimmed)
                .map_or_else(|| SqlValue::Text(cell.to_string()), SqlValue::Real),
            Self::Text => SqlValue::Text(cell.to_string()),
        }
    }
}

fn parse_finite(cell: &str) -> Option<f64> {
    cell.parse::<f64>().ok().filter(|f| f.is_finite())
}

/// Column of a loaded table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadedColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

/// What a successful load wrote
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableLoad {
    pub table: String,
    pub columns: Vec<LoadedColumn>,
    pub rows: usize,
}

/// Parsed tabular input
#[derive(Debug)]
struct Dataset {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

/// Create (or truncate) an empty database file and return a confirmation message
///
/// `name` gets the `.db` extension appended unless it already carries it.
///
/// # Errors
/// Fails when the name is rejected by the path guard or the file cannot be written.
pub fn create_database(storage: &StorageDir, name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ShelfError::invalid_input("Database name cannot be empty"));
    }

    let suffix = format!(".{DATABASE_EXTENSION}");
    let filename = if name.ends_with(&suffix) { name.to_string() } else { format!("{name}{suffix}") };

    let path = validate_filename(storage, &filename)?;

    File::create(&path).map_err(|e| {
        ShelfError::io(format!("Could not create database '{filename}': {e}"))
    })?;

    // Confirm the engine accepts the new file, then close it again
    Connection::open_with_flags(&path, OpenFlags::SQLITE_OPEN_READ_WRITE)?
        .query_row("PRAGMA schema_version", [], |row| row.get::<_, i64>(0))?;

    tracing::info!(database = %filename, "database created");
    Ok(format!("Database '{filename}' created."))
}

/// Load a CSV file into `table`, replacing any existing table of that name
///
/// # Errors
/// - `NotFound` if the database or the CSV file does not exist
/// - `IngestionFailed` if the CSV is malformed
/// - `EngineError` if the write fails (the previous table is left intact)
pub fn load_table(handle: &DatabaseHandle, csv_path: &Path, table: &str) -> Result<TableLoad> {
    let file = File::open(csv_path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ShelfError::not_found(format!(
            "Tabular file '{}' does not exist.",
            csv_path.display()
        )),
        _ => ShelfError::io(format!("Could not open '{}': {e}", csv_path.display())),
    })?;

    load_table_from_reader(handle, file, table)
}

/// Load CSV data from any reader into `table`, replacing any existing table
///
/// # Errors
/// Same as [`load_table`].
pub fn load_table_from_reader<R: Read>(
    handle: &DatabaseHandle,
    reader: R,
    table: &str,
) -> Result<TableLoad> {
    if table.trim().is_empty() {
        return Err(ShelfError::invalid_input("Table name cannot be empty"));
    }
    if !handle.exists() {
        return Err(ShelfError::not_found(format!("Database '{handle}' does not exist.")));
    }

    let dataset = parse_csv(reader)?;
    let types: Vec<ColumnType> = (0..dataset.headers.len())
        .map(|idx| ColumnType::infer(dataset.rows.iter().map(|row| row[idx].as_str())))
        .collect();

    let mut conn = Connection::open_with_flags(handle.path(), OpenFlags::SQLITE_OPEN_READ_WRITE)?;
    let quoted = quote_identifier(table);

    let column_defs: Vec<String> = dataset
        .headers
        .iter()
        .zip(&types)
        .map(|(name, ty)| format!("{} {}", quote_identifier(name), ty.as_sql()))
        .collect();
    let placeholders: Vec<String> = (1..=dataset.headers.len()).map(|i| format!("?{i}")).collect();

    let tx = conn.transaction()?;
    tx.execute(&format!("DROP TABLE IF EXISTS {quoted}"), [])?;
    tx.execute(&format!("CREATE TABLE {quoted} ({})", column_defs.join(", ")), [])?;
    {
        let mut insert = tx.prepare(&format!(
            "INSERT INTO {quoted} VALUES ({})",
            placeholders.join(", ")
        ))?;
        for row in &dataset.rows {
            let values = row.iter().zip(&types).map(|(cell, ty)| ty.convert(cell));
            insert.execute(params_from_iter(values))?;
        }
    }
    tx.commit()?;

    tracing::info!(database = %handle, table, rows = dataset.rows.len(), "table loaded");

    let columns = dataset
        .headers
        .into_iter()
        .zip(types)
        .map(|(name, column_type)| LoadedColumn { name, column_type })
        .collect();

    Ok(TableLoad { table: table.to_string(), columns, rows: dataset.rows.len() })
}

/// Parse and validate the whole CSV input before any write
fn parse_csv<R: Read>(reader: R) -> Result<Dataset> {
    let mut csv_reader =
        csv::ReaderBuilder::new().has_headers(true).flexible(false).from_reader(reader);

    let header_record = csv_reader
        .headers()
        .map_err(|e| ShelfError::ingestion_failed(format!("Could not read header row: {e}")))?
        .clone();

    if header_record.is_empty() {
        return Err(ShelfError::ingestion_failed("Tabular input has no header row"));
    }

    let mut seen = HashSet::new();
    let mut headers = Vec::with_capacity(header_record.len());
    for (idx, raw) in header_record.iter().enumerate() {
        let name = if raw.trim().is_empty() { format!("Unnamed: {idx}") } else { raw.to_string() };
        if !seen.insert(name.to_lowercase()) {
            return Err(ShelfError::ingestion_failed(format!("Duplicate column name '{name}'")));
        }
        headers.push(name);
    }

    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = record.map_err(|e| ShelfError::ingestion_failed(e.to_string()))?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(Dataset { headers, rows })
}

/// Remove a loaded table's source file once it has been ingested
///
/// Used by callers that stage uploads in a temporary file.
pub fn discard_staged_upload(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "could not remove staged upload");
    }
}
