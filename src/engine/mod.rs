//! Database Engine Trait and Core Types
//!
//! This module defines the result shapes shared by the Schema Inspector and the
//! Query Executor, and the `DatabaseEngine` trait the `SQLite` engine implements.
//!
//! # Stateless Design
//! All trait methods take a `&DatabaseHandle` as input.
//! Connections are opened, used, and closed within each method call, and no
//! schema or data is cached between calls.
//!
//! # Dynamic Shapes
//! Table structure is only known at runtime, so rows are [`Record`]s (ordered
//! column name to value maps) and per-table reports are [`TableMap`]s (ordered
//! table name to value maps).

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::error::Result;
use crate::guard::DatabaseHandle;

pub mod sqlite;

/// Default row limit for [`DatabaseEngine::preview_table`]
pub const DEFAULT_PREVIEW_LIMIT: usize = 20;

/// Number of rows sampled per table for [`DatabaseEngine::get_sample_data`]
pub const SAMPLE_ROWS: usize = 3;

/// One result row: column name to value, in the engine's column order
pub type Record = serde_json::Map<String, Value>;

/// Column metadata as reported by the engine catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name
    pub name: String,

    /// Declared type string (may be empty for untyped columns)
    #[serde(rename = "type")]
    pub data_type: String,

    /// Whether the column is declared NOT NULL
    #[serde(rename = "notnull")]
    pub not_null: bool,

    /// Whether the column is part of the primary key
    #[serde(rename = "pk")]
    pub primary_key: bool,
}

/// Ordered mapping from table name to a per-table value
///
/// Serializes as a JSON object whose keys follow catalog order.
#[derive(Debug, Clone, PartialEq)]
pub struct TableMap<T> {
    entries: Vec<(String, T)>,
}

impl<T> TableMap<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn insert(&mut self, table: impl Into<String>, value: T) {
        self.entries.push((table.into(), value));
    }

    #[must_use]
    pub fn get(&self, table: &str) -> Option<&T> {
        self.entries.iter().find(|(name, _)| name == table).map(|(_, value)| value)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for TableMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Serialize> Serialize for TableMap<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Full schema of one database: table name to ordered column list
pub type Schema = TableMap<Vec<ColumnInfo>>;

/// Sample rows per table; a failed table carries a single error record
pub type SampleData = TableMap<QueryOutcome>;

/// Outcome of one `run_query` call
///
/// Internally tagged so callers can branch on the variant; on the wire it is
/// always a list of records, see [`QueryOutcome::records`].
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// Rows returned by a read statement, in engine order
    Rows(Vec<Record>),
    /// Rows affected by a write or DDL statement
    Affected(u64),
    /// Engine or validation failure message
    Error(String),
}

impl QueryOutcome {
    /// Uniform record list: rows, `[{"affected_rows": n}]`, or `[{"error": msg}]`
    #[must_use]
    pub fn records(&self) -> Vec<Record> {
        match self {
            Self::Rows(rows) => rows.clone(),
            Self::Affected(count) => vec![single_record("affected_rows", Value::from(*count))],
            Self::Error(message) => vec![single_record("error", Value::from(message.as_str()))],
        }
    }

    /// Error message, if this outcome is an error record
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Error(message) => Some(message),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Number of records in the uniform shape
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Rows(rows) => rows.len(),
            Self::Affected(_) | Self::Error(_) => 1,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Serialize for QueryOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Rows(rows) => {
                let mut seq = serializer.serialize_seq(Some(rows.len()))?;
                for row in rows {
                    seq.serialize_element(row)?;
                }
                seq.end()
            }
            _ => self.records().serialize(serializer),
        }
    }
}

fn single_record(key: &str, value: Value) -> Record {
    let mut record = Record::new();
    record.insert(key.to_string(), value);
    record
}

/// Bounded table preview: column names plus positional rows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Preview {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Schema report that degrades to a single error record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SchemaReport {
    Tables(Schema),
    Error { error: String },
}

/// Context handed to the natural-language agent before it writes SQL
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatabaseInfo {
    pub schema: SchemaReport,
    pub sample_data: SampleData,
}

/// Statement echo plus its uniform result, as consumed by the agent
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlToolResponse {
    pub query: String,
    pub results: QueryOutcome,
}

/// Database engine trait
///
/// Each method is stateless and takes a database handle as input.
pub trait DatabaseEngine {
    /// Count tables in the catalog (used by the registry)
    fn count_tables(handle: &DatabaseHandle) -> Result<usize>;

    /// List table names in catalog order
    fn list_tables(handle: &DatabaseHandle) -> Result<Vec<String>>;

    /// Introspect every table. All-or-nothing: any failure is an error.
    fn get_schema(handle: &DatabaseHandle) -> Result<Schema>;

    /// Execute one statement exactly once and report a uniform outcome
    ///
    /// Engine failures never escape as `Err`; they become `QueryOutcome::Error`.
    fn run_query(handle: &DatabaseHandle, sql: &str) -> QueryOutcome;

    /// Return up to `limit` rows of `table` with its column names
    fn preview_table(handle: &DatabaseHandle, table: &str, limit: usize) -> Result<Preview>;

    /// Up to [`SAMPLE_ROWS`] rows per table, each table attempted independently
    ///
    /// If the schema cannot be read at all, the result is empty.
    fn get_sample_data(handle: &DatabaseHandle) -> SampleData {
        let Ok(tables) = Self::list_tables(handle) else {
            return SampleData::new();
        };

        let mut samples = SampleData::new();
        for table in tables {
            let sql = format!("SELECT * FROM {} LIMIT {SAMPLE_ROWS}", quote_identifier(&table));
            let outcome = Self::run_query(handle, &sql);
            if let Some(error) = outcome.error() {
                tracing::warn!(database = %handle, table = %table, %error, "sampling failed");
            }
            samples.insert(table, outcome);
        }
        samples
    }

    /// Schema plus sample data for query generation
    fn database_info(handle: &DatabaseHandle) -> DatabaseInfo {
        match Self::get_schema(handle) {
            Ok(schema) => DatabaseInfo {
                schema: SchemaReport::Tables(schema),
                sample_data: Self::get_sample_data(handle),
            },
            Err(err) => DatabaseInfo {
                schema: SchemaReport::Error { error: err.message() },
                sample_data: SampleData::new(),
            },
        }
    }

    /// Run `sql` and echo it next to its results
    fn text_to_sql(handle: &DatabaseHandle, sql: &str) -> SqlToolResponse {
        SqlToolResponse { query: sql.to_string(), results: Self::run_query(handle, sql) }
    }
}

/// Quote an identifier for interpolation into SQL
#[must_use]
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("orders"), "\"orders\"");
        assert_eq!(quote_identifier("my \"table\""), "\"my \"\"table\"\"\"");
    }

    #[test]
    fn test_affected_outcome_shape() {
        let outcome = QueryOutcome::Affected(3);
        assert_eq!(serde_json::to_value(&outcome).unwrap(), json!([{"affected_rows": 3}]));
        assert_eq!(outcome.len(), 1);
        assert!(!outcome.is_error());
    }

    #[test]
    fn test_error_outcome_shape() {
        let outcome = QueryOutcome::Error("no such table: x".to_string());
        assert_eq!(serde_json::to_value(&outcome).unwrap(), json!([{"error": "no such table: x"}]));
        assert_eq!(outcome.error(), Some("no such table: x"));
    }

    #[test]
    fn test_rows_outcome_preserves_column_order() {
        let mut row = Record::new();
        row.insert("zeta".to_string(), json!(1));
        row.insert("alpha".to_string(), json!(2));
        let outcome = QueryOutcome::Rows(vec![row]);

        let text = serde_json::to_string(&outcome).unwrap();
        assert_eq!(text, r#"[{"zeta":1,"alpha":2}]"#);
    }

    #[test]
    fn test_empty_rows_outcome() {
        let outcome = QueryOutcome::Rows(Vec::new());
        assert!(outcome.is_empty());
        assert_eq!(serde_json::to_value(&outcome).unwrap(), json!([]));
    }

    #[test]
    fn test_table_map_serializes_in_insertion_order() {
        let mut map = TableMap::new();
        map.insert("orders", 1);
        map.insert("customers", 2);

        assert_eq!(serde_json::to_string(&map).unwrap(), r#"{"orders":1,"customers":2}"#);
        assert_eq!(map.get("customers"), Some(&2));
        assert_eq!(map.table_names().collect::<Vec<_>>(), vec!["orders", "customers"]);
    }

    #[test]
    fn test_column_info_wire_names() {
        let column = ColumnInfo {
            name: "id".to_string(),
            data_type: "INTEGER".to_string(),
            not_null: false,
            primary_key: true,
        };
        assert_eq!(
            serde_json::to_value(&column).unwrap(),
            json!({"name": "id", "type": "INTEGER", "notnull": false, "pk": true})
        );
    }

    /// Engine whose `bad` table always fails to read
    struct FlakyEngine;

    impl DatabaseEngine for FlakyEngine {
        fn count_tables(_handle: &DatabaseHandle) -> Result<usize> {
            Ok(2)
        }

        fn list_tables(_handle: &DatabaseHandle) -> Result<Vec<String>> {
            Ok(vec!["good".to_string(), "bad".to_string()])
        }

        fn get_schema(_handle: &DatabaseHandle) -> Result<Schema> {
            Err(crate::error::ShelfError::engine_error("database disk image is malformed"))
        }

        fn run_query(_handle: &DatabaseHandle, sql: &str) -> QueryOutcome {
            if sql.contains("\"bad\"") {
                QueryOutcome::Error("disk I/O error".to_string())
            } else {
                QueryOutcome::Rows(vec![single_record("v", json!(1))])
            }
        }

        fn preview_table(_handle: &DatabaseHandle, _table: &str, _limit: usize) -> Result<Preview> {
            Ok(Preview { columns: Vec::new(), rows: Vec::new() })
        }
    }

    fn scratch_handle() -> (tempfile::TempDir, DatabaseHandle) {
        let dir = tempfile::TempDir::new().unwrap();
        let storage = crate::guard::StorageDir::open(dir.path()).unwrap();
        let handle = storage.handle("scratch.db").unwrap();
        (dir, handle)
    }

    #[test]
    fn test_sample_data_isolates_failing_table() {
        let (_dir, handle) = scratch_handle();

        let samples = FlakyEngine::get_sample_data(&handle);
        assert_eq!(samples.len(), 2);
        assert_eq!(serde_json::to_value(samples.get("good").unwrap()).unwrap(), json!([{"v": 1}]));
        assert_eq!(samples.get("bad").unwrap().error(), Some("disk I/O error"));
    }

    #[test]
    fn test_database_info_degrades_to_error_record() {
        let (_dir, handle) = scratch_handle();

        let info = FlakyEngine::database_info(&handle);
        assert_eq!(
            serde_json::to_value(&info).unwrap(),
            json!({"schema": {"error": "database disk image is malformed"}, "sample_data": {}})
        );
    }

    #[test]
    fn test_schema_report_error_variant() {
        let report = SchemaReport::Error { error: "file is not a database".to_string() };
        assert_eq!(serde_json::to_value(&report).unwrap(), json!({"error": "file is not a database"}));
    }
}
