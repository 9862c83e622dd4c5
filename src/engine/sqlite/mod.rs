//! `SQLite` Database Engine Implementation
//!
//! This module implements the `DatabaseEngine` trait for `SQLite` database files
//! living in a storage directory.
//!
//! # Features
//! - Catalog enumeration via `sqlite_master`
//! - Column introspection via `PRAGMA table_info`
//! - Single-statement execution with uniform record results
//! - Bounded table previews
//!
//! # Implementation Notes
//! - Uses `rusqlite` (synchronous driver)
//! - Connections never create files; only the loader may create storage objects
//! - Each call opens its own connection and drops it before returning
//! - Statements run in autocommit mode, so a successful write is committed
//!   when it finishes
//! - BLOB data is Base64-encoded for JSON safety
//! - Internal `sqlite_*` tables are hidden from listings and counts

use rusqlite::{Connection, OpenFlags, Row};
use serde_json::Value;

use crate::classify::{classify, StatementKind};
use crate::engine::{
    quote_identifier, ColumnInfo, DatabaseEngine, Preview, QueryOutcome, Record, Schema,
};
use crate::error::{Result, ShelfError};
use crate::guard::DatabaseHandle;

const USER_TABLES: &str =
    "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\'";

/// `SQLite` database engine implementation
pub struct SqliteEngine;

impl DatabaseEngine for SqliteEngine {
    fn count_tables(handle: &DatabaseHandle) -> Result<usize> {
        let conn = open_connection(handle, true)?;
        let count: i64 =
            conn.query_row(&format!("SELECT count(*) FROM ({USER_TABLES})"), [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn list_tables(handle: &DatabaseHandle) -> Result<Vec<String>> {
        let conn = open_connection(handle, true)?;
        table_names(&conn)
    }

    fn get_schema(handle: &DatabaseHandle) -> Result<Schema> {
        let conn = open_connection(handle, true)?;

        let mut schema = Schema::new();
        for table in table_names(&conn)? {
            let columns = introspect_table(&conn, &table)?;
            schema.insert(table, columns);
        }

        tracing::debug!(database = %handle, tables = schema.len(), "schema introspected");
        Ok(schema)
    }

    fn run_query(handle: &DatabaseHandle, sql: &str) -> QueryOutcome {
        match execute(handle, sql) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::debug!(database = %handle, error = %err, "query failed");
                QueryOutcome::Error(err.message())
            }
        }
    }

    fn preview_table(handle: &DatabaseHandle, table: &str, limit: usize) -> Result<Preview> {
        let conn = open_connection(handle, true)?;
        let sql = format!("SELECT * FROM {} LIMIT ?1", quote_identifier(table));
        let mut stmt = conn.prepare(&sql)?;

        let columns: Vec<String> = stmt.column_names().iter().map(|s| (*s).to_string()).collect();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows = stmt
            .query_map([limit], |row| row_to_json(columns.len(), row))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Preview { columns, rows })
    }
}

/// Open a connection to an existing database file
fn open_connection(handle: &DatabaseHandle, read_only: bool) -> Result<Connection> {
    if !handle.exists() {
        return Err(ShelfError::not_found(format!("Database '{handle}' does not exist.")));
    }

    let flags = if read_only {
        OpenFlags::SQLITE_OPEN_READ_ONLY
    } else {
        OpenFlags::SQLITE_OPEN_READ_WRITE
    };

    Ok(Connection::open_with_flags(handle.path(), flags)?)
}

fn table_names(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(USER_TABLES)?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(names)
}

/// Column metadata for one table, in definition order
fn introspect_table(conn: &Connection, table: &str) -> Result<Vec<ColumnInfo>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_identifier(table)))?;

    let columns = stmt
        .query_map([], |row| {
            Ok(ColumnInfo {
                name: row.get(1)?,
                data_type: row.get(2)?,
                not_null: row.get::<_, i64>(3)? != 0,
                primary_key: row.get::<_, i64>(5)? > 0, // pk: position within the key, 0 if not part of it
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(columns)
}

/// Classify, run, and collect one statement
fn execute(handle: &DatabaseHandle, sql: &str) -> Result<QueryOutcome> {
    let kind = classify(sql)?;
    let conn = open_connection(handle, false)?;
    let mut stmt = conn.prepare(sql)?;

    let outcome = match kind {
        StatementKind::Read => {
            let columns: Vec<String> =
                stmt.column_names().iter().map(|s| (*s).to_string()).collect();

            let mut records = Vec::new();
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                records.push(row_to_record(&columns, row)?);
            }
            QueryOutcome::Rows(records)
        }
        StatementKind::Write => {
            if stmt.column_count() == 0 {
                stmt.execute([])?;
            } else {
                // Statements like PRAGMA or RETURNING produce rows; step them to completion
                let mut rows = stmt.query([])?;
                while rows.next()?.is_some() {}
            }
            QueryOutcome::Affected(conn.changes())
        }
    };

    tracing::debug!(
        database = %handle,
        kind = kind.as_str(),
        records = outcome.len(),
        "query executed"
    );
    Ok(outcome)
}

/// Convert a `SQLite` row to a record keyed by column name
fn row_to_record(columns: &[String], row: &Row) -> std::result::Result<Record, rusqlite::Error> {
    let mut record = Record::new();
    for (idx, name) in columns.iter().enumerate() {
        record.insert(name.clone(), sqlite_value_to_json(row, idx)?);
    }
    Ok(record)
}

/// Convert a `SQLite` row to a positional JSON `Vec`
fn row_to_json(width: usize, row: &Row) -> std::result::Result<Vec<Value>, rusqlite::Error> {
    (0..width).map(|idx| sqlite_value_to_json(row, idx)).collect()
}

/// Convert `SQLite` value to JSON value
fn sqlite_value_to_json(row: &Row, idx: usize) -> std::result::Result<Value, rusqlite::Error> {
    use rusqlite::types::ValueRef;

    let value_ref = row.get_ref(idx)?;

    Ok(match value_ref {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Number(i.into()),
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number), // NaN/Infinity become null
        ValueRef::Text(s) => {
            let text = std::str::from_utf8(s).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?;
            Value::String(text.to_string())
        }
        ValueRef::Blob(b) => {
            use base64::Engine;
            Value::String(base64::engine::general_purpose::STANDARD.encode(b))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::StorageDir;
    use serde_json::json;
    use tempfile::TempDir;

    fn setup(name: &str, statements: &[&str]) -> (TempDir, DatabaseHandle) {
        let dir = TempDir::new().unwrap();
        let storage = StorageDir::open(dir.path()).unwrap();
        let handle = storage.handle(name).unwrap();
        let conn = Connection::open(handle.path()).expect("Failed to create temp database");
        for sql in statements {
            conn.execute_batch(sql).expect("Failed to run setup statement");
        }
        (dir, handle)
    }

    #[test]
    fn test_list_tables_hides_internal_tables() {
        let (_dir, handle) = setup(
            "t.db",
            &[
                "CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT)",
                "CREATE TABLE posts (id INTEGER)",
                "INSERT INTO users (name) VALUES ('Alice')",
            ],
        );

        assert_eq!(SqliteEngine::list_tables(&handle).unwrap(), vec!["users", "posts"]);
        assert_eq!(SqliteEngine::count_tables(&handle).unwrap(), 2);
    }

    #[test]
    fn test_get_schema_reports_columns_in_definition_order() {
        let (_dir, handle) = setup(
            "t.db",
            &["CREATE TABLE users (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT,
                extra
            )"],
        );

        let schema = SqliteEngine::get_schema(&handle).unwrap();
        let columns = schema.get("users").expect("users table missing");

        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name", "email", "extra"]);
        assert!(columns[0].primary_key);
        assert!(columns[1].not_null);
        assert!(!columns[2].not_null);
        assert_eq!(columns[2].data_type, "TEXT");
        assert_eq!(columns[3].data_type, "");
    }

    #[test]
    fn test_get_schema_composite_primary_key() {
        let (_dir, handle) =
            setup("t.db", &["CREATE TABLE link (a INTEGER, b INTEGER, c TEXT, PRIMARY KEY (a, b))"]);

        let schema = SqliteEngine::get_schema(&handle).unwrap();
        let pk: Vec<bool> = schema.get("link").unwrap().iter().map(|c| c.primary_key).collect();
        assert_eq!(pk, vec![true, true, false]);
    }

    #[test]
    fn test_get_schema_quoted_table_name() {
        let (_dir, handle) = setup("t.db", &["CREATE TABLE \"order items\" (sku TEXT)"]);

        let schema = SqliteEngine::get_schema(&handle).unwrap();
        assert_eq!(schema.get("order items").unwrap()[0].name, "sku");
    }

    #[test]
    fn test_get_schema_missing_file_is_error() {
        let dir = TempDir::new().unwrap();
        let storage = StorageDir::open(dir.path()).unwrap();
        let handle = storage.handle("missing.db").unwrap();

        let err = SqliteEngine::get_schema(&handle).unwrap_err();
        assert_eq!(err.error_code(), "NOT_FOUND");
        assert!(!handle.exists(), "introspection must not create the file");
    }

    #[test]
    fn test_get_schema_corrupt_file_is_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("bad.db"), b"definitely not a database file").unwrap();
        let storage = StorageDir::open(dir.path()).unwrap();
        let handle = storage.handle("bad.db").unwrap();

        let err = SqliteEngine::get_schema(&handle).unwrap_err();
        assert_eq!(err.error_code(), "ENGINE_ERROR");
    }

    #[test]
    fn test_run_select_returns_records_in_column_order() {
        let (_dir, handle) = setup(
            "t.db",
            &[
                "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, age INTEGER)",
                "INSERT INTO users (name, age) VALUES ('Alice', 30), ('Bob', 25)",
            ],
        );

        let outcome = SqliteEngine::run_query(&handle, "SELECT age, name FROM users ORDER BY id");
        let QueryOutcome::Rows(rows) = outcome else {
            panic!("expected rows, got {outcome:?}");
        };

        assert_eq!(rows.len(), 2);
        let keys: Vec<&String> = rows[0].keys().collect();
        assert_eq!(keys, vec!["age", "name"]);
        assert_eq!(rows[0]["name"], json!("Alice"));
        assert_eq!(rows[1]["age"], json!(25));
    }

    #[test]
    fn test_run_insert_reports_affected_rows_and_commits() {
        let (_dir, handle) = setup("t.db", &["CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)"]);

        let outcome =
            SqliteEngine::run_query(&handle, "INSERT INTO users (name) VALUES ('A'), ('B')");
        assert_eq!(outcome, QueryOutcome::Affected(2));

        let count = SqliteEngine::run_query(&handle, "SELECT count(*) AS n FROM users");
        assert_eq!(serde_json::to_value(&count).unwrap(), json!([{"n": 2}]));
    }

    #[test]
    fn test_run_ddl_reports_zero() {
        let (_dir, handle) = setup("t.db", &[]);

        let outcome = SqliteEngine::run_query(&handle, "CREATE TABLE t (id INTEGER)");
        assert_eq!(outcome, QueryOutcome::Affected(0));
        assert_eq!(SqliteEngine::list_tables(&handle).unwrap(), vec!["t"]);
    }

    #[test]
    fn test_run_row_producing_write_returns_no_rows() {
        let (_dir, handle) = setup("t.db", &["CREATE TABLE t (id INTEGER)"]);

        let outcome = SqliteEngine::run_query(&handle, "PRAGMA table_info(t)");
        assert_eq!(outcome, QueryOutcome::Affected(0));
    }

    #[test]
    fn test_run_syntax_error_becomes_error_record() {
        let (_dir, handle) = setup("t.db", &["CREATE TABLE orders (id INTEGER)"]);

        let outcome = SqliteEngine::run_query(&handle, "SELEC * FROM orders");
        let message = outcome.error().expect("expected error record");
        assert!(message.contains("syntax error"), "{message}");
    }

    #[test]
    fn test_run_missing_table_error_record() {
        let (_dir, handle) = setup("t.db", &[]);

        let outcome = SqliteEngine::run_query(&handle, "SELECT * FROM nope");
        assert!(outcome.error().unwrap().contains("no such table: nope"));
    }

    #[test]
    fn test_run_constraint_violation_error_record() {
        let (_dir, handle) = setup(
            "t.db",
            &["CREATE TABLE t (id INTEGER PRIMARY KEY)", "INSERT INTO t VALUES (1)"],
        );

        let outcome = SqliteEngine::run_query(&handle, "INSERT INTO t VALUES (1)");
        assert!(outcome.error().unwrap().contains("UNIQUE constraint failed"));
    }

    #[test]
    fn test_run_empty_query_error_record() {
        let (_dir, handle) = setup("t.db", &[]);
        let outcome = SqliteEngine::run_query(&handle, "   ");
        assert!(outcome.error().unwrap().contains("Query cannot be empty"));
    }

    #[test]
    fn test_run_missing_database_does_not_create_file() {
        let dir = TempDir::new().unwrap();
        let storage = StorageDir::open(dir.path()).unwrap();
        let handle = storage.handle("ghost.db").unwrap();

        let outcome = SqliteEngine::run_query(&handle, "CREATE TABLE t (id INTEGER)");
        assert!(outcome.error().unwrap().contains("does not exist"));
        assert!(!handle.exists());
    }

    #[test]
    fn test_run_select_has_no_row_limit() {
        let (_dir, handle) = setup(
            "t.db",
            &[
                "CREATE TABLE n (v INTEGER)",
                "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 250)
                 INSERT INTO n SELECT x FROM c",
            ],
        );

        let outcome = SqliteEngine::run_query(&handle, "SELECT v FROM n");
        assert_eq!(outcome.len(), 250);
    }

    #[test]
    fn test_all_data_types() {
        let (_dir, handle) = setup(
            "t.db",
            &[
                "CREATE TABLE test_types (int_col INTEGER, real_col REAL, text_col TEXT, blob_col BLOB, null_col TEXT)",
                "INSERT INTO test_types VALUES (42, 3.5, 'hello', x'010203', NULL)",
            ],
        );

        let outcome = SqliteEngine::run_query(&handle, "SELECT * FROM test_types");
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!([{
                "int_col": 42,
                "real_col": 3.5,
                "text_col": "hello",
                "blob_col": "AQID",
                "null_col": null
            }])
        );
    }

    #[test]
    fn test_preview_table_limits_rows() {
        let (_dir, handle) = setup(
            "t.db",
            &[
                "CREATE TABLE n (v INTEGER, label TEXT)",
                "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 30)
                 INSERT INTO n SELECT x, 'row ' || x FROM c",
            ],
        );

        let preview = SqliteEngine::preview_table(&handle, "n", 20).unwrap();
        assert_eq!(preview.columns, vec!["v", "label"]);
        assert_eq!(preview.rows.len(), 20);
        assert_eq!(preview.rows[0], vec![json!(1), json!("row 1")]);

        let small = SqliteEngine::preview_table(&handle, "n", 5).unwrap();
        assert_eq!(small.rows.len(), 5);
    }

    #[test]
    fn test_preview_missing_table_is_error() {
        let (_dir, handle) = setup("t.db", &[]);
        let err = SqliteEngine::preview_table(&handle, "nope", 20).unwrap_err();
        assert!(err.message().contains("no such table"));
    }

    #[test]
    fn test_sample_data_caps_rows_per_table() {
        let (_dir, handle) = setup(
            "t.db",
            &[
                "CREATE TABLE a (v INTEGER)",
                "INSERT INTO a VALUES (1), (2), (3), (4), (5)",
                "CREATE TABLE b (v INTEGER)",
                "INSERT INTO b VALUES (9)",
            ],
        );

        let samples = SqliteEngine::get_sample_data(&handle);
        assert_eq!(samples.get("a").unwrap().len(), 3);
        assert_eq!(samples.get("b").unwrap().len(), 1);
    }

    #[test]
    fn test_sample_data_skips_views() {
        let (_dir, handle) = setup(
            "t.db",
            &[
                "CREATE TABLE base (v INTEGER)",
                "INSERT INTO base VALUES (1)",
                "CREATE VIEW recent AS SELECT v FROM base",
            ],
        );

        let samples = SqliteEngine::get_sample_data(&handle);
        assert_eq!(samples.table_names().collect::<Vec<_>>(), vec!["base"]);
        assert!(samples.get("recent").is_none());
    }

    #[test]
    fn test_database_info_for_corrupt_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("bad.db"), b"definitely not a database file").unwrap();
        let storage = StorageDir::open(dir.path()).unwrap();
        let handle = storage.handle("bad.db").unwrap();

        let info = SqliteEngine::database_info(&handle);
        let value = serde_json::to_value(&info).unwrap();
        assert!(value["schema"]["error"].is_string());
        assert_eq!(value["sample_data"], json!({}));
    }

    #[test]
    fn test_text_to_sql_echoes_query() {
        let (_dir, handle) = setup("t.db", &["CREATE TABLE t (id INTEGER)"]);

        let response = SqliteEngine::text_to_sql(&handle, "SELECT count(*) AS n FROM t");
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"query": "SELECT count(*) AS n FROM t", "results": [{"n": 0}]})
        );
    }
}
