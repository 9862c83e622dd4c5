//! Output Validation Tests
//!
//! This module validates that sqlshelf output conforms to the defined JSON shapes.
//! It ensures:
//! - Success envelopes match the expected schema
//! - Error envelopes match the expected schema
//! - Operation results (records, schema reports, file operations) keep
//!   their wire shape
//! - Error codes are stable
//!
//! Uses `insta` inline snapshots to detect unintended output changes.

use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;

use sqlshelf::engine::DatabaseEngine;
use sqlshelf::{
    create_database, load_table_from_reader, ErrorEnvelope, ErrorInfo, FileOperationResult,
    Metadata, QueryOutcome, ShelfError, SqliteEngine, StorageDir, SuccessEnvelope,
};

// ============================================================================
// Test Helpers
// ============================================================================

fn sales_db() -> (TempDir, StorageDir) {
    let dir = TempDir::new().unwrap();
    let storage = StorageDir::open(dir.path()).unwrap();
    create_database(&storage, "sales").unwrap();
    let handle = storage.handle("sales.db").unwrap();
    load_table_from_reader(&handle, "id,amount\n1,10\n2,20.5\n".as_bytes(), "orders").unwrap();
    (dir, storage)
}

fn top_level_keys(value: &serde_json::Value) -> Vec<&str> {
    value.as_object().unwrap().keys().map(String::as_str).collect()
}

// ============================================================================
// Envelope Structure Tests
// ============================================================================

#[test]
fn test_success_envelope_structure() {
    let envelope = SuccessEnvelope::new("query", json!([{"n": 3}]), Metadata::with_rows(7, 1));
    let value = serde_json::to_value(&envelope).unwrap();

    assert_eq!(top_level_keys(&value), vec!["ok", "command", "data", "meta"]);
    assert_eq!(value["ok"], true);
    assert_eq!(value["meta"], json!({"execution_ms": 7, "rows_returned": 1}));
}

#[test]
fn test_error_envelope_structure() {
    let envelope = ErrorEnvelope::new("delete", ErrorInfo::new("OPERATION_FAILED", "nope"));
    let value = serde_json::to_value(&envelope).unwrap();

    assert_eq!(top_level_keys(&value), vec!["ok", "command", "error"]);
    assert_eq!(value["ok"], false);
    assert_eq!(top_level_keys(&value["error"]), vec!["code", "message"]);
}

#[test]
fn test_error_codes_are_stable() {
    let cases = [
        (ShelfError::invalid_filename("Invalid filename"), "INVALID_FILENAME"),
        (ShelfError::invalid_input("x"), "INVALID_INPUT"),
        (ShelfError::not_found("x"), "NOT_FOUND"),
        (ShelfError::engine_error("x"), "ENGINE_ERROR"),
        (ShelfError::ingestion_failed("x"), "INGESTION_FAILED"),
        (ShelfError::config_error("x"), "CONFIG_ERROR"),
        (ShelfError::io("x"), "IO_ERROR"),
    ];
    for (err, code) in cases {
        assert_eq!(ErrorEnvelope::from_error("cmd", &err).error.code, code);
    }
}

// ============================================================================
// Snapshot Tests (using insta)
// ============================================================================

#[test]
fn test_success_envelope_snapshot() {
    let envelope = SuccessEnvelope::new(
        "delete",
        FileOperationResult::succeeded("Database 'sales.db' deleted."),
        Metadata::new(3),
    );

    let json_str = serde_json::to_string_pretty(&envelope).unwrap();
    insta::assert_snapshot!(json_str, @r#"
    {
      "ok": true,
      "command": "delete",
      "data": {
        "success": true,
        "message": "Database 'sales.db' deleted."
      },
      "meta": {
        "execution_ms": 3
      }
    }
    "#);
}

#[test]
fn test_error_envelope_snapshot() {
    let err = ShelfError::not_found("Database 'ghost.db' does not exist.");
    let envelope = ErrorEnvelope::from_error("query", &err);

    let json_str = serde_json::to_string_pretty(&envelope).unwrap();
    insta::assert_snapshot!(json_str, @r#"
    {
      "ok": false,
      "command": "query",
      "error": {
        "code": "NOT_FOUND",
        "message": "Database 'ghost.db' does not exist."
      }
    }
    "#);
}

#[test]
fn test_rejected_delete_snapshot() {
    let dir = TempDir::new().unwrap();
    let storage = StorageDir::open(dir.path()).unwrap();
    let result = sqlshelf::delete_database(&storage, "../../etc/passwd");

    let json_str = serde_json::to_string_pretty(&result).unwrap();
    insta::assert_snapshot!(json_str, @r#"
    {
      "success": false,
      "message": "Invalid filename"
    }
    "#);
}

#[test]
fn test_query_outcome_snapshots() {
    let affected = serde_json::to_string(&QueryOutcome::Affected(2)).unwrap();
    insta::assert_snapshot!(affected, @r#"[{"affected_rows":2}]"#);

    let error = serde_json::to_string(&QueryOutcome::Error("no such table: x".into())).unwrap();
    insta::assert_snapshot!(error, @r#"[{"error":"no such table: x"}]"#);

    let empty = serde_json::to_string(&QueryOutcome::Rows(Vec::new())).unwrap();
    insta::assert_snapshot!(empty, @"[]");
}

#[test]
fn test_schema_snapshot() {
    let (_dir, storage) = sales_db();
    let schema = SqliteEngine::get_schema(&storage.handle("sales.db").unwrap()).unwrap();

    let json_str = serde_json::to_string_pretty(&schema).unwrap();
    insta::assert_snapshot!(json_str, @r#"
    {
      "orders": [
        {
          "name": "id",
          "type": "INTEGER",
          "notnull": false,
          "pk": false
        },
        {
          "name": "amount",
          "type": "REAL",
          "notnull": false,
          "pk": false
        }
      ]
    }
    "#);
}

#[test]
fn test_sql_tool_response_snapshot() {
    let (_dir, storage) = sales_db();
    let response = SqliteEngine::text_to_sql(
        &storage.handle("sales.db").unwrap(),
        "SELECT id, amount FROM orders ORDER BY id",
    );

    let json_str = serde_json::to_string_pretty(&response).unwrap();
    insta::assert_snapshot!(json_str, @r#"
    {
      "query": "SELECT id, amount FROM orders ORDER BY id",
      "results": [
        {
          "id": 1,
          "amount": 10.0
        },
        {
          "id": 2,
          "amount": 20.5
        }
      ]
    }
    "#);
}

// ============================================================================
// Result Shape Tests
// ============================================================================

#[test]
fn test_database_info_shape() {
    let (_dir, storage) = sales_db();
    let info = SqliteEngine::database_info(&storage.handle("sales.db").unwrap());
    let value = serde_json::to_value(&info).unwrap();

    assert_eq!(top_level_keys(&value), vec!["schema", "sample_data"]);
    assert_eq!(
        value["sample_data"],
        json!({"orders": [{"id": 1, "amount": 10.0}, {"id": 2, "amount": 20.5}]})
    );
}

#[test]
fn test_preview_shape() {
    let (_dir, storage) = sales_db();
    let preview =
        SqliteEngine::preview_table(&storage.handle("sales.db").unwrap(), "orders", 20).unwrap();

    assert_eq!(
        serde_json::to_value(&preview).unwrap(),
        json!({"columns": ["id", "amount"], "rows": [[1, 10.0], [2, 20.5]]})
    );
}

#[test]
fn test_registry_entry_shape() {
    let (dir, storage) = sales_db();
    let summaries = sqlshelf::list_databases(&storage).unwrap();
    let value = serde_json::to_value(&summaries).unwrap();

    assert_eq!(top_level_keys(&value[0]), vec!["filename", "size_kb", "tables", "path"]);
    assert_eq!(value[0]["filename"], "sales.db");
    assert_eq!(value[0]["tables"], 1);
    assert_eq!(
        value[0]["path"],
        json!(dir.path().canonicalize().unwrap().join("sales.db"))
    );
}
