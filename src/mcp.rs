//! MCP (Model Context Protocol) Server
//!
//! This module exposes the read and query operations to a natural-language
//! agent using manual JSON-RPC 2.0 over stdio.
//!
//! # Architecture
//!
//! - **Transport**: JSON-RPC 2.0 over stdio (line-based)
//! - **Dependencies**: Only `serde_json` and anyhow (no MCP-specific crates)
//! - **Dispatch**: every request runs in its own task and tool bodies run on
//!   the blocking pool, so a slow call on one database file never holds up
//!   reading or answering the next request. Responses are written as they
//!   complete and may arrive out of request order; clients match them by `id`.
//!
//! # MCP Tools
//!
//! - `list_databases` - Registry listing of the storage directory
//! - `list_tables` - Table names of one database
//! - `get_schema` - Column metadata for every table
//! - `get_database_info` - Schema plus up to 3 sample rows per table
//! - `preview_table` - Bounded preview of one table
//! - `run_query` - Execute one SQL statement; failures come back as `{"error": ...}` records
//!
//! Deleting or creating database files is not exposed here.
//!
//! # Usage
//!
//! Start the MCP server with: `sqlshelf --storage-dir <dir> mcp`

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use crate::engine::sqlite::SqliteEngine;
use crate::engine::DatabaseEngine;
use crate::guard::{DatabaseHandle, StorageDir};
use crate::registry::list_databases;

// ============================================================================
// JSON-RPC 2.0 Structures
// ============================================================================

/// JSON-RPC 2.0 Request
#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    params: Option<Value>,
}

/// JSON-RPC 2.0 Response
#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 Error
#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl JsonRpcResponse {
    fn result(id: Option<Value>, value: Value) -> Self {
        Self { jsonrpc: "2.0".to_string(), id, result: Some(value), error: None }
    }

    fn error(id: Option<Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError { code, message, data: None }),
        }
    }
}

// ============================================================================
// MCP Tool Result Structures
// ============================================================================

/// Text content block for MCP tool results
#[derive(Debug, Serialize)]
struct TextContent {
    #[serde(rename = "type")]
    content_type: String,
    text: String,
}

impl TextContent {
    fn new(text: String) -> Self {
        Self { content_type: "text".to_string(), text }
    }
}

/// MCP tool call result
#[derive(Debug, Serialize)]
struct CallToolResult {
    content: Vec<TextContent>,
    #[serde(rename = "isError")]
    is_error: bool,
}

impl CallToolResult {
    /// Create a successful tool result with JSON data
    fn success(data: impl Serialize) -> Result<Value> {
        let json_text = serde_json::to_string_pretty(&data)?;
        let result = Self { content: vec![TextContent::new(json_text)], is_error: false };
        Ok(serde_json::to_value(result)?)
    }
}

// ============================================================================
// MCP Server
// ============================================================================

/// Settings every tool call runs against
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub storage: StorageDir,
    pub preview_limit: usize,
}

/// Start the MCP server
///
/// Reads JSON-RPC requests from stdin, one per line, and writes one JSON-RPC
/// response line per request to stdout.
///
/// # Errors
///
/// Returns an error if stdio communication fails.
pub async fn serve(ctx: ToolContext) -> Result<()> {
    tracing::info!(storage = %ctx.storage.path().display(), "mcp server started");
    serve_io(ctx, tokio::io::stdin(), tokio::io::stdout()).await?;
    Ok(())
}

/// Serve requests read from `input`, writing responses to `output`
///
/// Returns `output` once the input is exhausted and every in-flight request
/// has been answered.
async fn serve_io<R, W>(ctx: ToolContext, input: R, output: W) -> Result<W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel::<JsonRpcResponse>();
    let writer = tokio::spawn(write_responses(rx, output));

    let mut lines = BufReader::new(input).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<JsonRpcRequest>(&line) {
            Ok(request) => {
                let ctx = ctx.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let response = handle_request(request, &ctx).await;
                    // Send fails only once the writer has stopped on an I/O error
                    let _ = tx.send(response);
                });
            }
            Err(e) => {
                let _ = tx.send(JsonRpcResponse::error(None, -32700, format!("Parse error: {e}")));
            }
        }
    }

    // The writer drains until the last in-flight task drops its sender
    drop(tx);
    writer.await.context("Response writer panicked")?
}

/// Write each response as one line, in completion order
async fn write_responses<W>(
    mut rx: mpsc::UnboundedReceiver<JsonRpcResponse>,
    mut output: W,
) -> Result<W>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let mut line = serde_json::to_string(&response)?;
        line.push('\n');
        output.write_all(line.as_bytes()).await?;
        output.flush().await?;
    }
    Ok(output)
}

/// Route a JSON-RPC request to its handler
async fn handle_request(request: JsonRpcRequest, ctx: &ToolContext) -> JsonRpcResponse {
    let result = match request.method.as_str() {
        "initialize" => handle_initialize(),
        "tools/list" => handle_list_tools(),
        "tools/call" => handle_call_tool(request.params, ctx).await,
        _ => Err(anyhow!("Unknown method: {}", request.method)),
    };

    match result {
        Ok(value) => JsonRpcResponse::result(request.id, value),
        Err(e) => JsonRpcResponse::error(request.id, -32603, e.to_string()),
    }
}

// ============================================================================
// MCP Protocol Handlers
// ============================================================================

/// Handle MCP initialize request
fn handle_initialize() -> Result<Value> {
    Ok(serde_json::json!({
        "protocolVersion": "2024-11-05",
        "capabilities": {
            "tools": {}
        },
        "serverInfo": {
            "name": "sqlshelf",
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

fn database_property() -> Value {
    serde_json::json!({
        "type": "string",
        "description": "Database filename inside the storage directory (e.g. 'sales.db'). Use list_databases to discover names."
    })
}

/// Handle tools/list request
fn handle_list_tools() -> Result<Value> {
    Ok(serde_json::json!({
        "tools": [
            {
                "name": "list_databases",
                "description": "List every database file in the storage directory with its size in KB and table count. A file that cannot be read reports {\"error\": ...} instead of a count.",
                "inputSchema": { "type": "object", "properties": {} }
            },
            {
                "name": "list_tables",
                "description": "List the table names of one database in catalog order.",
                "inputSchema": {
                    "type": "object",
                    "properties": { "database": database_property() },
                    "required": ["database"]
                }
            },
            {
                "name": "get_schema",
                "description": "Column name, declared type, notnull and pk flags for every table of one database.",
                "inputSchema": {
                    "type": "object",
                    "properties": { "database": database_property() },
                    "required": ["database"]
                }
            },
            {
                "name": "get_database_info",
                "description": "CALL THIS BEFORE WRITING SQL. Returns the schema of one database plus up to 3 sample rows per table so queries can use real column names and example values.",
                "inputSchema": {
                    "type": "object",
                    "properties": { "database": database_property() },
                    "required": ["database"]
                }
            },
            {
                "name": "preview_table",
                "description": "Return column names and the first rows of one table.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "database": database_property(),
                        "table": { "type": "string", "description": "Table name" },
                        "limit": { "type": "number", "description": "Maximum rows (default from configuration, 20 if unset)" }
                    },
                    "required": ["database", "table"]
                }
            },
            {
                "name": "run_query",
                "description": "Execute exactly one SQL statement (SQLite dialect). Statements starting with SELECT return a list of row objects; anything else returns [{\"affected_rows\": n}]. Failures return [{\"error\": \"<engine message>\"}]: read the message, fix the SQL, and try again.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "database": database_property(),
                        "sql": { "type": "string", "description": "Single SQL statement" }
                    },
                    "required": ["database", "sql"]
                }
            }
        ]
    }))
}

/// Handle tools/call request
///
/// The tool body runs on tokio's blocking pool; database I/O is synchronous.
/// Calls on different database files proceed in parallel.
async fn handle_call_tool(params: Option<Value>, ctx: &ToolContext) -> Result<Value> {
    let params = params.ok_or_else(|| anyhow!("Missing params"))?;
    let name = params["name"].as_str().ok_or_else(|| anyhow!("Missing tool name"))?.to_string();
    let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
    let ctx = ctx.clone();

    tokio::task::spawn_blocking(move || call_tool(&name, &arguments, &ctx))
        .await
        .context("Tool task panicked")?
}

fn call_tool(name: &str, args: &Value, ctx: &ToolContext) -> Result<Value> {
    tracing::debug!(tool = name, "tool call");
    match name {
        "list_databases" => tool_list_databases(ctx),
        "list_tables" => tool_list_tables(args, ctx),
        "get_schema" => tool_get_schema(args, ctx),
        "get_database_info" => tool_get_database_info(args, ctx),
        "preview_table" => tool_preview_table(args, ctx),
        "run_query" => tool_run_query(args, ctx),
        _ => Err(anyhow!("Unknown tool: {name}")),
    }
}

// ============================================================================
// Tool Implementations
// ============================================================================

fn tool_list_databases(ctx: &ToolContext) -> Result<Value> {
    let mut summaries = list_databases(&ctx.storage).map_err(|e| anyhow!("{e}"))?;
    summaries.sort_by(|a, b| a.filename.cmp(&b.filename));
    CallToolResult::success(summaries)
}

fn tool_list_tables(args: &Value, ctx: &ToolContext) -> Result<Value> {
    let handle = handle_from_args(args, ctx)?;
    let tables = SqliteEngine::list_tables(&handle).map_err(|e| anyhow!("{e}"))?;
    CallToolResult::success(tables)
}

fn tool_get_schema(args: &Value, ctx: &ToolContext) -> Result<Value> {
    let handle = handle_from_args(args, ctx)?;
    let schema = SqliteEngine::get_schema(&handle).map_err(|e| anyhow!("{e}"))?;
    CallToolResult::success(schema)
}

fn tool_get_database_info(args: &Value, ctx: &ToolContext) -> Result<Value> {
    let handle = handle_from_args(args, ctx)?;
    CallToolResult::success(SqliteEngine::database_info(&handle))
}

fn tool_preview_table(args: &Value, ctx: &ToolContext) -> Result<Value> {
    let handle = handle_from_args(args, ctx)?;
    let table = args["table"].as_str().ok_or_else(|| anyhow!("Missing required field: table"))?;
    let limit = args
        .get("limit")
        .and_then(Value::as_u64)
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(ctx.preview_limit);

    let preview = SqliteEngine::preview_table(&handle, table, limit).map_err(|e| anyhow!("{e}"))?;
    CallToolResult::success(preview)
}

fn tool_run_query(args: &Value, ctx: &ToolContext) -> Result<Value> {
    let sql = args["sql"].as_str().ok_or_else(|| anyhow!("Missing required field: sql"))?;
    let handle = handle_from_args(args, ctx)?;
    CallToolResult::success(SqliteEngine::text_to_sql(&handle, sql))
}

/// Resolve the `database` argument through the path guard
fn handle_from_args(args: &Value, ctx: &ToolContext) -> Result<DatabaseHandle> {
    let database =
        args["database"].as_str().ok_or_else(|| anyhow!("Missing required field: database"))?;
    ctx.storage.handle(database).map_err(|e| anyhow!("{e}"))
}
