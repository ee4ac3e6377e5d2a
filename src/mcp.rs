//! MCP server exposing the shared notepad as tools.
//!
//! The senior CLI launches `notepad-mcp` and talks JSON-RPC 2.0 over stdio,
//! one message per line. Tools: `write_shared`, `read_shared`, `list_shared`
//! and `delete_shared`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::notepad::{NoteFilter, Notepad, NotepadConfig};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "weaver-notepad";

const PARSE_ERROR: i32 = -32700;
const INVALID_PARAMS: i32 = -32602;
const METHOD_NOT_FOUND: i32 = -32601;

// =============================================================================
// JSON-RPC Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(rename = "jsonrpc", default)]
    _jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl JsonRpcRequest {
    /// Notifications carry no id and get no response.
    pub fn is_notification(&self) -> bool {
        self.id.is_null() && self.method.starts_with("notifications/")
    }
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

// =============================================================================
// Tools
// =============================================================================

#[derive(Debug, Serialize)]
struct ToolDefinition {
    name: &'static str,
    description: &'static str,
    #[serde(rename = "inputSchema")]
    input_schema: Value,
}

#[derive(Debug, Deserialize)]
struct WriteParams {
    content: String,
    #[serde(default)]
    note_id: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct NoteIdParams {
    note_id: String,
}

#[derive(Debug, Deserialize)]
struct ListParams {
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    20
}

fn tools() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "write_shared",
            description: "Write content to the shared notepad. Both agents can read it.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "content": {"type": "string", "description": "The content to write"},
                    "note_id": {"type": "string", "description": "Optional custom ID"},
                    "tags": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Optional tags"
                    }
                },
                "required": ["content"]
            }),
        },
        ToolDefinition {
            name: "read_shared",
            description: "Read a note from the shared notepad by ID.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "note_id": {"type": "string", "description": "The note ID to read"}
                },
                "required": ["note_id"]
            }),
        },
        ToolDefinition {
            name: "list_shared",
            description: "List recent notes from the shared notepad.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "tags": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Filter by tags"
                    },
                    "author": {"type": "string", "description": "Filter by author"},
                    "limit": {"type": "integer", "description": "Maximum results (default: 20)"}
                }
            }),
        },
        ToolDefinition {
            name: "delete_shared",
            description: "Delete a note from the shared notepad.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "note_id": {"type": "string", "description": "The note ID to delete"}
                },
                "required": ["note_id"]
            }),
        },
    ]
}

fn tool_text(payload: Value) -> Value {
    json!({ "content": [{ "type": "text", "text": payload.to_string() }] })
}

fn tool_error(message: impl Into<String>) -> Value {
    json!({
        "content": [{ "type": "text", "text": json!({ "error": message.into() }).to_string() }],
        "isError": true
    })
}

fn parse_args<T: for<'de> Deserialize<'de>>(arguments: Value) -> Result<T, String> {
    let arguments = if arguments.is_null() {
        json!({})
    } else {
        arguments
    };
    serde_json::from_value(arguments).map_err(|e| format!("Invalid arguments: {}", e))
}

async fn call_tool(notepad: &Notepad, name: &str, arguments: Value) -> Value {
    let outcome = match name {
        "write_shared" => write_shared(notepad, arguments).await,
        "read_shared" => read_shared(notepad, arguments).await,
        "list_shared" => list_shared(notepad, arguments).await,
        "delete_shared" => delete_shared(notepad, arguments).await,
        _ => {
            return json!({
                "content": [{ "type": "text", "text": format!("Unknown tool: {}", name) }],
                "isError": true
            })
        }
    };
    match outcome {
        Ok(result) => result,
        Err(message) => {
            tracing::warn!(tool = %name, "Notepad tool failed: {}", message);
            tool_error(message)
        }
    }
}

async fn write_shared(notepad: &Notepad, arguments: Value) -> Result<Value, String> {
    let params: WriteParams = parse_args(arguments)?;
    let note_id = notepad
        .write(&params.content, params.note_id.as_deref(), params.tags)
        .await
        .map_err(|e| e.to_string())?;
    Ok(tool_text(json!({
        "status": "written",
        "note_id": note_id,
        "length": params.content.chars().count(),
    })))
}

async fn read_shared(notepad: &Notepad, arguments: Value) -> Result<Value, String> {
    let params: NoteIdParams = parse_args(arguments)?;
    match notepad.read(&params.note_id).await.map_err(|e| e.to_string())? {
        Some(content) => Ok(tool_text(json!({
            "note_id": params.note_id,
            "content": content,
        }))),
        None => Ok(tool_error("Note not found")),
    }
}

async fn list_shared(notepad: &Notepad, arguments: Value) -> Result<Value, String> {
    let params: ListParams = parse_args(arguments)?;
    let filter = NoteFilter {
        tags: params.tags,
        author: params.author,
        limit: params.limit,
    };
    let notes = notepad.list(&filter).await.map_err(|e| e.to_string())?;
    Ok(tool_text(json!({
        "count": notes.len(),
        "notes": notes,
    })))
}

async fn delete_shared(notepad: &Notepad, arguments: Value) -> Result<Value, String> {
    let params: NoteIdParams = parse_args(arguments)?;
    if notepad.delete(&params.note_id).await.map_err(|e| e.to_string())? {
        Ok(tool_text(json!({
            "status": "deleted",
            "note_id": params.note_id,
        })))
    } else {
        Ok(tool_error("Note not found"))
    }
}

// =============================================================================
// Server
// =============================================================================

pub async fn handle_request(notepad: &Notepad, req: JsonRpcRequest) -> JsonRpcResponse {
    tracing::debug!(method = %req.method, "MCP request");
    match req.method.as_str() {
        "initialize" => JsonRpcResponse::success(
            req.id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                }
            }),
        ),
        "tools/list" => JsonRpcResponse::success(req.id, json!({ "tools": tools() })),
        "tools/call" => {
            let Some(params) = req.params.as_object() else {
                return JsonRpcResponse::error(req.id, INVALID_PARAMS, "Invalid params");
            };
            let Some(name) = params.get("name").and_then(Value::as_str) else {
                return JsonRpcResponse::error(req.id, INVALID_PARAMS, "Missing tool name");
            };
            let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
            let result = call_tool(notepad, name, arguments).await;
            JsonRpcResponse::success(req.id, result)
        }
        "shutdown" => JsonRpcResponse::success(req.id, json!({})),
        _ => JsonRpcResponse::error(
            req.id,
            METHOD_NOT_FOUND,
            format!("Method not found: {}", req.method),
        ),
    }
}

/// Serve requests line by line until the input closes.
pub async fn serve<R, W>(notepad: &Notepad, reader: R, mut writer: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<JsonRpcRequest>(line) {
            Ok(request) if request.is_notification() => {
                tracing::debug!(method = %request.method, "MCP notification");
                continue;
            }
            Ok(request) => handle_request(notepad, request).await,
            Err(e) => JsonRpcResponse::error(Value::Null, PARSE_ERROR, format!("Parse error: {}", e)),
        };

        match serde_json::to_string(&response) {
            Ok(json) => {
                writer.write_all(json.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
            Err(e) => tracing::error!("Failed to serialize MCP response: {}", e),
        }
    }
    Ok(())
}

/// `--mcp-config` document that launches the notepad server at `command`
/// against the same notepad storage.
pub fn mcp_server_config(command: &str, notepad: &NotepadConfig) -> String {
    let mut env = serde_json::Map::new();
    env.insert(
        "WEAVER_NOTEPAD_DIR".to_string(),
        Value::String(notepad.root.display().to_string()),
    );
    if let Some(remote) = &notepad.remote {
        env.insert("WEAVER_NOTEPAD_URL".to_string(), json!(remote.base_url));
        env.insert("WEAVER_NOTEPAD_DATABASE".to_string(), json!(remote.database));
        env.insert("WEAVER_NOTEPAD_USER".to_string(), json!(remote.username));
    }
    json!({
        "mcpServers": {
            "notepad": {
                "command": command,
                "args": [],
                "env": env,
            }
        }
    })
    .to_string()
}
