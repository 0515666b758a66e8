//! JSON-RPC 2.0 transport for the MCP surface.
//!
//! One envelope, two carriers: newline-delimited JSON on stdio (default; all
//! logging goes to stderr so stdout stays a clean wire) and HTTP POST (see
//! [`super::http`]). Method routing lives in [`handle_message`] so both
//! transports behave identically.
//!
//! Protocol version: MCP 2024-11-05.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use super::DispatchSurface;

pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

// JSON-RPC / MCP error codes.
pub const MCP_PARSE_ERROR: i64 = -32700;
pub const MCP_INVALID_REQUEST: i64 = -32600;
pub const MCP_METHOD_NOT_FOUND: i64 = -32601;
pub const MCP_INVALID_PARAMS: i64 = -32602;
pub const MCP_INTERNAL_ERROR: i64 = -32603;

// ─── Wire types ──────────────────────────────────────────────────────────────

/// Inbound JSON-RPC message. `id` is absent for notifications.
#[derive(Debug, Deserialize)]
pub struct RpcMessage {
    #[allow(dead_code)]
    pub jsonrpc: Option<String>,
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(error),
        }
    }
}

// ─── Capabilities ────────────────────────────────────────────────────────────

/// Capability object for the `initialize` response. The relay serves all
/// three operation kinds; sampling delegation is not offered.
pub fn server_capabilities() -> Value {
    json!({
        "tools": { "listChanged": false },
        "resources": { "subscribe": false, "listChanged": false },
        "prompts": { "listChanged": false }
    })
}

// ─── Method routing ──────────────────────────────────────────────────────────

/// Route one inbound message. Returns `None` for notifications (no reply on
/// the wire).
pub async fn handle_message(
    surface: &Arc<DispatchSurface>,
    server_name: &str,
    msg: RpcMessage,
) -> Option<RpcResponse> {
    let id = msg.id.clone();

    // Notifications carry no id and get no response.
    if id.is_none() {
        match msg.method.as_str() {
            "notifications/initialized" => debug!("client initialized"),
            other => debug!(method = other, "ignoring notification"),
        }
        return None;
    }
    let id = id.unwrap_or(Value::Null);

    let result = match msg.method.as_str() {
        "initialize" => Ok(json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": server_capabilities(),
            "serverInfo": {
                "name": server_name,
                "version": env!("CARGO_PKG_VERSION"),
            }
        })),
        "ping" => Ok(json!({})),
        "tools/list" => Ok(json!({
            "tools": surface.tool_defs().iter().map(|d| json!({
                "name": d.name,
                "description": d.description,
                "inputSchema": d.input_schema,
            })).collect::<Vec<_>>()
        })),
        "tools/call" => call_tool(surface, &msg.params).await,
        "resources/list" => Ok(json!({
            "resources": surface.resource_defs().iter().map(|d| json!({
                "uri": d.name,
                "name": d.description,
                "mimeType": "text/plain",
            })).collect::<Vec<_>>()
        })),
        "resources/read" => read_resource(surface, &msg.params).await,
        "prompts/list" => Ok(json!({
            "prompts": surface.prompt_defs().iter().map(|d| json!({
                "name": d.name,
                "description": d.description,
            })).collect::<Vec<_>>()
        })),
        "prompts/get" => get_prompt(surface, &msg.params).await,
        other => Err(RpcError::new(
            MCP_METHOD_NOT_FOUND,
            format!("unknown method: {other}"),
        )),
    };

    Some(match result {
        Ok(value) => RpcResponse::ok(id, value),
        Err(e) => RpcResponse::err(id, e),
    })
}

async fn call_tool(surface: &Arc<DispatchSurface>, params: &Value) -> Result<Value, RpcError> {
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::new(MCP_INVALID_PARAMS, "missing required field 'name'"))?;
    let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

    if !surface.has_tool(name) {
        return Err(RpcError::new(
            MCP_INVALID_PARAMS,
            format!("unknown tool: {name}"),
        ));
    }

    match surface.dispatch_tool(name, arguments).await {
        Ok(text) => {
            info!(tool = name, "tool executed");
            Ok(json!({
                "content": [{ "type": "text", "text": text }],
                "isError": false,
            }))
        }
        // Tool handlers already format partner-API failures as readable
        // text; anything escaping here is an internal fault.
        Err(e) => {
            warn!(tool = name, error = %e, "tool handler failed");
            Err(RpcError::new(MCP_INTERNAL_ERROR, e.to_string()))
        }
    }
}

async fn read_resource(surface: &Arc<DispatchSurface>, params: &Value) -> Result<Value, RpcError> {
    let uri = params
        .get("uri")
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::new(MCP_INVALID_PARAMS, "missing required field 'uri'"))?;

    match surface.read_resource(uri).await {
        Ok(text) => Ok(json!({
            "contents": [{ "uri": uri, "mimeType": "text/plain", "text": text }]
        })),
        Err(e) => Err(RpcError::new(MCP_INVALID_PARAMS, e.to_string())),
    }
}

async fn get_prompt(surface: &Arc<DispatchSurface>, params: &Value) -> Result<Value, RpcError> {
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::new(MCP_INVALID_PARAMS, "missing required field 'name'"))?;
    let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

    match surface.render_prompt(name, arguments).await {
        Ok(text) => Ok(json!({
            "messages": [{
                "role": "user",
                "content": { "type": "text", "text": text }
            }]
        })),
        Err(e) => Err(RpcError::new(MCP_INVALID_PARAMS, e.to_string())),
    }
}

// ─── Stdio loop ──────────────────────────────────────────────────────────────

/// Serve newline-delimited JSON-RPC on stdin/stdout until EOF.
pub async fn serve_stdio(surface: Arc<DispatchSurface>, server_name: &str) -> anyhow::Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut lines = stdin.lines();

    info!(server = server_name, "serving MCP on stdio");

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<RpcMessage>(line) {
            Ok(msg) => handle_message(&surface, server_name, msg).await,
            Err(e) => Some(RpcResponse::err(
                Value::Null,
                RpcError::new(MCP_PARSE_ERROR, format!("parse error: {e}")),
            )),
        };

        if let Some(response) = response {
            let mut out = serde_json::to_vec(&response)?;
            out.push(b'\n');
            stdout.write_all(&out).await?;
            stdout.flush().await?;
        }
    }

    info!("stdin closed — shutting down");
    Ok(())
}
