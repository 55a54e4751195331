//! Line-delimited JSON-RPC 2.0 tool server.
//!
//! Reads one request per line, answers `initialize`, `ping`, `tools/list` and
//! `tools/call` from a read-only [`ToolRegistry`], and writes one response per
//! line. Notifications are handled without a reply. Diagnostics go through
//! `tracing`, never through the output stream.
//!
//! `tools/call` requests run as separate tasks, so a long call (a device login
//! waiting for approval) never holds up `ping` or other tool calls. Their
//! responses are written in completion order.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::tools::ToolRegistry;

pub const PROTOCOL_VERSION: &str = "2024-11-05";

const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const INTERNAL_ERROR: i64 = -32603;

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

/// One JSON-RPC response line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

impl JsonRpcResponse {
    fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

/// Serve requests from stdin until it closes.
pub async fn serve_stdio(registry: Arc<ToolRegistry>) -> std::io::Result<()> {
    let reader = BufReader::new(tokio::io::stdin());
    serve(registry, reader, tokio::io::stdout()).await
}

/// Serve requests from `reader`, writing responses to `writer`.
///
/// Returns once the reader hits EOF and every in-flight tool call has answered.
pub async fn serve<R, W>(registry: Arc<ToolRegistry>, reader: R, mut writer: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    info!(tools = registry.len(), "tool server running");
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    let mut done_tx = Some(done_tx);
    let mut lines = reader.lines();

    loop {
        tokio::select! {
            line = lines.next_line(), if done_tx.is_some() => {
                let Some(line) = line? else {
                    info!("input closed, waiting for in-flight tool calls");
                    done_tx = None;
                    continue;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match route_line(&registry, line) {
                    Routed::Reply(response) => write_response(&mut writer, &response).await?,
                    Routed::Silent => {}
                    Routed::ToolCall { id, params } => {
                        if let Some(done) = &done_tx {
                            spawn_tool_call(Arc::clone(&registry), id, params, done.clone());
                        }
                    }
                }
            }
            response = done_rx.recv() => match response {
                Some(response) => write_response(&mut writer, &response).await?,
                None => break,
            },
        }
    }
    info!("tool server stopped");
    Ok(())
}

/// Handle one raw request line to completion. Returns `None` for notifications.
pub async fn handle_line(registry: &ToolRegistry, line: &str) -> Option<JsonRpcResponse> {
    match route_line(registry, line) {
        Routed::Reply(response) => Some(response),
        Routed::Silent => None,
        Routed::ToolCall { id, params } => Some(handle_tools_call(registry, id, &params).await),
    }
}

enum Routed {
    Reply(JsonRpcResponse),
    Silent,
    ToolCall { id: Value, params: Value },
}

/// Answer everything that needs no tool handler; hand tool calls back.
fn route_line(registry: &ToolRegistry, line: &str) -> Routed {
    let request: JsonRpcRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(err) => {
            warn!(error = %err, "unparseable request");
            return Routed::Reply(JsonRpcResponse::error(
                Value::Null,
                PARSE_ERROR,
                format!("Invalid JSON: {err}"),
            ));
        }
    };

    if request.jsonrpc != "2.0" {
        return match request.id {
            Some(id) => Routed::Reply(JsonRpcResponse::error(
                id,
                INVALID_REQUEST,
                "Invalid JSON-RPC version",
            )),
            None => Routed::Silent,
        };
    }

    let Some(id) = request.id.clone() else {
        debug!(method = %request.method, "notification received");
        return Routed::Silent;
    };

    debug!(method = %request.method, "request received");
    let response = match request.method.as_str() {
        "initialize" => JsonRpcResponse::success(id, initialize_result()),
        "ping" => JsonRpcResponse::success(id, json!({})),
        "tools/list" => JsonRpcResponse::success(id, json!({ "tools": registry.all_tools() })),
        "tools/call" => {
            return Routed::ToolCall {
                id,
                params: request.params,
            }
        }
        other => JsonRpcResponse::error(id, METHOD_NOT_FOUND, format!("Unknown method: {other}")),
    };
    Routed::Reply(response)
}

fn spawn_tool_call(
    registry: Arc<ToolRegistry>,
    id: Value,
    params: Value,
    done: mpsc::UnboundedSender<JsonRpcResponse>,
) {
    tokio::spawn(async move {
        let response = handle_tools_call(&registry, id, &params).await;
        if done.send(response).is_err() {
            debug!("tool call finished after the server stopped");
        }
    });
}

fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": { "tools": { "listChanged": false } },
        "serverInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

async fn handle_tools_call(registry: &ToolRegistry, id: Value, params: &Value) -> JsonRpcResponse {
    let Some(name) = params
        .get("name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
    else {
        return JsonRpcResponse::error(id, INVALID_PARAMS, "Missing tool name in params");
    };
    let args = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

    let outcome = registry.route_tool_call(name, args).await;
    match serde_json::to_value(&outcome) {
        Ok(result) => JsonRpcResponse::success(id, result),
        Err(err) => JsonRpcResponse::error(id, INTERNAL_ERROR, format!("Failed to encode result: {err}")),
    }
}

async fn write_response<W>(writer: &mut W, response: &JsonRpcResponse) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = serde_json::to_vec(response)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await
}
