//! The façade binary also speaks stdio MCP itself, so a downstream
//! agent can point straight at this process as if it were any other
//! upstream server. Reuses `skillflow-transport`'s framing types on the
//! server side of the wire instead of hand-rolling a second JSON-RPC
//! parser.

use serde_json::{json, Value};
use skillflow_transport::message::{
    InboundEnvelope, InboundMessage, JsonRpcResponse, INTERNAL_ERROR_CODE, INVALID_REQUEST_CODE,
    JSONRPC_VERSION, MCP_PROTOCOL_VERSION,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::facade::Facade;

/// Runs until stdin closes. One JSON object per line in, one per line
/// out; never panics on malformed input, only responds with a JSON-RPC
/// error object.
pub async fn serve_stdio(facade: &Facade, client_name: &str, client_version: &str) {
    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "stdio read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let Some(response) = handle_line(facade, client_name, client_version, &line).await else {
            continue;
        };
        let Ok(mut encoded) = serde_json::to_string(&response) else {
            continue;
        };
        encoded.push('\n');
        if let Err(e) = stdout.write_all(encoded.as_bytes()).await {
            tracing::warn!(error = %e, "stdio write failed");
            break;
        }
        if let Err(e) = stdout.flush().await {
            tracing::warn!(error = %e, "stdio flush failed");
            break;
        }
    }
}

async fn handle_line(facade: &Facade, client_name: &str, client_version: &str, line: &str) -> Option<JsonRpcResponse> {
    let envelope: InboundEnvelope = match serde_json::from_str(line) {
        Ok(e) => e,
        Err(e) => {
            return Some(JsonRpcResponse::error(Value::Null, INVALID_REQUEST_CODE, format!("parse error: {e}")));
        }
    };

    match envelope.classify() {
        InboundMessage::ServerRequest { id, method, params } => {
            Some(handle_request(facade, client_name, client_version, id, &method, params).await)
        }
        InboundMessage::Notification { .. } => None,
        InboundMessage::Response { .. } => None,
        InboundMessage::Invalid(reason) => {
            Some(JsonRpcResponse::error(Value::Null, INVALID_REQUEST_CODE, reason))
        }
    }
}

async fn handle_request(
    facade: &Facade,
    client_name: &str,
    client_version: &str,
    id: Value,
    method: &str,
    params: Option<Value>,
) -> JsonRpcResponse {
    let params = params.unwrap_or(Value::Null);
    let result = match method {
        "initialize" => Ok(json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "serverInfo": { "name": client_name, "version": client_version },
            "capabilities": { "tools": { "listChanged": true } },
        })),
        "tools/list" => Ok(json!({ "tools": facade.list_tools().await })),
        "tools/call" => {
            let name = params.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
            let args = params.get("arguments").cloned().unwrap_or(json!({}));
            Ok(serde_json::to_value(facade.call_tool(client_name, &name, args).await).unwrap_or(Value::Null))
        }
        other => Err(format!("method not found: {other}")),
    };

    match result {
        Ok(value) => JsonRpcResponse { jsonrpc: JSONRPC_VERSION, id, result: Some(value), error: None },
        Err(message) => JsonRpcResponse::error(id, INTERNAL_ERROR_CODE, message),
    }
}
