use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Invalid request id per JSON-RPC 2.0 (§4.A: a server request arriving
/// with `id == null` is invalid).
pub const INVALID_REQUEST_CODE: i64 = -32600;
/// Generic internal error code used when we cannot classify a failure more
/// precisely.
pub const INTERNAL_ERROR_CODE: i64 = -32603;

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcErrorObject>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    pub fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: None,
            error: Some(JsonRpcErrorObject {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// An inbound line/frame, loosely parsed enough to classify it per §4.A's
/// routing rule before we know which concrete shape it is.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundEnvelope {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcErrorObject>,
}

#[derive(Debug, Clone)]
pub enum InboundMessage {
    /// A response (success or error) to a request we sent, matched by id.
    Response { id: u64, outcome: Result<Value, JsonRpcErrorObject> },
    /// A server-to-client request: carries a method and an id we must
    /// answer.
    ServerRequest { id: Value, method: String, params: Option<Value> },
    /// A notification: has a method, no id.
    Notification { method: String, params: Option<Value> },
    /// A message with an id but no method and no result/error — malformed.
    Invalid(String),
}

impl InboundEnvelope {
    pub fn classify(self) -> InboundMessage {
        match (&self.id, &self.method) {
            (Some(id_val), None) => match id_val.as_u64() {
                Some(id) => {
                    let outcome = match self.error {
                        Some(e) => Err(e),
                        None => Ok(self.result.unwrap_or(Value::Null)),
                    };
                    InboundMessage::Response { id, outcome }
                }
                None => InboundMessage::Invalid(format!(
                    "response id is not a non-negative integer: {id_val}"
                )),
            },
            (Some(id_val), Some(method)) => {
                if id_val.is_null() {
                    InboundMessage::Invalid(
                        "server request arrived with id == null".to_string(),
                    )
                } else {
                    InboundMessage::ServerRequest {
                        id: id_val.clone(),
                        method: method.clone(),
                        params: self.params,
                    }
                }
            }
            (None, Some(method)) => InboundMessage::Notification {
                method: method.clone(),
                params: self.params,
            },
            (None, None) => InboundMessage::Invalid(
                "message carries neither id nor method".to_string(),
            ),
        }
    }
}
