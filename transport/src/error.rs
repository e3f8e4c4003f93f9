use thiserror::Error;

/// Errors surfaced by a transport client.
///
/// Mirrors the taxonomy a caller needs to distinguish: protocol framing
/// problems, timeouts, and connection loss all recover differently one
/// layer up in the client manager.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("malformed JSON-RPC message: {0}")]
    Protocol(String),

    #[error("request {id} timed out after {elapsed_ms}ms")]
    Timeout { id: u64, elapsed_ms: u64 },

    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    #[error("handshake with upstream server failed: {0}")]
    Handshake(String),

    #[error("upstream returned JSON-RPC error {code}: {message}")]
    Remote { code: i64, message: String },

    #[error("transport is not connected")]
    NotConnected,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("websocket error: {0}")]
    WebSocket(String),

    #[error("invalid server URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

pub type TransportResult<T> = Result<T, TransportError>;
