use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TransportResult;

/// Transport lifecycle state per spec §3 "Lifecycles": init → starting →
/// connected → stopped, with any non-connected state forcing reconnect on
/// next use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClientState {
    Init = 0,
    Starting = 1,
    Connected = 2,
    Stopped = 3,
}

impl ClientState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ClientState::Init,
            1 => ClientState::Starting,
            2 => ClientState::Connected,
            _ => ClientState::Stopped,
        }
    }
}

/// Shared atomic lifecycle cell, read by callers deciding whether to reuse
/// or replace a client (§4.B lazy connect / idempotent reconnect).
#[derive(Debug, Default)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new(initial: ClientState) -> Self {
        Self(AtomicU8::new(initial as u8))
    }

    pub fn get(&self) -> ClientState {
        ClientState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: ClientState) {
        self.0.store(state as u8, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.get() == ClientState::Connected
    }
}

/// A handler for server-initiated requests (`roots/list`,
/// `sampling/createMessage`) per §4.A. The default implementation answers
/// `roots/list` with an empty root set and declines sampling.
#[async_trait]
pub trait ServerRequestHandler: Send + Sync {
    async fn handle(&self, method: &str, params: Option<Value>) -> TransportResult<Value>;
}

pub struct DefaultServerRequestHandler;

#[async_trait]
impl ServerRequestHandler for DefaultServerRequestHandler {
    async fn handle(&self, method: &str, _params: Option<Value>) -> TransportResult<Value> {
        match method {
            "roots/list" => Ok(serde_json::json!({ "roots": [] })),
            "sampling/createMessage" => Err(crate::error::TransportError::Protocol(
                "no sampling handler registered".to_string(),
            )),
            other => Err(crate::error::TransportError::Protocol(format!(
                "unhandled server-initiated method: {other}"
            ))),
        }
    }
}

/// Common surface every concrete transport (stdio / SSE / WebSocket)
/// implements. One instance carries framed JSON-RPC to exactly one
/// upstream MCP server, in both directions (§4.A).
#[async_trait]
pub trait TransportClient: Send + Sync {
    /// Perform the `initialize` → `notifications/initialized` handshake
    /// and transition to `Connected`.
    async fn start(&self, timeout: Duration) -> TransportResult<InitializeOutcome>;

    /// Send a request and await its response, or time out.
    async fn call(&self, method: &str, params: Option<Value>, timeout: Duration) -> TransportResult<Value>;

    /// Send a fire-and-forget notification.
    async fn notify(&self, method: &str, params: Option<Value>) -> TransportResult<()>;

    fn state(&self) -> ClientState;

    /// Stop: cancel pending waiters with a connection-closed error,
    /// terminate the subprocess/stream gracefully then forcibly after a
    /// grace period, close streams.
    async fn stop(&self);
}

#[derive(Debug, Clone)]
pub struct InitializeOutcome {
    pub server_info: Option<Value>,
    pub capabilities: Value,
}
