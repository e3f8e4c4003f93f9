//! Framed JSON-RPC transport clients for upstream MCP servers.
//!
//! Carries requests/responses/notifications over stdio subprocesses,
//! HTTP+SSE, and WebSocket, matching responses to callers via an
//! `id -> waiter` table (one-shot channel per in-flight request). This
//! crate owns framing and routing only; connection pooling, retry, and
//! discovery live one layer up in `skillflow_mcp`.

pub mod client;
pub mod error;
pub mod message;
pub mod sse;
pub mod stdio;
pub mod waiters;
pub mod websocket;

pub use client::{ClientState, InitializeOutcome, ServerRequestHandler, TransportClient};
pub use error::{TransportError, TransportResult};
pub use sse::SseTransport;
pub use stdio::StdioTransport;
pub use websocket::WebSocketTransport;
