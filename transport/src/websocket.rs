use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message;

use crate::client::{
    ClientState, DefaultServerRequestHandler, InitializeOutcome, ServerRequestHandler, StateCell,
    TransportClient,
};
use crate::error::{TransportError, TransportResult};
use crate::message::{
    InboundMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, MCP_PROTOCOL_VERSION,
};
use crate::waiters::{into_transport_error, WaiterTable};

/// WebSocket transport (§4.A): each text frame is one JSON-RPC message.
pub struct WebSocketTransport {
    url: String,
    state: StateCell,
    waiters: Arc<WaiterTable>,
    write_tx: mpsc::UnboundedSender<Message>,
    handler: Arc<dyn ServerRequestHandler>,
    client_name: String,
    client_version: String,
    connected: Mutex<()>,
}

impl WebSocketTransport {
    pub async fn connect(
        url: impl Into<String>,
        client_name: impl Into<String>,
        client_version: impl Into<String>,
    ) -> TransportResult<Arc<Self>> {
        Self::connect_with_handler(
            url,
            client_name,
            client_version,
            Arc::new(DefaultServerRequestHandler),
        )
        .await
    }

    pub async fn connect_with_handler(
        url: impl Into<String>,
        client_name: impl Into<String>,
        client_version: impl Into<String>,
        handler: Arc<dyn ServerRequestHandler>,
    ) -> TransportResult<Arc<Self>> {
        let url = url.into();
        let (stream, _response) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|e| TransportError::WebSocket(e.to_string()))?;
        let (mut write, mut read) = stream.split();

        let waiters = Arc::new(WaiterTable::new());
        let (write_tx, mut write_rx) = mpsc::unbounded_channel::<Message>();

        let transport = Arc::new(Self {
            url,
            state: StateCell::new(ClientState::Init),
            waiters: waiters.clone(),
            write_tx,
            handler,
            client_name: client_name.into(),
            client_version: client_version.into(),
            connected: Mutex::new(()),
        });

        tokio::spawn(async move {
            while let Some(msg) = write_rx.recv().await {
                if write.send(msg).await.is_err() {
                    break;
                }
            }
        });

        let reader_transport = transport.clone();
        tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        reader_transport.handle_inbound_text(&text).await;
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::warn!(error = %e, "websocket read error");
                        break;
                    }
                }
            }
            reader_transport.state.set(ClientState::Stopped);
            reader_transport.waiters.fail_all("websocket closed");
        });

        Ok(transport)
    }

    async fn handle_inbound_text(&self, text: &str) {
        let envelope: crate::message::InboundEnvelope = match serde_json::from_str(text) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, text = %text, "skipping malformed websocket frame");
                return;
            }
        };
        match envelope.classify() {
            InboundMessage::Response { id, outcome } => self.waiters.resolve(id, outcome),
            InboundMessage::Notification { method, .. } => {
                tracing::debug!(method = %method, "notification from upstream (ws)");
            }
            InboundMessage::ServerRequest { id, method, params } => {
                let handler = self.handler.clone();
                let write_tx = self.write_tx.clone();
                tokio::spawn(async move {
                    let response = match handler.handle(&method, params).await {
                        Ok(result) => JsonRpcResponse {
                            jsonrpc: crate::message::JSONRPC_VERSION,
                            id,
                            result: Some(result),
                            error: None,
                        },
                        Err(e) => JsonRpcResponse::error(
                            id,
                            crate::message::INTERNAL_ERROR_CODE,
                            e.to_string(),
                        ),
                    };
                    if let Ok(text) = serde_json::to_string(&response) {
                        let _ = write_tx.send(Message::text(text));
                    }
                });
            }
            InboundMessage::Invalid(reason) => {
                tracing::warn!(reason = %reason, "invalid websocket frame");
            }
        }
    }
}

#[async_trait]
impl TransportClient for WebSocketTransport {
    async fn start(&self, timeout: Duration) -> TransportResult<InitializeOutcome> {
        let _guard = self.connected.lock().await;
        self.state.set(ClientState::Starting);
        let init_params = serde_json::json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "clientInfo": { "name": self.client_name, "version": self.client_version },
            "capabilities": { "roots": { "listChanged": true }, "sampling": {} },
        });
        let result = match self.call("initialize", Some(init_params), timeout).await {
            Ok(v) => v,
            Err(e) => {
                self.state.set(ClientState::Stopped);
                return Err(TransportError::Handshake(e.to_string()));
            }
        };
        self.notify("notifications/initialized", None).await?;
        self.state.set(ClientState::Connected);
        tracing::debug!(url = %self.url, "websocket transport connected");
        Ok(InitializeOutcome {
            server_info: result.get("serverInfo").cloned(),
            capabilities: result.get("capabilities").cloned().unwrap_or(Value::Null),
        })
    }

    async fn call(&self, method: &str, params: Option<Value>, timeout: Duration) -> TransportResult<Value> {
        if self.state.get() == ClientState::Stopped {
            return Err(TransportError::NotConnected);
        }
        let (id, rx) = self.waiters.register();
        let request = JsonRpcRequest::new(id, method, params);
        let text = serde_json::to_string(&request)?;
        if self.write_tx.send(Message::text(text)).is_err() {
            self.waiters.cancel(id);
            return Err(TransportError::ConnectionClosed("writer task has shut down".to_string()));
        }
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => into_transport_error(id, outcome),
            Ok(Err(_)) => Err(TransportError::ConnectionClosed(
                "waiter dropped before resolution".to_string(),
            )),
            Err(_) => {
                self.waiters.cancel(id);
                Err(TransportError::Timeout {
                    id,
                    elapsed_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> TransportResult<()> {
        let notification = JsonRpcNotification::new(method, params);
        let text = serde_json::to_string(&notification)?;
        self.write_tx
            .send(Message::text(text))
            .map_err(|_| TransportError::ConnectionClosed("writer task has shut down".to_string()))
    }

    fn state(&self) -> ClientState {
        self.state.get()
    }

    async fn stop(&self) {
        self.waiters.fail_all("client stopped");
        self.state.set(ClientState::Stopped);
        let _ = self.write_tx.send(Message::Close(None));
    }
}
