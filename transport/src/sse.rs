use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value;

use crate::client::{
    ClientState, DefaultServerRequestHandler, InitializeOutcome, ServerRequestHandler, StateCell,
    TransportClient,
};
use crate::error::{TransportError, TransportResult};
use crate::message::{
    InboundMessage, JsonRpcNotification, JsonRpcRequest, MCP_PROTOCOL_VERSION,
};
use crate::waiters::{into_transport_error, WaiterTable};

/// HTTP+SSE transport (§4.A): requests are POSTed; server-originated
/// messages (including responses) arrive as `data:`-prefixed lines on a
/// long-lived GET.
pub struct SseTransport {
    url: String,
    http: reqwest::Client,
    token: Option<String>,
    headers: HashMap<String, String>,
    state: StateCell,
    waiters: Arc<WaiterTable>,
    handler: Arc<dyn ServerRequestHandler>,
    client_name: String,
    client_version: String,
}

impl SseTransport {
    pub fn new(
        url: impl Into<String>,
        token: Option<String>,
        headers: HashMap<String, String>,
        client_name: impl Into<String>,
        client_version: impl Into<String>,
    ) -> Arc<Self> {
        Self::with_handler(
            url,
            token,
            headers,
            client_name,
            client_version,
            Arc::new(DefaultServerRequestHandler),
        )
    }

    pub fn with_handler(
        url: impl Into<String>,
        token: Option<String>,
        headers: HashMap<String, String>,
        client_name: impl Into<String>,
        client_version: impl Into<String>,
        handler: Arc<dyn ServerRequestHandler>,
    ) -> Arc<Self> {
        let transport = Arc::new(Self {
            url: url.into(),
            http: reqwest::Client::new(),
            token,
            headers,
            state: StateCell::new(ClientState::Init),
            waiters: Arc::new(WaiterTable::new()),
            handler,
            client_name: client_name.into(),
            client_version: client_version.into(),
        });
        transport.clone().spawn_event_loop();
        transport
    }

    fn apply_headers(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let mut builder = builder;
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        for (k, v) in &self.headers {
            builder = builder.header(k, v);
        }
        builder
    }

    fn spawn_event_loop(self: Arc<Self>) {
        tokio::spawn(async move {
            let request = self.apply_headers(
                self.http.get(&self.url).header("accept", "text/event-stream"),
            );
            let response = match request.send().await {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to open SSE stream");
                    self.state.set(ClientState::Stopped);
                    self.waiters.fail_all("failed to open SSE stream");
                    return;
                }
            };
            let mut stream = response.bytes_stream();
            let mut buffer = String::new();
            let mut data_buf = String::new();
            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        tracing::warn!(error = %e, "SSE stream read error");
                        break;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(pos) = buffer.find('\n') {
                    let line = buffer[..pos].trim_end_matches('\r').to_string();
                    buffer.drain(..=pos);
                    if line.is_empty() {
                        if !data_buf.is_empty() {
                            self.handle_event(&data_buf).await;
                            data_buf.clear();
                        }
                        continue;
                    }
                    if let Some(rest) = line.strip_prefix("data:") {
                        if !data_buf.is_empty() {
                            data_buf.push('\n');
                        }
                        data_buf.push_str(rest.trim_start());
                    }
                }
            }
            self.state.set(ClientState::Stopped);
            self.waiters.fail_all("SSE stream closed");
        });
    }

    async fn handle_event(&self, data: &str) {
        let envelope: crate::message::InboundEnvelope = match serde_json::from_str(data) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, data = %data, "skipping malformed SSE event");
                return;
            }
        };
        match envelope.classify() {
            InboundMessage::Response { id, outcome } => self.waiters.resolve(id, outcome),
            InboundMessage::Notification { method, .. } => {
                tracing::debug!(method = %method, "notification from upstream (sse)");
            }
            InboundMessage::ServerRequest { method, .. } => {
                tracing::debug!(method = %method, "server-initiated request over SSE ignored (no reverse channel configured)");
            }
            InboundMessage::Invalid(reason) => {
                tracing::warn!(reason = %reason, "invalid SSE event");
            }
        }
    }
}

#[async_trait]
impl TransportClient for SseTransport {
    async fn start(&self, timeout: Duration) -> TransportResult<InitializeOutcome> {
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
        let post = self.apply_headers(self.http.post(&self.url).json(&request));
        if let Err(e) = post.send().await {
            self.waiters.cancel(id);
            return Err(TransportError::Http(e));
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
        let post = self.apply_headers(self.http.post(&self.url).json(&notification));
        post.send().await.map(|_| ()).map_err(TransportError::Http)
    }

    fn state(&self) -> ClientState {
        self.state.get()
    }

    async fn stop(&self) {
        self.waiters.fail_all("client stopped");
        self.state.set(ClientState::Stopped);
    }
}
