use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::client::{
    ClientState, DefaultServerRequestHandler, InitializeOutcome, ServerRequestHandler, StateCell,
    TransportClient,
};
use crate::error::{TransportError, TransportResult};
use crate::message::{
    InboundMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, INVALID_REQUEST_CODE,
    MCP_PROTOCOL_VERSION,
};
use crate::waiters::{into_transport_error, WaiterTable};

/// Grace period given to the subprocess to exit on its own after stdin
/// is closed, before a kill signal is sent (§4.A: "gracefully, then
/// forcibly after a grace period").
const GRACEFUL_STOP_TIMEOUT: Duration = Duration::from_secs(3);

/// One subprocess upstream MCP server, framed one JSON object per line on
/// stdout/stdin (§4.A). The reader task owns the sender half of every
/// pending waiter; callers own the receiver.
pub struct StdioTransport {
    state: StateCell,
    waiters: Arc<WaiterTable>,
    write_tx: mpsc::UnboundedSender<String>,
    /// Closes the writer task's stdin handle on `stop()`, giving the
    /// child a chance to exit before it is killed. `None` once used.
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    child: Mutex<Option<Child>>,
    handler: Arc<dyn ServerRequestHandler>,
    client_name: String,
    client_version: String,
}

impl StdioTransport {
    pub async fn spawn(
        command: &str,
        args: &[String],
        envs: &HashMap<String, String>,
        client_name: impl Into<String>,
        client_version: impl Into<String>,
    ) -> TransportResult<Arc<Self>> {
        Self::spawn_with_handler(
            command,
            args,
            envs,
            client_name,
            client_version,
            Arc::new(DefaultServerRequestHandler),
        )
        .await
    }

    pub async fn spawn_with_handler(
        command: &str,
        args: &[String],
        envs: &HashMap<String, String>,
        client_name: impl Into<String>,
        client_version: impl Into<String>,
        handler: Arc<dyn ServerRequestHandler>,
    ) -> TransportResult<Arc<Self>> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(envs)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;
        let stdin = child.stdin.take().ok_or_else(|| {
            TransportError::Handshake("child process has no stdin".to_string())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            TransportError::Handshake("child process has no stdout".to_string())
        })?;
        let stderr = child.stderr.take();

        let waiters = Arc::new(WaiterTable::new());
        let (write_tx, mut write_rx) = mpsc::unbounded_channel::<String>();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let transport = Arc::new(Self {
            state: StateCell::new(ClientState::Init),
            waiters: waiters.clone(),
            write_tx,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            child: Mutex::new(Some(child)),
            handler,
            client_name: client_name.into(),
            client_version: client_version.into(),
        });

        // Writer task: serialize outgoing frames to the child's stdin.
        // Exits (and drops `stdin`, closing the pipe) either when the
        // channel closes or when `stop()` signals a graceful shutdown.
        tokio::spawn(async move {
            let mut stdin = stdin;
            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    line = write_rx.recv() => {
                        let Some(line) = line else { break };
                        if stdin.write_all(line.as_bytes()).await.is_err() {
                            break;
                        }
                        if stdin.write_all(b"\n").await.is_err() {
                            break;
                        }
                        if stdin.flush().await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        // Reader task: classify every inbound line per §4.A routing rule.
        let reader_transport = transport.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        reader_transport.handle_inbound_line(&line).await;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "stdio transport read error, offending line skipped");
                        continue;
                    }
                }
            }
            reader_transport.state.set(ClientState::Stopped);
            reader_transport.waiters.fail_all("subprocess stdout closed");
        });

        if let Some(stderr) = stderr {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(stderr = %line, "upstream stderr");
                }
            });
        }

        Ok(transport)
    }

    async fn handle_inbound_line(&self, line: &str) {
        let envelope: crate::message::InboundEnvelope = match serde_json::from_str(line) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, line = %line, "skipping malformed inbound line");
                return;
            }
        };

        match envelope.classify() {
            InboundMessage::Response { id, outcome } => {
                self.waiters.resolve(id, outcome);
            }
            InboundMessage::Notification { method, .. } => {
                tracing::debug!(method = %method, "notification from upstream");
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
                        let _ = write_tx.send(text);
                    }
                });
            }
            InboundMessage::Invalid(reason) => {
                tracing::warn!(reason = %reason, "invalid inbound message");
                let response =
                    JsonRpcResponse::error(Value::Null, INVALID_REQUEST_CODE, reason);
                if let Ok(text) = serde_json::to_string(&response) {
                    let _ = self.write_tx.send(text);
                }
            }
        }
    }
}

#[async_trait]
impl TransportClient for StdioTransport {
    async fn start(&self, timeout: Duration) -> TransportResult<InitializeOutcome> {
        self.state.set(ClientState::Starting);
        let init_params = serde_json::json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "clientInfo": { "name": self.client_name, "version": self.client_version },
            "capabilities": { "roots": { "listChanged": true }, "sampling": {} },
        });
        let result = self.call("initialize", Some(init_params), timeout).await;
        let result = match result {
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
        let text = serde_json::to_string(&request)?;
        if self.write_tx.send(text).is_err() {
            self.waiters.cancel(id);
            return Err(TransportError::ConnectionClosed(
                "writer task has shut down".to_string(),
            ));
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
            .send(text)
            .map_err(|_| TransportError::ConnectionClosed("writer task has shut down".to_string()))
    }

    fn state(&self) -> ClientState {
        self.state.get()
    }

    async fn stop(&self) {
        self.waiters.fail_all("client stopped");
        self.state.set(ClientState::Stopped);

        // Graceful: close stdin so a well-behaved server sees EOF and
        // exits on its own.
        if let Some(tx) = self.shutdown_tx.lock().await.take() {
            let _ = tx.send(());
        }

        let mut guard = self.child.lock().await;
        if let Some(mut child) = guard.take() {
            if let Some(id) = child.id() {
                tracing::debug!(pid = id, "stopping stdio transport subprocess");
            }
            match tokio::time::timeout(GRACEFUL_STOP_TIMEOUT, child.wait()).await {
                Ok(_) => return,
                Err(_) => {
                    tracing::debug!("subprocess did not exit after stdin close, sending kill signal");
                }
            }

            // Forceful: the grace period elapsed, kill it outright.
            let _ = child.start_kill();
            if tokio::time::timeout(Duration::from_secs(5), child.wait()).await.is_err() {
                tracing::warn!("subprocess did not exit within grace period after kill signal");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawn_and_stop_nonexistent_command_fails_fast() {
        let result = StdioTransport::spawn(
            "definitely-not-a-real-binary-xyz",
            &[],
            &HashMap::new(),
            "skillflow",
            "0.1.0",
        )
        .await;
        assert!(result.is_err());
    }
}
