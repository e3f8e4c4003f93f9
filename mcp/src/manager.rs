//! Client manager (spec §4.B): a supervised pool of upstream MCP
//! connections, one [`TransportClient`] per registered server, dialed
//! lazily and reused until the transport reports itself disconnected.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoffBuilder;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use skillflow_storage::model::{ServerConfig, TransportConfig};
use skillflow_transport::{
    ClientState, SseTransport, StdioTransport, TransportClient, WebSocketTransport,
};

use crate::error::{McpError, McpResult};
use crate::naming::ProxyNaming;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(15);
const PROXY_NAME_MAX_LEN: usize = 60;

/// The recording tap (spec §1, §4.F): "every upstream call, whether
/// direct or engine-mediated, passes through an optional recording tap
/// that appends to the active session." Wiring it in here, at the single
/// chokepoint every call path shares, means neither the façade's direct
/// proxy dispatch nor the execution engine's tool-call nodes need to
/// know recording exists.
#[async_trait]
pub trait CallTap: Send + Sync {
    async fn tap(
        &self,
        server_id: &str,
        tool: &str,
        args: &Value,
        result: &McpResult<Value>,
        duration_ms: u64,
    );
}

struct ServerHandle {
    config: ServerConfig,
    client: RwLock<Option<Arc<dyn TransportClient>>>,
}

/// One discovered upstream tool, named under the outer proxy scheme.
#[derive(Debug, Clone)]
pub struct DiscoveredTool {
    pub server_id: String,
    pub proxy_name: String,
    pub descriptor: Value,
}

pub struct ClientManager {
    servers: DashMap<String, Arc<ServerHandle>>,
    naming: ProxyNaming,
    client_name: String,
    client_version: String,
    tap: RwLock<Option<Arc<dyn CallTap>>>,
}

impl ClientManager {
    pub fn new(client_name: impl Into<String>, client_version: impl Into<String>) -> Self {
        Self {
            servers: DashMap::new(),
            naming: ProxyNaming::new(),
            client_name: client_name.into(),
            client_version: client_version.into(),
            tap: RwLock::new(None),
        }
    }

    /// Installs the recording tap. Idempotent; the most recent call wins.
    pub fn set_tap(&self, tap: Arc<dyn CallTap>) {
        *self.tap.write() = Some(tap);
    }

    pub fn register(&self, config: ServerConfig) {
        let server_id = config.server_id.clone();
        self.servers.insert(
            server_id,
            Arc::new(ServerHandle {
                config,
                client: RwLock::new(None),
            }),
        );
    }

    pub async fn unregister(&self, server_id: &str) -> McpResult<()> {
        let (_, handle) = self
            .servers
            .remove(server_id)
            .ok_or_else(|| McpError::NotRegistered(server_id.to_string()))?;
        let client = handle.client.read().clone();
        if let Some(client) = client {
            client.stop().await;
        }
        Ok(())
    }

    pub fn list_servers(&self) -> Vec<ServerConfig> {
        self.servers.iter().map(|e| e.config.clone()).collect()
    }

    pub fn server_config(&self, server_id: &str) -> Option<ServerConfig> {
        self.servers.get(server_id).map(|e| e.config.clone())
    }

    /// Lazily dials a server, reusing the existing client while it
    /// reports `Connected`. Idempotent: concurrent callers converge on
    /// the same connection attempt's result via the handle's lock.
    async fn connect_server(&self, server_id: &str) -> McpResult<Arc<dyn TransportClient>> {
        let handle = self
            .servers
            .get(server_id)
            .map(|e| e.clone())
            .ok_or_else(|| McpError::NotRegistered(server_id.to_string()))?;

        if !handle.config.enabled {
            return Err(McpError::Disabled(server_id.to_string()));
        }

        if let Some(client) = handle.client.read().clone() {
            if client.state() == ClientState::Connected {
                return Ok(client);
            }
        }

        let client = self.dial_with_retry(&handle.config).await?;
        *handle.client.write() = Some(client.clone());
        Ok(client)
    }

    async fn dial_with_retry(&self, config: &ServerConfig) -> McpResult<Arc<dyn TransportClient>> {
        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(200))
            .with_max_interval(Duration::from_secs(5))
            .with_max_elapsed_time(Some(Duration::from_secs(30)))
            .build();
        let config = config.clone();

        retry(backoff, || async {
            self.dial_once(&config).await.map_err(|e| match &e {
                McpError::Config(_) | McpError::Disabled(_) => backoff::Error::permanent(e),
                _ => backoff::Error::transient(e),
            })
        })
        .await
    }

    async fn dial_once(&self, config: &ServerConfig) -> McpResult<Arc<dyn TransportClient>> {
        let client: Arc<dyn TransportClient> = match &config.transport {
            TransportConfig::Stdio { command, args, env } => {
                StdioTransport::spawn(command, args, env, &self.client_name, &self.client_version)
                    .await?
            }
            TransportConfig::HttpSse { url, headers } | TransportConfig::StreamableHttp { url, headers } => {
                SseTransport::new(
                    url.clone(),
                    None,
                    headers.clone(),
                    &self.client_name,
                    &self.client_version,
                )
            }
            TransportConfig::WebSocket { url, .. } => {
                WebSocketTransport::connect(url.clone(), &self.client_name, &self.client_version)
                    .await?
            }
        };
        client.start(DEFAULT_CONNECT_TIMEOUT).await?;
        Ok(client)
    }

    pub async fn disconnect_server(&self, server_id: &str) -> McpResult<()> {
        let handle = self
            .servers
            .get(server_id)
            .map(|e| e.clone())
            .ok_or_else(|| McpError::NotRegistered(server_id.to_string()))?;
        let client = handle.client.write().take();
        if let Some(client) = client {
            client.stop().await;
        }
        Ok(())
    }

    pub async fn close_all(&self) {
        for entry in self.servers.iter() {
            if let Some(client) = entry.client.write().take() {
                client.stop().await;
            }
        }
    }

    /// Lists an upstream's raw `tools/list` result, filtered through the
    /// server's `tools` allow-list if one is configured.
    pub async fn list_tools(&self, server_id: &str) -> McpResult<Vec<Value>> {
        let client = self.connect_server(server_id).await?;
        let result = client.call("tools/list", None, DEFAULT_CALL_TIMEOUT).await?;
        let tools = result
            .get("tools")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let allow = self.server_config(server_id).and_then(|c| c.tools);
        Ok(match allow {
            Some(allow) => tools
                .into_iter()
                .filter(|t| {
                    t.get("name")
                        .and_then(Value::as_str)
                        .is_some_and(|name| allow.iter().any(|a| a == name))
                })
                .collect(),
            None => tools,
        })
    }

    /// Runs `tools/list` against every enabled server concurrently, each
    /// bounded by its own timeout; a server that fails or times out is
    /// skipped rather than failing the whole discovery pass (spec §6).
    pub async fn discover_all(&self) -> Vec<DiscoveredTool> {
        let server_ids: Vec<String> = self
            .servers
            .iter()
            .filter(|e| e.config.enabled)
            .map(|e| e.config.server_id.clone())
            .collect();

        let futures = server_ids.into_iter().map(|server_id| async move {
            let outcome =
                tokio::time::timeout(DEFAULT_DISCOVERY_TIMEOUT, self.list_tools(&server_id)).await;
            match outcome {
                Ok(Ok(tools)) => tools
                    .into_iter()
                    .filter_map(|descriptor| {
                        let tool_name = descriptor.get("name").and_then(Value::as_str)?;
                        let proxy_name =
                            self.naming.generate(&server_id, tool_name, PROXY_NAME_MAX_LEN);
                        Some(DiscoveredTool {
                            server_id: server_id.clone(),
                            proxy_name,
                            descriptor,
                        })
                    })
                    .collect::<Vec<_>>(),
                Ok(Err(e)) => {
                    tracing::warn!(server_id, error = %e, "tool discovery failed");
                    Vec::new()
                }
                Err(_) => {
                    tracing::warn!(server_id, "tool discovery timed out; disconnecting server");
                    if let Err(e) = self.disconnect_server(&server_id).await {
                        tracing::warn!(server_id, error = %e, "failed to disconnect timed-out server");
                    }
                    Vec::new()
                }
            }
        });

        futures::future::join_all(futures).await.into_iter().flatten().collect()
    }

    pub async fn call_tool(&self, server_id: &str, tool: &str, args: Option<Value>) -> McpResult<Value> {
        let started = std::time::Instant::now();
        let args = args.unwrap_or(Value::Null);
        let result = async {
            let client = self.connect_server(server_id).await?;
            let params = serde_json::json!({ "name": tool, "arguments": &args });
            client.call("tools/call", Some(params), DEFAULT_CALL_TIMEOUT).await.map_err(McpError::from)
        }
        .await;

        if let Some(tap) = self.tap.read().clone() {
            tap.tap(server_id, tool, &args, &result, started.elapsed().as_millis() as u64).await;
        }
        result
    }

    pub async fn list_prompts(&self, server_id: &str) -> McpResult<Value> {
        let client = self.connect_server(server_id).await?;
        client.call("prompts/list", None, DEFAULT_CALL_TIMEOUT).await.map_err(McpError::from)
    }

    pub async fn get_prompt(&self, server_id: &str, name: &str, args: Option<Value>) -> McpResult<Value> {
        let client = self.connect_server(server_id).await?;
        let params = serde_json::json!({ "name": name, "arguments": args.unwrap_or(Value::Null) });
        client.call("prompts/get", Some(params), DEFAULT_CALL_TIMEOUT).await.map_err(McpError::from)
    }

    pub async fn list_resources(&self, server_id: &str) -> McpResult<Value> {
        let client = self.connect_server(server_id).await?;
        client.call("resources/list", None, DEFAULT_CALL_TIMEOUT).await.map_err(McpError::from)
    }

    pub async fn read_resource(&self, server_id: &str, uri: &str) -> McpResult<Value> {
        let client = self.connect_server(server_id).await?;
        let params = serde_json::json!({ "uri": uri });
        client.call("resources/read", Some(params), DEFAULT_CALL_TIMEOUT).await.map_err(McpError::from)
    }

    /// Parses a proxy-named tool back to `(server_id, tool)`, resolving
    /// hash aliases recorded during the last `discover_all` pass.
    pub fn resolve_proxy_name(&self, proxy_name: &str) -> Option<(String, String)> {
        use crate::naming::ParsedProxyName;
        match self.naming.parse(proxy_name)? {
            ParsedProxyName::Compact { server_id, tool } | ParsedProxyName::Legacy { server_id, tool } => {
                Some((server_id, tool))
            }
            ParsedProxyName::Hash { hash_prefix, tool } => {
                let server_id = self.naming.resolve_hash(&hash_prefix)?;
                Some((server_id, tool))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn stdio_config(server_id: &str) -> ServerConfig {
        ServerConfig {
            server_id: server_id.to_string(),
            name: server_id.to_string(),
            transport: TransportConfig::Stdio {
                command: "definitely-not-a-real-binary-xyz".to_string(),
                args: Vec::new(),
                env: HashMap::new(),
            },
            enabled: true,
            metadata: HashMap::new(),
            tools: None,
        }
    }

    #[tokio::test]
    async fn calling_unregistered_server_fails_fast() {
        let manager = ClientManager::new("skillflow", "0.1.0");
        let result = manager.call_tool("missing", "sum", None).await;
        assert!(matches!(result, Err(McpError::NotRegistered(_))));
    }

    #[tokio::test]
    async fn disabled_server_is_rejected_without_dialing() {
        let manager = ClientManager::new("skillflow", "0.1.0");
        let mut cfg = stdio_config("srv1");
        cfg.enabled = false;
        manager.register(cfg);
        let result = manager.list_tools("srv1").await;
        assert!(matches!(result, Err(McpError::Disabled(_))));
    }

    #[tokio::test]
    async fn unregister_unknown_server_is_an_error() {
        let manager = ClientManager::new("skillflow", "0.1.0");
        assert!(manager.unregister("ghost").await.is_err());
    }
}
