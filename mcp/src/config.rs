//! Config normaliser (spec §4.K): registry files accept either
//! `mcpServers` (Claude-Desktop-style name -> command map) or `servers`
//! (our own `ServerConfig` list) as the top-level key; defaults are
//! filled in for anything the source omits.

use std::collections::HashMap;

use serde_json::Value;
use skillflow_storage::model::{ServerConfig, TransportConfig};

/// Normalises a raw config document (already parsed from JSON or YAML)
/// into the storage crate's `ServerConfig` shape. A server missing a
/// `command` (in `mcpServers` form) is skipped with a warning rather than
/// failing the whole load (spec §6).
pub fn normalize_config(raw: &Value) -> Vec<ServerConfig> {
    if let Some(map) = raw.get("mcpServers").and_then(Value::as_object) {
        return map
            .iter()
            .filter_map(|(name, cfg)| normalize_mcp_server_entry(name, cfg))
            .collect();
    }
    if let Some(list) = raw.get("servers").and_then(Value::as_array) {
        return list
            .iter()
            .filter_map(|entry| match serde_json::from_value::<ServerConfig>(entry.clone()) {
                Ok(cfg) => Some(fill_defaults(cfg)),
                Err(e) => {
                    tracing::warn!(error = %e, entry = %entry, "skipping malformed server registry entry");
                    None
                }
            })
            .collect();
    }
    Vec::new()
}

fn fill_defaults(mut cfg: ServerConfig) -> ServerConfig {
    if cfg.name.is_empty() {
        cfg.name = cfg.server_id.clone();
    }
    cfg
}

fn normalize_mcp_server_entry(name: &str, cfg: &Value) -> Option<ServerConfig> {
    let Some(command) = cfg.get("command").and_then(Value::as_str) else {
        tracing::warn!(server = name, "server config missing `command`, skipping");
        return None;
    };
    let args = cfg
        .get("args")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    let env: HashMap<String, String> = cfg
        .get("env")
        .and_then(Value::as_object)
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default();
    let enabled = cfg.get("enabled").and_then(Value::as_bool).unwrap_or(true);
    let tools = cfg.get("tools").and_then(Value::as_array).map(|a| {
        a.iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    });

    Some(ServerConfig {
        server_id: name.to_string(),
        name: name.to_string(),
        transport: TransportConfig::Stdio {
            command: command.to_string(),
            args,
            env,
        },
        enabled,
        metadata: HashMap::new(),
        tools,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mcp_servers_form_fills_defaults() {
        let raw = serde_json::json!({
            "mcpServers": {
                "fs": { "command": "mcp-server-fs", "args": ["--root", "/tmp"] }
            }
        });
        let servers = normalize_config(&raw);
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].server_id, "fs");
        assert!(servers[0].enabled);
    }

    #[test]
    fn missing_command_is_skipped() {
        let raw = serde_json::json!({
            "mcpServers": {
                "broken": { "args": [] }
            }
        });
        assert!(normalize_config(&raw).is_empty());
    }

    #[test]
    fn servers_list_form_round_trips() {
        let raw = serde_json::json!({
            "servers": [{
                "server_id": "srv1",
                "name": "srv1",
                "transport": "stdio",
                "command": "echo",
            }]
        });
        let servers = normalize_config(&raw);
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].server_id, "srv1");
    }
}
