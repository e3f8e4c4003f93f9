//! Façade configuration (spec §4.K ambient concern): CLI-overridable
//! settings plus the import/export subcommands that push a registry
//! file through [`skillflow_mcp::normalize_config`].

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use serde_json::Value;
use skillflow_mcp::ClientManager;

use crate::error::SkillFlowResult;

#[derive(Debug, Clone, Args)]
pub struct AppConfig {
    /// Directory skills, sessions, runs, and the server registry are
    /// persisted under.
    #[arg(long, env = "SKILLFLOW_DATA_DIR", default_value = "./skillflow-data")]
    pub data_dir: PathBuf,

    /// Client identity reported to upstream servers during `initialize`.
    #[arg(long, env = "SKILLFLOW_CLIENT_NAME", default_value = "skillflow")]
    pub client_name: String,

    #[arg(long, env = "SKILLFLOW_CLIENT_VERSION", default_value = env!("CARGO_PKG_VERSION"))]
    pub client_version: String,

    #[arg(long, env = "SKILLFLOW_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit newline-delimited JSON logs instead of the human-readable
    /// format; set this in production deployments.
    #[arg(long, env = "SKILLFLOW_LOG_JSON")]
    pub log_json: bool,

    /// Bind address for the Prometheus `/metrics` endpoint. Unset
    /// disables the exporter entirely.
    #[arg(long, env = "SKILLFLOW_METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,
}

impl AppConfig {
    pub fn audit_log_path(&self) -> PathBuf {
        self.data_dir.join("audit.jsonl")
    }

    pub fn init_tracing(&self) {
        let filter = tracing_subscriber::EnvFilter::try_new(&self.log_level)
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
        if self.log_json {
            subscriber.json().init();
        } else {
            subscriber.init();
        }
    }
}

/// Reads a JSON or YAML config document, normalises it, and registers
/// every resulting server (spec §4.K).
pub async fn import_servers(path: &Path, mcp: &Arc<ClientManager>) -> SkillFlowResult<usize> {
    let raw = tokio::fs::read_to_string(path).await?;
    let doc: Value = parse_document(&raw)?;
    let servers = skillflow_mcp::normalize_config(&doc);
    let count = servers.len();
    for server in servers {
        mcp.register(server);
    }
    Ok(count)
}

/// Writes every currently registered server back out as a `servers`
/// document, in the native (non-Claude-Desktop) shape.
pub async fn export_servers(path: &Path, mcp: &Arc<ClientManager>) -> SkillFlowResult<()> {
    let servers = mcp.list_servers();
    let doc = serde_json::json!({ "servers": servers });
    let body = if path.extension().and_then(|e| e.to_str()) == Some("yaml") {
        serde_yaml::to_string(&doc)?
    } else {
        serde_json::to_string_pretty(&doc)?
    };
    tokio::fs::write(path, body).await?;
    Ok(())
}

fn parse_document(raw: &str) -> SkillFlowResult<Value> {
    if let Ok(value) = serde_json::from_str(raw) {
        return Ok(value);
    }
    Ok(serde_yaml::from_str(raw)?)
}
