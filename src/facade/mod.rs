//! The façade (spec §4.J): publishes local management tools, skill
//! tools, and proxied upstream tools to a downstream caller, and
//! dispatches incoming calls across the three.

pub mod catalogue;
pub mod content;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::{json, Value};
use skillflow_engine::Engine;
use skillflow_mcp::ClientManager;
use skillflow_recording::RecordingManager;
use skillflow_skills::SkillManager;
use skillflow_storage::Storage;

use crate::audit::AuditLog;
use crate::error::{SkillFlowError, SkillFlowResult};
use crate::metrics;
use content::ContentBlock;

pub const SKILL_TOOL_PREFIX: &str = "skill__";

#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolCallResponse {
    pub content: Vec<ContentBlock>,
    #[serde(rename = "isError")]
    pub is_error: bool,
}

impl ToolCallResponse {
    fn ok(value: Value) -> Self {
        Self { content: content::to_content(value), is_error: false }
    }

    fn err(message: impl Into<String>) -> Self {
        Self { content: content::text(message), is_error: true }
    }
}

pub struct Facade {
    storage: Arc<Storage>,
    mcp: Arc<ClientManager>,
    skills: Arc<SkillManager>,
    recording: Arc<RecordingManager>,
    engine: Arc<Engine>,
    audit: Arc<dyn AuditLog>,
}

impl Facade {
    pub fn new(
        storage: Arc<Storage>,
        mcp: Arc<ClientManager>,
        skills: Arc<SkillManager>,
        recording: Arc<RecordingManager>,
        engine: Arc<Engine>,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        Self { storage, mcp, skills, recording, engine, audit }
    }

    /// Tool-list assembly (spec §4.J): management catalogue, then every
    /// stored skill, then every enabled server's tools discovered in
    /// parallel with per-server timeouts — cached as one compiled unit
    /// until a contributing skill changes or the TTL lapses.
    pub async fn list_tools(&self) -> Vec<ToolDescriptor> {
        if let Some(cached) = self.storage.tool_list_cache().get() {
            return cached.into_iter().filter_map(|v| serde_json::from_value(v).ok()).collect();
        }

        let mut tools: Vec<Value> = Vec::new();
        let mut contributing_skill_ids = HashSet::new();

        for tool in catalogue::TOOLS {
            tools.push(catalogue::descriptor(tool));
        }

        for meta in self.storage.list_skill_metas() {
            match self.storage.load_skill(&meta.id, None).await {
                Ok(skill) => {
                    tools.push(SkillManager::export_as_tool_descriptor(&skill));
                    contributing_skill_ids.insert(meta.id.clone());
                }
                Err(e) => {
                    tracing::warn!(skill_id = %meta.id, error = %e, "skipping skill with unreadable current version");
                }
            }
        }

        let servers = self.mcp.list_servers();
        let server_names: std::collections::HashMap<String, String> =
            servers.iter().map(|s| (s.server_id.clone(), s.name.clone())).collect();
        for discovered in self.mcp.discover_all().await {
            let name = server_names.get(&discovered.server_id).cloned().unwrap_or_else(|| discovered.server_id.clone());
            let description = discovered
                .descriptor
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("");
            tools.push(json!({
                "name": discovered.proxy_name,
                "description": format!("[{name}] {description}"),
                "inputSchema": discovered.descriptor.get("inputSchema").cloned().unwrap_or(json!({"type": "object"})),
            }));
        }

        self.storage.tool_list_cache().set(tools.clone(), contributing_skill_ids);
        tools.into_iter().filter_map(|v| serde_json::from_value(v).ok()).collect()
    }

    /// Dispatch order (spec §4.J): `skill__` prefix, then a proxy name,
    /// then an exact match against the management catalogue. Anything
    /// else is a user-visible "unknown tool" response, never an
    /// exception — callers get a normal tool result with `isError`.
    pub async fn call_tool(&self, actor: &str, name: &str, args: Value) -> ToolCallResponse {
        self.audit.record(actor, "call_tool", json!({"name": name, "args": &args})).await;
        let result = self.dispatch(name, args).await;
        match result {
            Ok(value) => ToolCallResponse::ok(value),
            Err(e) => {
                tracing::warn!(tool = name, error = %e, "tool call failed");
                ToolCallResponse::err(e.user_message())
            }
        }
    }

    async fn dispatch(&self, name: &str, args: Value) -> SkillFlowResult<Value> {
        if let Some(skill_id) = name.strip_prefix(SKILL_TOOL_PREFIX) {
            return self.run_skill_tool(skill_id, args).await;
        }

        if let Some((server_id, tool)) = self.mcp.resolve_proxy_name(name) {
            let started = Instant::now();
            let result = self.mcp.call_tool(&server_id, &tool, Some(args)).await;
            metrics::record_tool_call(&server_id, &tool, started.elapsed(), result.is_ok());
            return Ok(result?);
        }

        if catalogue::is_management_tool(name) {
            return catalogue::handle(
                name,
                args,
                catalogue::Deps {
                    storage: &self.storage,
                    mcp: &self.mcp,
                    skills: &self.skills,
                    recording: &self.recording,
                    engine: &self.engine,
                },
            )
            .await;
        }

        Err(SkillFlowError::UnknownTool(name.to_string()))
    }

    async fn run_skill_tool(&self, skill_id: &str, inputs: Value) -> SkillFlowResult<Value> {
        let skill = self.storage.load_skill(skill_id, None).await?;
        let run = self.engine.run_skill(skill, inputs).await;
        let status = match &run {
            Ok(result) => format!("{:?}", result.status),
            Err(_) => "error".to_string(),
        };
        metrics::record_skill_run(skill_id, &status);
        Ok(serde_json::to_value(run?)?)
    }
}
