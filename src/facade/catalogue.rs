//! The fixed management tool catalogue (spec §4.I): "recording
//! start/stop/list, skill create/list/get/delete, run status/cancel,
//! server register/list, and debug probes."

use std::sync::Arc;

use serde_json::{json, Value};
use skillflow_engine::Engine;
use skillflow_mcp::ClientManager;
use skillflow_recording::RecordingManager;
use skillflow_skills::{SkillFilter, SkillManager, SkillUpdate};
use skillflow_storage::model::{Author, ServerConfig, TransportConfig};
use skillflow_storage::Storage;

use crate::error::{SkillFlowError, SkillFlowResult};

pub struct ManagementTool {
    pub name: &'static str,
    pub description: &'static str,
}

/// Descriptors exposed to `list_tools`. Input schemas are intentionally
/// loose (`{"type": "object"}`): the handlers below validate shape, the
/// downstream caller doesn't need to replicate that validation.
pub const TOOLS: &[ManagementTool] = &[
    ManagementTool { name: "start_recording", description: "Start a new recording session." },
    ManagementTool { name: "stop_recording", description: "Seal and persist an active recording session." },
    ManagementTool { name: "list_recordings", description: "List currently active recording session ids." },
    ManagementTool { name: "create_skill", description: "Create a skill, either from a graph or projected from a recorded session." },
    ManagementTool { name: "list_skills", description: "List stored skills, optionally filtered." },
    ManagementTool { name: "get_skill", description: "Fetch a stored skill by id and optional version." },
    ManagementTool { name: "update_skill", description: "Update a skill, writing a new version." },
    ManagementTool { name: "delete_skill", description: "Delete a skill, soft by default." },
    ManagementTool { name: "get_run_status", description: "Fetch a skill run's current status and outputs." },
    ManagementTool { name: "cancel_run", description: "Request cancellation of an in-flight skill run." },
    ManagementTool { name: "register_server", description: "Register an upstream MCP server." },
    ManagementTool { name: "unregister_server", description: "Unregister and disconnect an upstream MCP server." },
    ManagementTool { name: "list_servers", description: "List registered upstream MCP servers." },
    ManagementTool { name: "debug_ping", description: "Liveness probe; echoes back a timestamp." },
    ManagementTool { name: "debug_echo", description: "Echoes the given arguments back unchanged." },
];

pub fn descriptor(tool: &ManagementTool) -> Value {
    json!({
        "name": tool.name,
        "description": tool.description,
        "inputSchema": {"type": "object"},
    })
}

pub fn is_management_tool(name: &str) -> bool {
    TOOLS.iter().any(|t| t.name == name)
}

pub struct Deps<'a> {
    pub storage: &'a Arc<Storage>,
    pub mcp: &'a Arc<ClientManager>,
    pub skills: &'a Arc<SkillManager>,
    pub recording: &'a Arc<RecordingManager>,
    pub engine: &'a Arc<Engine>,
}

fn arg_str(args: &Value, key: &str) -> SkillFlowResult<String> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| SkillFlowError::InvalidRequest(format!("missing required argument `{key}`")))
}

fn author_from_args(args: &Value) -> Author {
    Author {
        workspace_id: args.get("workspace_id").and_then(Value::as_str).unwrap_or("default").to_string(),
        client_id: args.get("client_id").and_then(Value::as_str).unwrap_or("unknown").to_string(),
    }
}

pub async fn handle(name: &str, args: Value, deps: Deps<'_>) -> SkillFlowResult<Value> {
    match name {
        "start_recording" => {
            let client_id = args.get("client_id").and_then(Value::as_str).unwrap_or("unknown");
            let workspace_id = args.get("workspace_id").and_then(Value::as_str).unwrap_or("default");
            let metadata = args.get("metadata").and_then(Value::as_object).cloned().unwrap_or_default();
            let session_id = deps.recording.start(client_id, workspace_id, metadata.into_iter().collect());
            Ok(json!({ "session_id": session_id }))
        }
        "stop_recording" => {
            let session_id = arg_str(&args, "session_id")?;
            let session = deps.recording.stop(&session_id).await?;
            Ok(serde_json::to_value(session)?)
        }
        "list_recordings" => Ok(json!({ "session_ids": deps.recording.list_active_sessions() })),

        "create_skill" => {
            let id = arg_str(&args, "id")?;
            let name_ = arg_str(&args, "name")?;
            let description = args.get("description").and_then(Value::as_str).unwrap_or("").to_string();
            let author = author_from_args(&args);
            let draft = if let Some(session_id) = args.get("source_session_id").and_then(Value::as_str) {
                let session = deps.recording.load_session(session_id).await?;
                let selection = serde_json::from_value(args.get("log_selection").cloned().unwrap_or(json!("all")))
                    .unwrap_or(skillflow_recording::LogSelection::All);
                let exposed: Vec<skillflow_recording::ExposeParamSpec> =
                    serde_json::from_value(args.get("expose_params").cloned().unwrap_or(json!([])))?;
                skillflow_recording::to_skill_draft(&session, selection, exposed)?
            } else {
                serde_json::from_value(args.get("draft").cloned().ok_or_else(|| {
                    SkillFlowError::InvalidRequest("create_skill requires either `source_session_id` or `draft`".into())
                })?)?
            };
            let skill = deps.skills.create_skill(id, name_, description, author, draft).await?;
            Ok(serde_json::to_value(skill)?)
        }
        "list_skills" => {
            let filter: SkillFilter = serde_json::from_value(args).unwrap_or_default();
            Ok(json!({ "skills": deps.skills.list_skills(&filter) }))
        }
        "get_skill" => {
            let id = arg_str(&args, "id")?;
            let version = args.get("version").and_then(Value::as_u64).map(|v| v as u32);
            let skill = deps.storage.load_skill(&id, version).await?;
            Ok(serde_json::to_value(&*skill)?)
        }
        "update_skill" => {
            let id = arg_str(&args, "id")?;
            let update: SkillUpdate = serde_json::from_value(args.get("update").cloned().unwrap_or(json!({})))?;
            let skill = deps.skills.update_skill(&id, update).await?;
            Ok(serde_json::to_value(skill)?)
        }
        "delete_skill" => {
            let id = arg_str(&args, "id")?;
            let hard = args.get("hard").and_then(Value::as_bool).unwrap_or(false);
            deps.storage.delete_skill(&id, hard).await?;
            Ok(json!({ "deleted": id }))
        }

        "get_run_status" => {
            let run_id = arg_str(&args, "run_id")?;
            let result = deps.engine.get_run_status(&run_id).await?;
            Ok(serde_json::to_value(result)?)
        }
        "cancel_run" => {
            let run_id = arg_str(&args, "run_id")?;
            Ok(json!({ "cancelled": deps.engine.cancel_run(&run_id) }))
        }

        "register_server" => {
            let server_id = arg_str(&args, "server_id")?;
            let transport: TransportConfig = serde_json::from_value(args.clone())?;
            let config = ServerConfig {
                server_id: server_id.clone(),
                name: args.get("name").and_then(Value::as_str).unwrap_or(&server_id).to_string(),
                transport,
                enabled: args.get("enabled").and_then(Value::as_bool).unwrap_or(true),
                metadata: args.get("metadata").and_then(Value::as_object).cloned().unwrap_or_default().into_iter().collect(),
                tools: args.get("tools").and_then(Value::as_array).map(|tools| {
                    tools.iter().filter_map(Value::as_str).map(str::to_string).collect()
                }),
            };
            deps.mcp.register(config);
            deps.storage.save_registry(&deps.mcp.list_servers()).await?;
            Ok(json!({ "registered": server_id }))
        }
        "unregister_server" => {
            let server_id = arg_str(&args, "server_id")?;
            deps.mcp.unregister(&server_id).await?;
            deps.storage.save_registry(&deps.mcp.list_servers()).await?;
            Ok(json!({ "unregistered": server_id }))
        }
        "list_servers" => Ok(json!({ "servers": deps.mcp.list_servers() })),

        "debug_ping" => Ok(json!({ "pong": chrono::Utc::now().to_rfc3339() })),
        "debug_echo" => Ok(args),

        other => Err(SkillFlowError::UnknownTool(other.to_string())),
    }
}
