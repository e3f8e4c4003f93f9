//! Projects a recorded session into a templated skill draft (spec §4.F
//! `to_skill_draft`).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use skillflow_skills::SkillDraft;
use skillflow_storage::model::{NodeKind, SkillEdge, SkillGraph, SkillNode};
use skillflow_storage::model::{ErrorStrategy, RecordingSession};

use crate::error::{RecordingError, RecordingResult};

/// Which logs to select out of the session (spec §4.F: "explicit index
/// list or `[start_index, end_index)` half-open range, default: all").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSelection {
    All,
    Indices(Vec<usize>),
    Range { start: usize, end: usize },
}

/// `(name, description, schema, source_path)` — exposes one leaf of a
/// selected log's arguments as a skill input (spec §4.F). `default` is a
/// SPEC_FULL §4.F addition: a literal fallback used when `source_path` is
/// absent from the targeted log, so partial exposure doesn't hard-fail
/// the whole draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExposeParamSpec {
    pub name: String,
    pub description: String,
    pub schema: Value,
    /// `logs[N].args.<dotted.field>`, N indexing the *selected* subset.
    pub source_path: String,
    pub default: Option<Value>,
}

fn select_logs<'a>(session: &'a RecordingSession, selection: &LogSelection) -> Vec<&'a skillflow_storage::model::ToolCallLog> {
    match selection {
        LogSelection::All => session.logs.iter().collect(),
        LogSelection::Indices(indices) => indices
            .iter()
            .filter_map(|i| session.logs.get(*i))
            .collect(),
        LogSelection::Range { start, end } => session
            .logs
            .get(*start..(*end).min(session.logs.len()))
            .map(|slice| slice.iter().collect())
            .unwrap_or_default(),
    }
}

struct ParsedSourcePath {
    log_index: usize,
    field_path: Vec<String>,
}

fn parse_source_path(path: &str) -> RecordingResult<ParsedSourcePath> {
    let rest = path
        .strip_prefix("logs[")
        .ok_or_else(|| RecordingError::InvalidSourcePath(path.to_string()))?;
    let close = rest
        .find(']')
        .ok_or_else(|| RecordingError::InvalidSourcePath(path.to_string()))?;
    let log_index: usize = rest[..close]
        .parse()
        .map_err(|_| RecordingError::InvalidSourcePath(path.to_string()))?;
    let remainder = &rest[close + 1..];
    let field_part = remainder
        .strip_prefix(".args.")
        .ok_or_else(|| RecordingError::InvalidSourcePath(path.to_string()))?;
    let field_path = field_part.split('.').map(|s| s.to_string()).collect();
    Ok(ParsedSourcePath { log_index, field_path })
}

fn set_placeholder(value: &mut Value, field_path: &[String], placeholder: &str) -> bool {
    match field_path.split_first() {
        None => {
            *value = Value::String(placeholder.to_string());
            true
        }
        Some((head, rest)) => {
            let Value::Object(map) = value else {
                return false;
            };
            let child = map.entry(head.clone()).or_insert(Value::Null);
            if rest.is_empty() {
                *child = Value::String(placeholder.to_string());
                true
            } else {
                set_placeholder(child, rest, placeholder)
            }
        }
    }
}

fn get_field(value: &Value, field_path: &[String]) -> Option<Value> {
    let mut current = value;
    for segment in field_path {
        current = current.as_object()?.get(segment)?;
    }
    Some(current.clone())
}

fn schema_admits_null(schema: &Value) -> bool {
    match schema.get("type") {
        Some(Value::String(s)) => s == "null",
        Some(Value::Array(types)) => types.iter().any(|t| t.as_str() == Some("null")),
        _ => false,
    }
}

/// Selects logs, emits one linear-chain `tool_call` node per log, then
/// applies parameter exposure: each target leaf in the matching node's
/// `args_template` is replaced with `$inputs.<name>`.
pub fn to_skill_draft(
    session: &RecordingSession,
    selection: LogSelection,
    exposures: Vec<ExposeParamSpec>,
) -> RecordingResult<SkillDraft> {
    let selected = select_logs(session, &selection);

    let mut nodes: Vec<SkillNode> = selected
        .iter()
        .enumerate()
        .map(|(k, log)| SkillNode {
            id: format!("step_{}", k + 1),
            kind: NodeKind::ToolCall {
                server_id: log.server_id.clone(),
                tool: log.tool.clone(),
            },
            args_template: Value::Object(log.args.clone()),
            export_outputs: HashMap::new(),
            depends_on: Vec::new(),
            error_strategy: ErrorStrategy::FailFast,
            retry: None,
            timeout_ms: None,
            parameter_transform: None,
        })
        .collect();

    let edges: Vec<SkillEdge> = (1..nodes.len())
        .map(|k| SkillEdge {
            from_node: format!("step_{k}"),
            to_node: format!("step_{}", k + 1),
            condition: None,
        })
        .collect();

    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();

    for expose in &exposures {
        let parsed = parse_source_path(&expose.source_path)?;
        let placeholder = format!("$inputs.{}", expose.name);

        if let Some(node) = nodes.get_mut(parsed.log_index) {
            let original = selected
                .get(parsed.log_index)
                .and_then(|log| get_field(&Value::Object(log.args.clone()), &parsed.field_path));
            if original.is_some() {
                set_placeholder(&mut node.args_template, &parsed.field_path, &placeholder);
            } else if let Some(default) = &expose.default {
                set_placeholder_value(&mut node.args_template, &parsed.field_path, default.clone());
            }
            // If neither the log nor a default supplies the field, this
            // exposure is skipped for this node rather than failing the
            // whole draft (SPEC_FULL §4.F).
        }

        properties.insert(expose.name.clone(), expose.schema.clone());
        if !schema_admits_null(&expose.schema) {
            required.push(Value::String(expose.name.clone()));
        }
    }

    let inputs_schema = serde_json::json!({
        "type": "object",
        "properties": Value::Object(properties),
        "required": required,
    });

    let mut metadata = HashMap::new();
    metadata.insert(
        "source_session_id".to_string(),
        Value::String(session.id.clone()),
    );

    Ok(SkillDraft {
        graph: SkillGraph {
            nodes: std::mem::take(&mut nodes),
            edges,
            concurrency: Default::default(),
        },
        inputs_schema,
        output_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "success": {"type": "boolean"},
                "message": {"type": "string"},
            },
        }),
        metadata,
    })
}

fn set_placeholder_value(value: &mut Value, field_path: &[String], literal: Value) -> bool {
    match field_path.split_first() {
        None => {
            *value = literal;
            true
        }
        Some((head, rest)) => {
            let Value::Object(map) = value else {
                return false;
            };
            let child = map.entry(head.clone()).or_insert(Value::Null);
            if rest.is_empty() {
                *child = literal;
                true
            } else {
                set_placeholder_value(child, rest, literal)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use skillflow_storage::model::{ToolCallLog, ToolCallStatus};

    fn log(server_id: &str, tool: &str, args: serde_json::Value) -> ToolCallLog {
        ToolCallLog {
            index: 1,
            timestamp: Utc::now(),
            server_id: server_id.to_string(),
            tool: tool.to_string(),
            args: args.as_object().unwrap().clone(),
            result_summary: None,
            error: None,
            duration_ms: 5,
            status: ToolCallStatus::Success,
        }
    }

    fn session(logs: Vec<ToolCallLog>) -> RecordingSession {
        RecordingSession {
            id: "session_test".to_string(),
            started_at: Utc::now(),
            ended_at: Some(Utc::now()),
            client_id: "cli".to_string(),
            workspace_id: "ws".to_string(),
            metadata: HashMap::new(),
            logs,
        }
    }

    #[test]
    fn linear_chain_with_exposed_param() {
        let sess = session(vec![
            log("srv1", "sum", serde_json::json!({"x": 2, "y": 3})),
            log("srv1", "negate", serde_json::json!({"n": 5})),
        ]);

        let draft = to_skill_draft(
            &sess,
            LogSelection::All,
            vec![ExposeParamSpec {
                name: "x".to_string(),
                description: "first operand".to_string(),
                schema: serde_json::json!({"type": "integer"}),
                source_path: "logs[0].args.x".to_string(),
                default: None,
            }],
        )
        .unwrap();

        assert_eq!(draft.graph.nodes.len(), 2);
        assert_eq!(draft.graph.edges.len(), 1);
        let first = &draft.graph.nodes[0];
        assert_eq!(first.args_template["x"], serde_json::json!("$inputs.x"));
        assert_eq!(
            draft.metadata.get("source_session_id"),
            Some(&Value::String("session_test".to_string()))
        );
        assert_eq!(
            draft.inputs_schema["required"],
            serde_json::json!(["x"])
        );
    }

    #[test]
    fn missing_source_field_falls_back_to_default_without_failing() {
        let sess = session(vec![log("srv1", "echo", serde_json::json!({"v": 1}))]);
        let draft = to_skill_draft(
            &sess,
            LogSelection::All,
            vec![ExposeParamSpec {
                name: "absent".to_string(),
                description: "not present in this log".to_string(),
                schema: serde_json::json!({"type": "string"}),
                source_path: "logs[0].args.missing".to_string(),
                default: Some(Value::String("fallback".to_string())),
            }],
        )
        .unwrap();
        assert_eq!(draft.graph.nodes[0].args_template["missing"], serde_json::json!("fallback"));
    }
}
