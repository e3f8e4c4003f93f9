//! Persisted data model (spec §3). These types are shared by every crate
//! above storage: `skillflow-skills`, `skillflow-recording`,
//! `skillflow-engine`, and `skillflow-mcp` all build on the same shapes so
//! a `Skill` loaded from disk means the same thing everywhere.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status of one captured upstream call (spec §3 `ToolCallLog`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Success,
    Error,
    Timeout,
    Cancelled,
}

/// One captured upstream call. Immutable once appended to a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallLog {
    pub index: u64,
    pub timestamp: DateTime<Utc>,
    pub server_id: String,
    pub tool: String,
    pub args: serde_json::Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_summary: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    pub status: ToolCallStatus,
}

/// Ordered sequence of `ToolCallLog`s plus session metadata. Mutable only
/// while active, sealed on stop, then read-only (spec §3 Lifecycles).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingSession {
    pub id: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub client_id: String,
    pub workspace_id: String,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    #[serde(default)]
    pub logs: Vec<ToolCallLog>,
}

impl RecordingSession {
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// Error handling policy for a single node (spec §3, §4.H).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStrategy {
    FailFast,
    SkipDependents,
    Retry,
    Continue,
}

impl Default for ErrorStrategy {
    fn default() -> Self {
        ErrorStrategy::FailFast
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_multiplier() -> f64 {
    2.0
}

/// A branch of a `conditional` node: guard expression plus the ordered
/// child node ids to run when it matches (spec §4.H conditional dispatch).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionalBranch {
    pub condition: String,
    pub nodes: Vec<String>,
}

/// The three loop shapes a `loop` node can take (spec §4.H loop dispatch).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum LoopShape {
    For {
        /// JSONPath resolved against `{inputs, outputs}` to yield the
        /// iterated collection.
        source_path: String,
        iteration_var: String,
    },
    While {
        condition: String,
        iteration_var: String,
    },
    ForRange {
        range_start: i64,
        range_end: i64,
        #[serde(default = "default_range_step")]
        range_step: i64,
        iteration_var: String,
    },
}

fn default_range_step() -> i64 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    #[serde(flatten)]
    pub shape: LoopShape,
    /// Ordered ids of the enclosing graph's nodes this loop body executes
    /// per iteration.
    pub body: Vec<String>,
    pub max_iterations: u32,
}

/// The engine used to rewrite an argument structure after templating
/// (spec §4.G / §4.H "optional `parameter_transform`").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformEngine {
    None,
    JsonPath,
    Template,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterTransform {
    pub engine: TransformEngine,
    pub expression: String,
}

/// Tagged variant for `SkillNode.kind` (spec §9 design note: eliminate
/// optional fields only meaningful for some kinds).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    ToolCall { server_id: String, tool: String },
    SkillCall { skill_id: String },
    Conditional {
        branches: Vec<ConditionalBranch>,
        #[serde(default)]
        default_branch: Vec<String>,
    },
    Loop(LoopConfig),
}

/// A vertex in the skill graph (spec §3 `SkillNode`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillNode {
    pub id: String,
    #[serde(flatten)]
    pub kind: NodeKind,
    /// Leaves may be placeholder strings resolved at dispatch time
    /// (spec §4.H argument resolution). `Value::Null` for kinds that
    /// don't dispatch a tool call.
    #[serde(default)]
    pub args_template: Value,
    /// output-name -> JSONPath into the node's result.
    #[serde(default)]
    pub export_outputs: HashMap<String, String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub error_strategy: ErrorStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_transform: Option<ParameterTransform>,
}

/// Directed edge `(from_node, to_node)` with an optional guard condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillEdge {
    pub from_node: String,
    pub to_node: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyMode {
    Sequential,
    Phased,
    FullParallel,
}

/// Graph-level scheduling policy (spec §3 `Concurrency`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Concurrency {
    pub mode: ConcurrencyMode,
    /// phase_id -> node ids; phase order is the sorted key order.
    #[serde(default)]
    pub phases: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parallel: Option<usize>,
}

impl Default for Concurrency {
    fn default() -> Self {
        Self {
            mode: ConcurrencyMode::Sequential,
            phases: BTreeMap::new(),
            max_parallel: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillGraph {
    #[serde(default)]
    pub nodes: Vec<SkillNode>,
    #[serde(default)]
    pub edges: Vec<SkillEdge>,
    #[serde(default)]
    pub concurrency: Concurrency,
}

impl SkillGraph {
    pub fn node(&self, id: &str) -> Option<&SkillNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Validates the invariants from spec §3: no dangling edge/depends_on
    /// references, and the graph is acyclic.
    pub fn validate(&self) -> Result<(), String> {
        let ids: std::collections::HashSet<&str> =
            self.nodes.iter().map(|n| n.id.as_str()).collect();
        for edge in &self.edges {
            if !ids.contains(edge.from_node.as_str()) {
                return Err(format!("edge references unknown node {}", edge.from_node));
            }
            if !ids.contains(edge.to_node.as_str()) {
                return Err(format!("edge references unknown node {}", edge.to_node));
            }
        }
        for node in &self.nodes {
            for dep in &node.depends_on {
                if !ids.contains(dep.as_str()) {
                    return Err(format!("node {} depends_on unknown node {}", node.id, dep));
                }
            }
            for path in node.export_outputs.values() {
                if !path.starts_with("$.") {
                    return Err(format!(
                        "node {} export_outputs path must start with $.: {}",
                        node.id, path
                    ));
                }
            }
        }
        detect_cycle(&self.nodes, &self.edges)
    }
}

fn detect_cycle(nodes: &[SkillNode], edges: &[SkillEdge]) -> Result<(), String> {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for node in nodes {
        adjacency.entry(node.id.as_str()).or_default();
        for dep in &node.depends_on {
            adjacency.entry(dep.as_str()).or_default().push(node.id.as_str());
        }
    }
    for edge in edges {
        adjacency
            .entry(edge.from_node.as_str())
            .or_default()
            .push(edge.to_node.as_str());
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }
    let mut marks: HashMap<&str, Mark> = nodes.iter().map(|n| (n.id.as_str(), Mark::Unvisited)).collect();

    fn visit<'a>(
        node: &'a str,
        adjacency: &HashMap<&'a str, Vec<&'a str>>,
        marks: &mut HashMap<&'a str, Mark>,
    ) -> Result<(), String> {
        match marks.get(node).copied().unwrap_or(Mark::Unvisited) {
            Mark::Done => return Ok(()),
            Mark::InProgress => return Err(format!("cycle detected through node {node}")),
            Mark::Unvisited => {}
        }
        marks.insert(node, Mark::InProgress);
        if let Some(children) = adjacency.get(node) {
            for child in children {
                visit(child, adjacency, marks)?;
            }
        }
        marks.insert(node, Mark::Done);
        Ok(())
    }

    for node in nodes {
        visit(node.id.as_str(), &adjacency, &mut marks)?;
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Author {
    pub workspace_id: String,
    pub client_id: String,
}

/// A parameterised, versioned DAG of tool calls (spec §3 `Skill`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    pub id: String,
    pub name: String,
    pub version: u32,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub author: Author,
    pub inputs_schema: Value,
    pub output_schema: Value,
    pub graph: SkillGraph,
    /// Carries `compatibility` and `source_session_id` (SPEC_FULL §3)
    /// alongside any caller-supplied metadata.
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl Skill {
    pub fn compatibility(&self) -> Option<&str> {
        self.metadata.get("compatibility").and_then(Value::as_str)
    }

    pub fn source_session_id(&self) -> Option<&str> {
        self.metadata.get("source_session_id").and_then(Value::as_str)
    }
}

/// Lightweight listing form persisted at `skills/<id>/meta.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillMeta {
    pub id: String,
    pub name: String,
    pub latest_version: u32,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub author: Author,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl From<&Skill> for SkillMeta {
    fn from(skill: &Skill) -> Self {
        Self {
            id: skill.id.clone(),
            name: skill.name.clone(),
            latest_version: skill.version,
            description: skill.description.clone(),
            tags: skill.tags.clone(),
            created_at: skill.created_at,
            updated_at: skill.updated_at,
            author: skill.author.clone(),
            metadata: skill.metadata.clone(),
        }
    }
}

/// One upstream MCP server entry (spec §3 `ServerConfig`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub server_id: String,
    pub name: String,
    #[serde(flatten)]
    pub transport: TransportConfig,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    /// Allow-list of upstream tool names to expose; `None` exposes all
    /// (SPEC_FULL §3 addition mirroring the teacher's `McpServerConfig.tools`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum TransportConfig {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    HttpSse {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
    WebSocket {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
    StreamableHttp {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::Stdio {
            command: String::new(),
            args: Vec::new(),
            env: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
    Cancelled,
}

impl NodeStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, NodeStatus::Pending | NodeStatus::Running)
    }
}

/// Per-node execution log record (spec §3 `NodeExecution`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeExecution {
    pub run_id: String,
    pub skill_id: String,
    pub version: u32,
    pub node_id: String,
    pub status: NodeStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolved_args: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Success,
    PartialFailure,
    Failed,
    Cancelled,
}

/// Run-level outcome (spec §3 `SkillRunResult`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillRunResult {
    pub run_id: String,
    pub skill_id: String,
    pub version: u32,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub outputs: HashMap<String, Value>,
    #[serde(default)]
    pub node_executions: Vec<NodeExecution>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_graph_has_no_cycle() {
        let graph = SkillGraph::default();
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn self_loop_is_rejected() {
        let graph = SkillGraph {
            nodes: vec![SkillNode {
                id: "a".into(),
                kind: NodeKind::ToolCall {
                    server_id: "s".into(),
                    tool: "t".into(),
                },
                args_template: Value::Null,
                export_outputs: HashMap::new(),
                depends_on: vec!["a".into()],
                error_strategy: ErrorStrategy::FailFast,
                retry: None,
                timeout_ms: None,
                parameter_transform: None,
            }],
            edges: vec![],
            concurrency: Concurrency::default(),
        };
        assert!(graph.validate().is_err());
    }

    #[test]
    fn export_output_path_must_start_with_dollar_dot() {
        let mut exports = HashMap::new();
        exports.insert("x".to_string(), "result".to_string());
        let graph = SkillGraph {
            nodes: vec![SkillNode {
                id: "a".into(),
                kind: NodeKind::ToolCall {
                    server_id: "s".into(),
                    tool: "t".into(),
                },
                args_template: Value::Null,
                export_outputs: exports,
                depends_on: vec![],
                error_strategy: ErrorStrategy::FailFast,
                retry: None,
                timeout_ms: None,
                parameter_transform: None,
            }],
            edges: vec![],
            concurrency: Concurrency::default(),
        };
        assert!(graph.validate().is_err());
    }
}
