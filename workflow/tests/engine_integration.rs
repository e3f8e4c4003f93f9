//! End-to-end engine tests that don't need a live upstream MCP server:
//! exercised via `conditional` and `loop` nodes, whose bodies reference
//! no `tool_call` node.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use skillflow_mcp::ClientManager;
use skillflow_skills::SkillManager;
use skillflow_storage::model::{
    Author, Concurrency, ConcurrencyMode, ConditionalBranch, ErrorStrategy, LoopConfig, LoopShape,
    NodeKind, Skill, SkillGraph, SkillNode,
};
use skillflow_storage::Storage;
use wfaas::Engine;

async fn test_engine() -> (tempfile::TempDir, Engine) {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(Storage::open(dir.path()).await.unwrap());
    let mcp = Arc::new(ClientManager::new("skillflow-test", "0.0.0"));
    let skills = Arc::new(SkillManager::new(storage.clone()));
    (dir, Engine::new(storage, mcp, skills))
}

fn empty_skill(graph: SkillGraph) -> Skill {
    let now = chrono::Utc::now();
    Skill {
        id: "sk1".to_string(),
        name: "test".to_string(),
        version: 1,
        description: "test skill".to_string(),
        tags: Vec::new(),
        created_at: now,
        updated_at: now,
        author: Author {
            workspace_id: "ws".into(),
            client_id: "cli".into(),
        },
        inputs_schema: Value::Null,
        output_schema: Value::Null,
        graph,
        metadata: HashMap::new(),
    }
}

#[tokio::test]
async fn conditional_runs_the_first_matching_branch() {
    let (_dir, engine) = test_engine().await;
    let graph = SkillGraph {
        nodes: vec![SkillNode {
            id: "check".to_string(),
            kind: NodeKind::Conditional {
                branches: vec![ConditionalBranch {
                    condition: "inputs.mode == 'fast'".to_string(),
                    nodes: vec![],
                }],
                default_branch: vec![],
            },
            args_template: Value::Null,
            export_outputs: HashMap::new(),
            depends_on: vec![],
            error_strategy: ErrorStrategy::FailFast,
            retry: None,
            timeout_ms: None,
            parameter_transform: None,
        }],
        edges: vec![],
        concurrency: Concurrency {
            mode: ConcurrencyMode::Sequential,
            ..Concurrency::default()
        },
    };
    let skill = Arc::new(empty_skill(graph));
    let result = engine
        .run_skill(skill, serde_json::json!({"mode": "fast"}))
        .await
        .unwrap();

    assert_eq!(result.status, skillflow_storage::model::RunStatus::Success);
    assert_eq!(result.node_executions.len(), 1);
    assert_eq!(result.node_executions[0].node_id, "check");
}

#[tokio::test]
async fn for_range_loop_runs_the_declared_number_of_iterations() {
    let (_dir, engine) = test_engine().await;
    let graph = SkillGraph {
        nodes: vec![SkillNode {
            id: "repeat".to_string(),
            kind: NodeKind::Loop(LoopConfig {
                shape: LoopShape::ForRange {
                    range_start: 0,
                    range_end: 3,
                    range_step: 1,
                    iteration_var: "i".to_string(),
                },
                body: vec![],
                max_iterations: 10,
            }),
            args_template: Value::Null,
            export_outputs: HashMap::new(),
            depends_on: vec![],
            error_strategy: ErrorStrategy::FailFast,
            retry: None,
            timeout_ms: None,
            parameter_transform: None,
        }],
        edges: vec![],
        concurrency: Concurrency {
            mode: ConcurrencyMode::Sequential,
            ..Concurrency::default()
        },
    };
    let skill = Arc::new(empty_skill(graph));
    let result = engine.run_skill(skill, Value::Null).await.unwrap();

    assert_eq!(result.status, skillflow_storage::model::RunStatus::Success);
    let output = result.node_executions[0].output.clone().unwrap();
    assert_eq!(output["iterations"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn loop_exceeding_max_iterations_fails_the_run() {
    let (_dir, engine) = test_engine().await;
    let graph = SkillGraph {
        nodes: vec![SkillNode {
            id: "repeat".to_string(),
            kind: NodeKind::Loop(LoopConfig {
                shape: LoopShape::ForRange {
                    range_start: 0,
                    range_end: 100,
                    range_step: 1,
                    iteration_var: "i".to_string(),
                },
                body: vec![],
                max_iterations: 5,
            }),
            args_template: Value::Null,
            export_outputs: HashMap::new(),
            depends_on: vec![],
            error_strategy: ErrorStrategy::FailFast,
            retry: None,
            timeout_ms: None,
            parameter_transform: None,
        }],
        edges: vec![],
        concurrency: Concurrency::default(),
    };
    let skill = Arc::new(empty_skill(graph));
    let result = engine.run_skill(skill, Value::Null).await.unwrap();

    assert_eq!(result.status, skillflow_storage::model::RunStatus::Failed);
}

#[tokio::test]
async fn skip_dependents_lets_siblings_continue_and_marks_run_partial_failure() {
    let (_dir, engine) = test_engine().await;
    let graph = SkillGraph {
        nodes: vec![
            SkillNode {
                id: "will_fail".to_string(),
                kind: NodeKind::ToolCall {
                    server_id: "nonexistent".into(),
                    tool: "noop".into(),
                },
                args_template: Value::Null,
                export_outputs: HashMap::new(),
                depends_on: vec![],
                error_strategy: ErrorStrategy::SkipDependents,
                retry: None,
                timeout_ms: None,
                parameter_transform: None,
            },
            SkillNode {
                id: "independent".to_string(),
                kind: NodeKind::Loop(LoopConfig {
                    shape: LoopShape::ForRange {
                        range_start: 0,
                        range_end: 1,
                        range_step: 1,
                        iteration_var: "i".to_string(),
                    },
                    body: vec![],
                    max_iterations: 5,
                }),
                args_template: Value::Null,
                export_outputs: HashMap::new(),
                depends_on: vec![],
                error_strategy: ErrorStrategy::FailFast,
                retry: None,
                timeout_ms: None,
                parameter_transform: None,
            },
            SkillNode {
                id: "dependent".to_string(),
                kind: NodeKind::Loop(LoopConfig {
                    shape: LoopShape::ForRange {
                        range_start: 0,
                        range_end: 1,
                        range_step: 1,
                        iteration_var: "i".to_string(),
                    },
                    body: vec![],
                    max_iterations: 5,
                }),
                args_template: Value::Null,
                export_outputs: HashMap::new(),
                depends_on: vec!["will_fail".to_string()],
                error_strategy: ErrorStrategy::FailFast,
                retry: None,
                timeout_ms: None,
                parameter_transform: None,
            },
        ],
        edges: vec![],
        concurrency: Concurrency::default(),
    };
    let skill = Arc::new(empty_skill(graph));
    let result = engine.run_skill(skill, Value::Null).await.unwrap();

    assert_eq!(result.status, skillflow_storage::model::RunStatus::PartialFailure);
    let by_id: HashMap<_, _> = result
        .node_executions
        .iter()
        .map(|e| (e.node_id.clone(), e.status))
        .collect();
    assert_eq!(by_id["will_fail"], skillflow_storage::model::NodeStatus::Failed);
    assert_eq!(by_id["independent"], skillflow_storage::model::NodeStatus::Success);
    assert!(!by_id.contains_key("dependent"));
}
