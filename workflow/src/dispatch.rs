//! Per-node-kind dispatch (spec §4.H): one attempt at running a node's
//! own semantics, with no retry or error-strategy handling — that lives
//! in `Engine::execute_node_with_policy`, which wraps this.

use serde_json::{Map, Value};
use skillflow_storage::model::{LoopShape, NodeKind, SkillGraph, SkillNode};
use skillflow_transform::{evaluate_condition, jsonpath};

use crate::context::RunState;
use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};

pub(crate) async fn dispatch_node(
    engine: &Engine,
    run: &RunState,
    graph: &SkillGraph,
    node: &SkillNode,
    loop_vars: &Map<String, Value>,
) -> EngineResult<Value> {
    let eval_ctx = run.eval_context(loop_vars).await;
    let resolved_args = crate::argref::resolve_args(
        &node.args_template,
        &run.inputs,
        &run.node_outputs,
        loop_vars,
    );
    let resolved_args = match &node.parameter_transform {
        Some(transform) => skillflow_transform::apply_transform(
            transform.engine,
            &transform.expression,
            &resolved_args,
            &eval_ctx,
        )?,
        None => resolved_args,
    };

    match &node.kind {
        NodeKind::ToolCall { server_id, tool } => Ok(engine
            .mcp()
            .call_tool(server_id, tool, Some(resolved_args))
            .await?),

        NodeKind::SkillCall { skill_id } => {
            let nested_skill = engine.skills().get_skill(skill_id, None).await?;
            let nested_result = engine.run_skill(nested_skill, resolved_args).await?;
            Ok(serde_json::to_value(&nested_result.outputs).unwrap_or(Value::Null))
        }

        NodeKind::Conditional { branches, default_branch } => {
            let mut guard_ctx = eval_ctx.clone();
            if let Value::Object(ref mut map) = guard_ctx {
                map.insert("args".to_string(), resolved_args);
            }
            for (idx, branch) in branches.iter().enumerate() {
                if evaluate_condition(&branch.condition, &guard_ctx)? {
                    engine.run_node_sequence(run, graph, &branch.nodes, loop_vars).await?;
                    return Ok(serde_json::json!({
                        "branch_executed": idx,
                        "results": branch.nodes,
                    }));
                }
            }
            engine.run_node_sequence(run, graph, default_branch, loop_vars).await?;
            Ok(serde_json::json!({
                "branch_executed": Value::Null,
                "results": default_branch,
            }))
        }

        NodeKind::Loop(config) => run_loop(engine, run, graph, node, config, loop_vars).await,
    }
}

async fn run_loop(
    engine: &Engine,
    run: &RunState,
    graph: &SkillGraph,
    node: &SkillNode,
    config: &skillflow_storage::model::LoopConfig,
    outer_loop_vars: &Map<String, Value>,
) -> EngineResult<Value> {
    let mut iterations = Vec::new();

    match &config.shape {
        LoopShape::For { source_path, iteration_var } => {
            let eval_ctx = run.eval_context(outer_loop_vars).await;
            let matches = jsonpath::query_all(&eval_ctx, source_path)?;
            let items: Vec<Value> = match matches.as_slice() {
                [Value::Array(single)] => single.clone(),
                _ => matches,
            };

            for (idx, item) in items.iter().enumerate() {
                if idx as u32 >= config.max_iterations {
                    return Err(EngineError::MaxIterationsExceeded {
                        node_id: node.id.clone(),
                        max: config.max_iterations,
                    });
                }
                if run.is_cancelled() {
                    break;
                }
                let mut loop_vars = outer_loop_vars.clone();
                loop_vars.insert(iteration_var.clone(), item.clone());
                loop_vars.insert("index".to_string(), serde_json::json!(idx));
                engine.run_node_sequence(run, graph, &config.body, &loop_vars).await?;

                let mut entry = Map::new();
                entry.insert("index".to_string(), serde_json::json!(idx));
                entry.insert(iteration_var.clone(), item.clone());
                iterations.push(Value::Object(entry));
            }
        }

        LoopShape::While { condition, iteration_var } => {
            let mut idx = 0u32;
            loop {
                if idx >= config.max_iterations {
                    return Err(EngineError::MaxIterationsExceeded {
                        node_id: node.id.clone(),
                        max: config.max_iterations,
                    });
                }
                let mut loop_vars = outer_loop_vars.clone();
                loop_vars.insert(iteration_var.clone(), serde_json::json!(idx));
                loop_vars.insert("index".to_string(), serde_json::json!(idx));
                let eval_ctx = run.eval_context(&loop_vars).await;
                if !evaluate_condition(condition, &eval_ctx)? || run.is_cancelled() {
                    break;
                }
                engine.run_node_sequence(run, graph, &config.body, &loop_vars).await?;

                let mut entry = Map::new();
                entry.insert("index".to_string(), serde_json::json!(idx));
                iterations.push(Value::Object(entry));
                idx += 1;
            }
        }

        LoopShape::ForRange { range_start, range_end, range_step, iteration_var } => {
            let step = if *range_step == 0 { 1 } else { *range_step };
            let mut value = *range_start;
            let mut idx = 0u32;
            while (step > 0 && value < *range_end) || (step < 0 && value > *range_end) {
                if idx >= config.max_iterations {
                    return Err(EngineError::MaxIterationsExceeded {
                        node_id: node.id.clone(),
                        max: config.max_iterations,
                    });
                }
                if run.is_cancelled() {
                    break;
                }
                let mut loop_vars = outer_loop_vars.clone();
                loop_vars.insert(iteration_var.clone(), serde_json::json!(value));
                loop_vars.insert("index".to_string(), serde_json::json!(idx));
                engine.run_node_sequence(run, graph, &config.body, &loop_vars).await?;

                let mut entry = Map::new();
                entry.insert("index".to_string(), serde_json::json!(idx));
                entry.insert(iteration_var.clone(), serde_json::json!(value));
                iterations.push(Value::Object(entry));

                value += step;
                idx += 1;
            }
        }
    }

    Ok(serde_json::json!({ "iterations": iterations }))
}
