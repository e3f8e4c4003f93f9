//! The execution engine (spec §4.H): ties storage, the upstream MCP
//! pool, and the skill registry together to run a skill's graph to
//! completion under one of three concurrency modes.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use rand::distr::Alphanumeric;
use rand::Rng;
use serde_json::{Map, Value};
use skillflow_mcp::ClientManager;
use skillflow_skills::SkillManager;
use skillflow_storage::model::{
    ConcurrencyMode, ErrorStrategy, NodeExecution, NodeStatus, RunStatus, Skill, SkillGraph,
    SkillNode, SkillRunResult,
};
use skillflow_storage::Storage;
use tokio::sync::Semaphore;

use crate::context::RunState;
use crate::dispatch;
use crate::error::{EngineError, EngineResult};
use crate::scheduler::{self, Readiness};

/// Caps in-flight node work across every concurrency mode (spec §4.H:
/// "a global semaphore bounds total in-flight node work regardless of
/// mode").
const DEFAULT_MAX_IN_FLIGHT: usize = 32;

pub struct Engine {
    storage: Arc<Storage>,
    mcp: Arc<ClientManager>,
    skills: Arc<SkillManager>,
    semaphore: Arc<Semaphore>,
    active_runs: DashMap<String, Arc<AtomicBool>>,
}

impl Engine {
    pub fn new(storage: Arc<Storage>, mcp: Arc<ClientManager>, skills: Arc<SkillManager>) -> Self {
        Self {
            storage,
            mcp,
            skills,
            semaphore: Arc::new(Semaphore::new(DEFAULT_MAX_IN_FLIGHT)),
            active_runs: DashMap::new(),
        }
    }

    pub(crate) fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    pub(crate) fn mcp(&self) -> &Arc<ClientManager> {
        &self.mcp
    }

    pub(crate) fn skills(&self) -> &Arc<SkillManager> {
        &self.skills
    }

    /// Flags a running graph for cancellation; checked between nodes and
    /// between loop iterations rather than pre-empting in-flight calls.
    pub fn cancel_run(&self, run_id: &str) -> bool {
        match self.active_runs.get(run_id) {
            Some(flag) => {
                flag.store(true, Ordering::Release);
                true
            }
            None => false,
        }
    }

    pub async fn get_run_status(&self, run_id: &str) -> EngineResult<SkillRunResult> {
        Ok(self.storage.load_run_result(run_id).await?)
    }

    /// Runs `skill.graph` to completion (or until the first fail-fast
    /// error, or cancellation) and persists the final `SkillRunResult`.
    pub async fn run_skill(&self, skill: Arc<Skill>, inputs: Value) -> EngineResult<SkillRunResult> {
        let run_id = format!("run_{}", random_suffix(12));
        let cancelled = Arc::new(AtomicBool::new(false));
        self.active_runs.insert(run_id.clone(), cancelled.clone());

        let run = RunState::new(run_id.clone(), skill.id.clone(), skill.version, inputs, cancelled);
        for node in &skill.graph.nodes {
            run.node_statuses.insert(node.id.clone(), NodeStatus::Pending);
        }

        let outcome = self.execute_graph(&run, &skill.graph).await;
        self.active_runs.remove(&run_id);

        if let Err(ref e) = outcome {
            tracing::warn!(run_id = %run.run_id, skill_id = %run.skill_id, error = %e, "skill run ended in error");
        }

        let status = overall_status(&run);
        let outputs = run.snapshot_outputs().await;
        let node_executions = run.node_executions.lock().await.clone();
        let result = SkillRunResult {
            run_id: run.run_id.clone(),
            skill_id: run.skill_id.clone(),
            version: run.version,
            status,
            started_at: run.started_at,
            ended_at: Some(Utc::now()),
            outputs,
            node_executions,
        };
        self.storage.save_run_result(&result).await?;
        Ok(result)
    }

    async fn execute_graph(&self, run: &RunState, graph: &SkillGraph) -> EngineResult<()> {
        match graph.concurrency.mode {
            ConcurrencyMode::Sequential => self.run_sequential(run, graph).await,
            ConcurrencyMode::Phased => self.run_phased(run, graph).await,
            ConcurrencyMode::FullParallel => self.run_full_parallel(run, graph).await,
        }
    }

    async fn run_sequential(&self, run: &RunState, graph: &SkillGraph) -> EngineResult<()> {
        let loop_vars = Map::new();
        for node_id in scheduler::topological_order(graph) {
            if run.is_cancelled() {
                break;
            }
            let node = graph
                .node(&node_id)
                .ok_or_else(|| EngineError::UnknownNode(node_id.clone()))?;
            match scheduler::check_readiness(&node_id, graph, &run.node_statuses) {
                Readiness::Skip | Readiness::Wait => {
                    run.node_statuses.insert(node_id.clone(), NodeStatus::Skipped);
                    continue;
                }
                Readiness::Ready => {}
            }
            self.execute_node_with_policy(run, graph, node, &loop_vars).await?;
        }
        Ok(())
    }

    async fn run_phased(&self, run: &RunState, graph: &SkillGraph) -> EngineResult<()> {
        let loop_vars = Map::new();
        for node_ids in graph.concurrency.phases.values() {
            if run.is_cancelled() {
                break;
            }
            let mut futures = Vec::new();
            for node_id in node_ids {
                let node = graph
                    .node(node_id)
                    .ok_or_else(|| EngineError::UnknownNode(node_id.clone()))?;
                match scheduler::check_readiness(node_id, graph, &run.node_statuses) {
                    Readiness::Skip | Readiness::Wait => {
                        run.node_statuses.insert(node_id.clone(), NodeStatus::Skipped);
                        continue;
                    }
                    Readiness::Ready => {}
                }
                futures.push(self.execute_node_with_policy(run, graph, node, &loop_vars));
            }
            for result in futures::future::join_all(futures).await {
                result?;
            }
        }
        Ok(())
    }

    async fn run_full_parallel(&self, run: &RunState, graph: &SkillGraph) -> EngineResult<()> {
        use futures::stream::FuturesUnordered;
        use futures::StreamExt;

        let loop_vars = Map::new();
        let mut in_flight: FuturesUnordered<_> = FuturesUnordered::new();
        let mut in_flight_ids: HashSet<String> = HashSet::new();

        loop {
            if run.is_cancelled() {
                break;
            }

            let mut launched_any = false;
            for node in &graph.nodes {
                let pending = run.node_statuses.get(&node.id).map(|s| *s.value()) == Some(NodeStatus::Pending);
                if !pending || in_flight_ids.contains(&node.id) {
                    continue;
                }
                match scheduler::check_readiness(&node.id, graph, &run.node_statuses) {
                    Readiness::Skip => {
                        run.node_statuses.insert(node.id.clone(), NodeStatus::Skipped);
                    }
                    Readiness::Wait => {}
                    Readiness::Ready => {
                        in_flight_ids.insert(node.id.clone());
                        launched_any = true;
                        let node_id = node.id.clone();
                        let loop_vars = loop_vars.clone();
                        in_flight.push(async move {
                            let result = self.execute_node_with_policy(run, graph, node, &loop_vars).await;
                            (node_id, result)
                        });
                    }
                }
            }

            if in_flight.is_empty() {
                if !launched_any {
                    for node in &graph.nodes {
                        if run.node_statuses.get(&node.id).map(|s| *s.value()) == Some(NodeStatus::Pending) {
                            run.node_statuses.insert(node.id.clone(), NodeStatus::Skipped);
                        }
                    }
                    break;
                }
                continue;
            }

            if let Some((node_id, result)) = in_flight.next().await {
                in_flight_ids.remove(&node_id);
                result?;
            }
        }
        Ok(())
    }

    /// Runs `ids` from the enclosing graph in order, as child steps of
    /// `node` (a `conditional` branch or a `loop` body), sharing `run`'s
    /// state and persistence (spec §4.H).
    pub(crate) async fn run_node_sequence(
        &self,
        run: &RunState,
        graph: &SkillGraph,
        ids: &[String],
        loop_vars: &Map<String, Value>,
    ) -> EngineResult<()> {
        for id in ids {
            if run.is_cancelled() {
                break;
            }
            let node = graph.node(id).ok_or_else(|| EngineError::UnknownNode(id.clone()))?;
            self.execute_node_with_policy(run, graph, node, loop_vars).await?;
        }
        Ok(())
    }

    /// One node's full lifecycle: dispatch (with retry-with-backoff and
    /// an optional timeout), export extraction, persistence, and the
    /// four error strategies (spec §4.H).
    async fn execute_node_with_policy(
        &self,
        run: &RunState,
        graph: &SkillGraph,
        node: &SkillNode,
        loop_vars: &Map<String, Value>,
    ) -> EngineResult<()> {
        let _permit = self.semaphore.acquire().await.expect("semaphore is never closed");
        run.node_statuses.insert(node.id.clone(), NodeStatus::Running);
        let started_at = Utc::now();

        let max_retries = match (&node.error_strategy, &node.retry) {
            (ErrorStrategy::Retry, Some(cfg)) => cfg.max_retries,
            _ => 0,
        };

        let mut attempt = 0u32;
        let mut last_args = Value::Null;
        let outcome = loop {
            last_args = crate::argref::resolve_args(
                &node.args_template,
                &run.inputs,
                &run.node_outputs,
                loop_vars,
            );
            let dispatched = dispatch::dispatch_node(self, run, graph, node, loop_vars);
            let attempt_result = match node.timeout_ms {
                Some(ms) => match tokio::time::timeout(std::time::Duration::from_millis(ms), dispatched).await {
                    Ok(r) => r,
                    Err(_) => Err(EngineError::NodeFailed {
                        node_id: node.id.clone(),
                        reason: "node timed out".to_string(),
                    }),
                },
                None => dispatched.await,
            };

            match attempt_result {
                Ok(value) => break Ok(value),
                Err(e) if attempt < max_retries => {
                    let cfg = node.retry.as_ref().expect("max_retries > 0 implies a retry config");
                    let delay_ms = (cfg.initial_backoff_ms as f64 * cfg.multiplier.powi(attempt as i32)) as u64;
                    tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                    attempt += 1;
                }
                Err(e) => break Err(e),
            }
        };

        let ended_at = Utc::now();
        match outcome {
            Ok(value) => {
                apply_exports(run, node, &value).await;
                run.node_outputs.insert(node.id.clone(), value.clone());
                run.node_statuses.insert(node.id.clone(), NodeStatus::Success);
                self.persist_execution(run, node, started_at, ended_at, &last_args, Some(value), None, attempt)
                    .await?;
                Ok(())
            }
            Err(e) => {
                run.node_statuses.insert(node.id.clone(), NodeStatus::Failed);
                self.persist_execution(run, node, started_at, ended_at, &last_args, None, Some(e.to_string()), attempt)
                    .await?;
                match node.error_strategy {
                    ErrorStrategy::FailFast => Err(e),
                    ErrorStrategy::Continue => {
                        run.node_outputs.insert(node.id.clone(), Value::Null);
                        Ok(())
                    }
                    ErrorStrategy::SkipDependents | ErrorStrategy::Retry => Ok(()),
                }
            }
        }
    }

    async fn persist_execution(
        &self,
        run: &RunState,
        node: &SkillNode,
        started_at: chrono::DateTime<Utc>,
        ended_at: chrono::DateTime<Utc>,
        resolved_args: &Value,
        output: Option<Value>,
        error: Option<String>,
        retry_count: u32,
    ) -> EngineResult<()> {
        let status = run
            .node_statuses
            .get(&node.id)
            .map(|s| *s.value())
            .unwrap_or(NodeStatus::Failed);
        let record = NodeExecution {
            run_id: run.run_id.clone(),
            skill_id: run.skill_id.clone(),
            version: run.version,
            node_id: node.id.clone(),
            status,
            started_at,
            ended_at: Some(ended_at),
            resolved_args: resolved_args.clone(),
            output,
            error,
            retry_count,
        };
        self.storage.append_run_log(&record).await?;
        run.node_executions.lock().await.push(record);
        Ok(())
    }
}

async fn apply_exports(run: &RunState, node: &SkillNode, value: &Value) {
    if node.export_outputs.is_empty() {
        return;
    }
    let mut outputs = run.outputs.lock().await;
    for (name, path) in &node.export_outputs {
        match skillflow_transform::jsonpath::query_first(value, path) {
            Ok(Some(extracted)) => {
                outputs.insert(name.clone(), extracted);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(node_id = %node.id, path, error = %e, "export_outputs JSONPath failed"),
        }
    }
}

/// cancelled > success (all nodes success-or-skipped) > partial_failure
/// (at least one success alongside failures) > failed (spec §4.H).
fn overall_status(run: &RunState) -> RunStatus {
    if run.is_cancelled() {
        return RunStatus::Cancelled;
    }

    let mut any_success = false;
    let mut any_failed = false;
    let mut all_success_or_skipped = true;
    for entry in run.node_statuses.iter() {
        match *entry.value() {
            NodeStatus::Success => any_success = true,
            NodeStatus::Failed => {
                any_failed = true;
                all_success_or_skipped = false;
            }
            NodeStatus::Skipped => {}
            _ => all_success_or_skipped = false,
        }
    }

    if all_success_or_skipped {
        RunStatus::Success
    } else if any_success && any_failed {
        RunStatus::PartialFailure
    } else {
        RunStatus::Failed
    }
}

fn random_suffix(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}
