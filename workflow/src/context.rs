//! Run-scoped state threaded through node dispatch (spec §4.H): resolved
//! outputs, per-node statuses, the execution log, and the cancellation
//! flag a running graph checks between nodes and phases.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::{Map, Value};
use skillflow_storage::model::{NodeExecution, NodeStatus};
use tokio::sync::Mutex;

pub struct RunState {
    pub run_id: String,
    pub skill_id: String,
    pub version: u32,
    pub inputs: Value,
    pub outputs: Mutex<Map<String, Value>>,
    pub node_outputs: DashMap<String, Value>,
    pub node_statuses: DashMap<String, NodeStatus>,
    pub node_executions: Mutex<Vec<NodeExecution>>,
    pub started_at: DateTime<Utc>,
    cancelled: Arc<AtomicBool>,
}

impl RunState {
    pub fn new(
        run_id: String,
        skill_id: String,
        version: u32,
        inputs: Value,
        cancelled: Arc<AtomicBool>,
    ) -> Self {
        Self {
            run_id,
            skill_id,
            version,
            inputs,
            outputs: Mutex::new(Map::new()),
            node_outputs: DashMap::new(),
            node_statuses: DashMap::new(),
            node_executions: Mutex::new(Vec::new()),
            started_at: Utc::now(),
            cancelled,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub async fn snapshot_outputs(&self) -> HashMap<String, Value> {
        self.outputs
            .lock()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Builds the `{inputs, outputs, loop_vars}` context shared by
    /// condition evaluation and parameter transforms.
    pub async fn eval_context(&self, loop_vars: &Map<String, Value>) -> Value {
        let outputs = Value::Object(self.outputs.lock().await.clone());
        serde_json::json!({
            "inputs": self.inputs,
            "outputs": outputs,
            "loop_vars": Value::Object(loop_vars.clone()),
        })
    }
}
