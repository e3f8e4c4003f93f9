//! Adapts [`RecordingManager`] to the `skillflow-mcp` crate's `CallTap`
//! trait, so `ClientManager::call_tool` — the one chokepoint shared by
//! the façade's direct proxy dispatch and the execution engine's
//! `tool_call` nodes — can tap every upstream call into every currently
//! active recording session (spec §1, §4.F).
//!
//! This lives in the façade binary rather than either crate: `mcp` has
//! no reason to depend on `recording`, and `recording` has no reason to
//! know about `mcp`'s tap trait.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use skillflow_mcp::{CallTap, McpResult};
use skillflow_recording::RecordingManager;
use skillflow_storage::model::ToolCallStatus;

pub struct RecordingCallTap {
    recording: Arc<RecordingManager>,
}

impl RecordingCallTap {
    pub fn new(recording: Arc<RecordingManager>) -> Self {
        Self { recording }
    }
}

#[async_trait]
impl CallTap for RecordingCallTap {
    async fn tap(&self, server_id: &str, tool: &str, args: &Value, result: &McpResult<Value>, duration_ms: u64) {
        let active = self.recording.list_active_sessions();
        if active.is_empty() {
            return;
        }
        let args_map = args.as_object().cloned().unwrap_or_default();
        for session_id in active {
            match result {
                Ok(value) => {
                    self.recording
                        .record_tool_call(
                            &session_id,
                            server_id,
                            tool,
                            args_map.clone(),
                            Some(value.clone()),
                            None,
                            duration_ms,
                            ToolCallStatus::Success,
                        )
                        .await;
                }
                Err(e) => {
                    self.recording
                        .record_tool_call(
                            &session_id,
                            server_id,
                            tool,
                            args_map.clone(),
                            None,
                            Some(e.to_string()),
                            duration_ms,
                            ToolCallStatus::Error,
                        )
                        .await;
                }
            }
        }
    }
}
