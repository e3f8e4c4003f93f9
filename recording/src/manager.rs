//! Session lifecycle (spec §4.F).

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use rand::distr::Alphanumeric;
use rand::Rng;
use serde_json::Value;
use skillflow_storage::model::{RecordingSession, ToolCallLog, ToolCallStatus};
use skillflow_storage::Storage;
use tokio::sync::Mutex;

use crate::error::{RecordingError, RecordingResult};

pub struct RecordingManager {
    storage: Arc<Storage>,
    /// One lock per active session (spec §9: avoid a global lock that
    /// would serialise unrelated sessions), cleared on stop.
    sessions: DashMap<String, Arc<Mutex<RecordingSession>>>,
}

impl RecordingManager {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            sessions: DashMap::new(),
        }
    }

    /// Allocates `session_<ISO8601>_<rand8>` and returns the new id.
    pub fn start(
        &self,
        client_id: impl Into<String>,
        workspace_id: impl Into<String>,
        metadata: std::collections::HashMap<String, Value>,
    ) -> String {
        let now = Utc::now();
        let suffix: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(char::from)
            .collect();
        let id = format!("session_{}_{}", now.format("%Y%m%dT%H%M%SZ"), suffix.to_lowercase());
        let session = RecordingSession {
            id: id.clone(),
            started_at: now,
            ended_at: None,
            client_id: client_id.into(),
            workspace_id: workspace_id.into(),
            metadata,
            logs: Vec::new(),
        };
        self.sessions.insert(id.clone(), Arc::new(Mutex::new(session)));
        id
    }

    /// Taps every upstream call. A no-op if `session_id` has no active
    /// session (recording is opt-in; racing with stop is tolerated).
    #[tracing::instrument(skip(self, args, result_summary))]
    #[allow(clippy::too_many_arguments)]
    pub async fn record_tool_call(
        &self,
        session_id: &str,
        server_id: impl Into<String>,
        tool: impl Into<String>,
        args: serde_json::Map<String, Value>,
        result_summary: Option<Value>,
        error: Option<String>,
        duration_ms: u64,
        status: ToolCallStatus,
    ) {
        let Some(entry) = self.sessions.get(session_id) else {
            return;
        };
        let session_lock = entry.value().clone();
        drop(entry);
        let mut session = session_lock.lock().await;
        let index = session.logs.len() as u64 + 1;
        session.logs.push(ToolCallLog {
            index,
            timestamp: Utc::now(),
            server_id: server_id.into(),
            tool: tool.into(),
            args,
            result_summary,
            error,
            duration_ms,
            status,
        });
    }

    /// Seals `ended_at`, persists, then drops the in-memory session and
    /// its lock.
    pub async fn stop(&self, session_id: &str) -> RecordingResult<RecordingSession> {
        let (_, session_lock) = self
            .sessions
            .remove(session_id)
            .ok_or_else(|| RecordingError::SessionNotActive(session_id.to_string()))?;
        let mut session = session_lock.lock().await;
        session.ended_at = Some(Utc::now());
        let sealed = session.clone();
        drop(session);
        self.storage.save_session(&sealed).await?;
        Ok(sealed)
    }

    pub fn list_active_sessions(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    pub async fn load_session(&self, session_id: &str) -> RecordingResult<RecordingSession> {
        Ok(self.storage.load_session(session_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn manager() -> (tempfile::TempDir, RecordingManager) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(skillflow_storage::Storage::open(dir.path()).await.unwrap());
        (dir, RecordingManager::new(storage))
    }

    #[tokio::test]
    async fn log_indices_are_contiguous_from_one() {
        let (_dir, mgr) = manager().await;
        let id = mgr.start("cli", "ws", Default::default());
        for i in 0..5 {
            mgr.record_tool_call(
                &id,
                "srv",
                "tool",
                serde_json::Map::new(),
                Some(serde_json::json!({"i": i})),
                None,
                10,
                ToolCallStatus::Success,
            )
            .await;
        }
        let sealed = mgr.stop(&id).await.unwrap();
        let indices: Vec<u64> = sealed.logs.iter().map(|l| l.index).collect();
        assert_eq!(indices, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn recording_to_unknown_session_is_a_noop() {
        let (_dir, mgr) = manager().await;
        mgr.record_tool_call(
            "nonexistent",
            "srv",
            "tool",
            serde_json::Map::new(),
            None,
            None,
            1,
            ToolCallStatus::Success,
        )
        .await;
    }
}
