//! Audit-event writer (spec §1: out of scope for the core, sketched here
//! per §4.J's FULL note as a minimal stub so the binary is runnable
//! end-to-end). Grounded on the teacher's `mcp/src/approval/audit.rs`:
//! an append-only JSON-lines trail of who did what.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub timestamp: chrono::DateTime<Utc>,
    pub actor: String,
    pub action: String,
    pub detail: Value,
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(&self, actor: &str, action: &str, detail: Value);
}

/// Appends one JSON line per event to `<data_dir>/audit.jsonl`. Write
/// failures are logged, never propagated — an audit trail is best-effort
/// and must not take the façade down with it.
pub struct FileAuditLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileAuditLog {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl AuditLog for FileAuditLog {
    async fn record(&self, actor: &str, action: &str, detail: Value) {
        let event = AuditEvent {
            timestamp: Utc::now(),
            actor: actor.to_string(),
            action: action.to_string(),
            detail,
        };
        let Ok(line) = serde_json::to_string(&event) else {
            return;
        };
        let _guard = self.lock.lock().await;
        match OpenOptions::new().create(true).append(true).open(&self.path).await {
            Ok(mut file) => {
                if let Err(e) = file.write_all(format!("{line}\n").as_bytes()).await {
                    tracing::warn!(error = %e, "failed to append audit event");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to open audit log"),
        }
    }
}

/// A no-op sink, used where audit recording is unwanted (tests, dry-run
/// CLI subcommands that never contact the façade).
pub struct NullAuditLog;

#[async_trait]
impl AuditLog for NullAuditLog {
    async fn record(&self, _actor: &str, _action: &str, _detail: Value) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_audit_log_appends_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let log = FileAuditLog::new(path.clone());
        log.record("downstream", "call_tool", serde_json::json!({"name": "skill__x"})).await;
        log.record("downstream", "call_tool", serde_json::json!({"name": "skill__y"})).await;

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents.lines().count(), 2);
        for line in contents.lines() {
            let parsed: Value = serde_json::from_str(line).unwrap();
            assert_eq!(parsed["actor"], "downstream");
        }
    }
}
