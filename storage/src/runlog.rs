//! Append-only run logs (spec §4.C, §6): one JSON object per line, many
//! concurrent appenders, each append serialised by a per-path cooperative
//! lock.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::StorageResult;
use crate::model::NodeExecution;

#[derive(Default)]
pub struct RunLogWriter {
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl RunLogWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        self.locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub async fn append(&self, path: &Path, record: &NodeExecution) -> StorageResult<()> {
        let lock = self.lock_for(path);
        let _guard = lock.lock().await;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = OpenOptions::new().create(true).append(true).open(path).await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    pub async fn read_all(&self, path: &Path) -> StorageResult<Vec<NodeExecution>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let body = fs::read_to_string(path).await?;
        let mut records = Vec::new();
        for line in body.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<NodeExecution>(line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping corrupt run-log line");
                }
            }
        }
        Ok(records)
    }
}
