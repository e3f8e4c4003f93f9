//! Ties the layout, atomic I/O, index, and cache together into one
//! `Storage` handle (spec §4.C + §4.D).

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use tokio::fs;

use crate::atomic::{read_json, write_json_atomic};
use crate::cache::{SkillEntryCache, ToolListCache, DEFAULT_TTL_SECS};
use crate::error::{StorageError, StorageResult};
use crate::index::SkillIndex;
use crate::model::{NodeExecution, RecordingSession, ServerConfig, Skill, SkillMeta, SkillRunResult};
use crate::paths;
use crate::registry;
use crate::runlog::RunLogWriter;
use std::sync::Arc;

pub struct Storage {
    root: PathBuf,
    index: SkillIndex,
    skill_cache: SkillEntryCache,
    tool_list_cache: ToolListCache,
    run_logs: RunLogWriter,
}

impl Storage {
    /// Opens (creating if necessary) the data directory, scanning
    /// `skills/` into the in-memory index (spec §4.C init behaviour).
    pub async fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(paths::skills_dir(&root)).await?;
        fs::create_dir_all(paths::sessions_dir(&root)).await?;
        fs::create_dir_all(paths::runs_dir(&root)).await?;
        fs::create_dir_all(paths::registry_dir(&root)).await?;

        let index = SkillIndex::new();
        let mut entries = fs::read_dir(paths::skills_dir(&root)).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let skill_id = entry.file_name().to_string_lossy().to_string();
            let meta_path = paths::skill_meta_path(&root, &skill_id);
            if !meta_path.exists() {
                continue;
            }
            match read_json::<SkillMeta>(&meta_path).await {
                Ok(meta) => index.insert(meta),
                Err(e) => {
                    tracing::warn!(skill_id, error = %e, "skipping corrupt skill meta.json");
                }
            }
        }

        Ok(Self {
            root,
            index,
            skill_cache: SkillEntryCache::new(Duration::from_secs(DEFAULT_TTL_SECS)),
            tool_list_cache: ToolListCache::new(Duration::from_secs(DEFAULT_TTL_SECS)),
            run_logs: RunLogWriter::new(),
        })
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    pub fn index(&self) -> &SkillIndex {
        &self.index
    }

    pub fn skill_cache(&self) -> &SkillEntryCache {
        &self.skill_cache
    }

    pub fn tool_list_cache(&self) -> &ToolListCache {
        &self.tool_list_cache
    }

    /// Persists a new skill version plus its listing metadata, atomically,
    /// and keeps the in-memory index and caches consistent (spec §3
    /// invariant: "the live in-memory skill index and the persisted meta
    /// files agree after every successful save or delete").
    pub async fn save_skill(&self, skill: &Skill) -> StorageResult<()> {
        skill
            .graph
            .validate()
            .map_err(|reason| StorageError::Corrupt {
                path: format!("skills/{}/v{:04}.json", skill.id, skill.version),
                reason,
            })?;
        let version_path = paths::skill_version_path(&self.root, &skill.id, skill.version);
        write_json_atomic(&version_path, skill).await?;
        let meta = SkillMeta::from(skill);
        write_json_atomic(&paths::skill_meta_path(&self.root, &skill.id), &meta).await?;
        self.index.insert(meta);
        self.skill_cache.invalidate(&skill.id);
        self.tool_list_cache.invalidate_if_contributed(&skill.id);
        Ok(())
    }

    /// Loads a skill version, subject to the cache layer (spec §4.D).
    /// `version = None` loads the latest version per the in-memory index.
    pub async fn load_skill(&self, id: &str, version: Option<u32>) -> StorageResult<Arc<Skill>> {
        let meta = self
            .index
            .get(id)
            .ok_or_else(|| StorageError::SkillNotFound { id: id.to_string() })?;
        let requested = version.unwrap_or(meta.latest_version);
        let path = paths::skill_version_path(&self.root, id, requested);
        if !path.exists() {
            return Err(StorageError::SkillVersionNotFound {
                id: id.to_string(),
                version: requested,
            });
        }

        let is_latest = requested == meta.latest_version;
        if is_latest {
            let mtime = fs::metadata(&path).await?.modified()?;
            if let Some(cached) = self.skill_cache.get(id, mtime) {
                return Ok(cached);
            }
            let skill: Skill = read_json(&path).await?;
            let skill = Arc::new(skill);
            self.skill_cache.set(id.to_string(), skill.clone(), mtime);
            return Ok(skill);
        }

        let skill: Skill = read_json(&path).await?;
        Ok(Arc::new(skill))
    }

    pub fn list_skill_metas(&self) -> Vec<SkillMeta> {
        self.index.list()
    }

    /// Removes a skill from the index and cache; with `hard = true` also
    /// deletes the on-disk directory.
    pub async fn delete_skill(&self, id: &str, hard: bool) -> StorageResult<()> {
        self.index.remove(id);
        self.skill_cache.invalidate(id);
        self.tool_list_cache.invalidate_if_contributed(id);
        if hard {
            let dir = paths::skill_dir(&self.root, id);
            if dir.exists() {
                fs::remove_dir_all(&dir).await?;
            }
        }
        Ok(())
    }

    pub async fn save_session(&self, session: &RecordingSession) -> StorageResult<()> {
        write_json_atomic(&paths::session_path(&self.root, &session.id), session).await
    }

    pub async fn load_session(&self, id: &str) -> StorageResult<RecordingSession> {
        let path = paths::session_path(&self.root, id);
        if !path.exists() {
            return Err(StorageError::SessionNotFound { id: id.to_string() });
        }
        read_json(&path).await
    }

    /// Appends one `NodeExecution` record to today's (UTC) run log.
    pub async fn append_run_log(&self, record: &NodeExecution) -> StorageResult<()> {
        let date = Utc::now().format("%Y-%m-%d").to_string();
        let path = paths::run_log_path(&self.root, &date, &record.run_id);
        self.run_logs.append(&path, record).await
    }

    pub async fn load_run_log(&self, date: &str, run_id: &str) -> StorageResult<Vec<NodeExecution>> {
        let path = paths::run_log_path(&self.root, date, run_id);
        self.run_logs.read_all(&path).await
    }

    /// Persists the run-level outcome once the graph completes, dated by
    /// the run's own `started_at` so it lands beside that day's node log.
    pub async fn save_run_result(&self, result: &SkillRunResult) -> StorageResult<()> {
        let date = result.started_at.format("%Y-%m-%d").to_string();
        let path = paths::run_result_path(&self.root, &date, &result.run_id);
        write_json_atomic(&path, result).await
    }

    /// Looks up a run's persisted result by scanning date directories
    /// under `runs/`, since the run id alone doesn't carry its date.
    pub async fn load_run_result(&self, run_id: &str) -> StorageResult<SkillRunResult> {
        let runs_dir = paths::runs_dir(&self.root);
        let mut dates = fs::read_dir(&runs_dir).await?;
        while let Some(entry) = dates.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let date = entry.file_name().to_string_lossy().to_string();
            let path = paths::run_result_path(&self.root, &date, run_id);
            if path.exists() {
                return read_json(&path).await;
            }
        }
        Err(StorageError::RunNotFound {
            run_id: run_id.to_string(),
        })
    }

    pub async fn load_registry(&self) -> Vec<ServerConfig> {
        registry::load_registry(&self.root).await
    }

    pub async fn save_registry(&self, servers: &[ServerConfig]) -> StorageResult<()> {
        registry::save_registry(&self.root, servers).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use std::collections::HashMap;

    fn sample_skill(id: &str, version: u32) -> Skill {
        Skill {
            id: id.to_string(),
            name: "sample".to_string(),
            version,
            description: "a sample skill".to_string(),
            tags: vec!["demo".to_string()],
            created_at: Utc::now(),
            updated_at: Utc::now(),
            author: Author {
                workspace_id: "ws".to_string(),
                client_id: "cli".to_string(),
            },
            inputs_schema: serde_json::json!({"type": "object"}),
            output_schema: serde_json::json!({"type": "object"}),
            graph: SkillGraph::default(),
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn round_trip_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path()).await.unwrap();
        let skill = sample_skill("sk1", 1);
        storage.save_skill(&skill).await.unwrap();

        let loaded = storage.load_skill("sk1", None).await.unwrap();
        assert_eq!(loaded.id, skill.id);
        assert_eq!(loaded.version, 1);
        assert_eq!(storage.list_skill_metas().len(), 1);
    }

    #[tokio::test]
    async fn cache_hit_avoids_disk_until_mtime_changes() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path()).await.unwrap();
        storage.save_skill(&sample_skill("sk1", 1)).await.unwrap();

        let _first = storage.load_skill("sk1", None).await.unwrap();
        let (_, misses_before, _) = storage.skill_cache().stats().snapshot();
        let _second = storage.load_skill("sk1", None).await.unwrap();
        let (hits, misses_after, _) = storage.skill_cache().stats().snapshot();
        assert!(hits >= 1);
        assert_eq!(misses_before, misses_after);
    }

    #[tokio::test]
    async fn delete_hard_removes_directory_and_index_entry() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path()).await.unwrap();
        storage.save_skill(&sample_skill("sk1", 1)).await.unwrap();
        storage.delete_skill("sk1", true).await.unwrap();

        assert!(storage.index().get("sk1").is_none());
        assert!(storage.load_skill("sk1", None).await.is_err());
    }

    #[tokio::test]
    async fn corrupt_registry_returns_empty_instead_of_erroring() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(paths::registry_dir(dir.path())).await.unwrap();
        fs::write(paths::registry_path(dir.path()), b"not json").await.unwrap();
        let storage = Storage::open(dir.path()).await.unwrap();
        assert!(storage.load_registry().await.is_empty());
    }
}
