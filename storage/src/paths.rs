//! Filesystem layout under the data root (spec §4.C).

use std::path::{Path, PathBuf};

pub fn skills_dir(root: &Path) -> PathBuf {
    root.join("skills")
}

pub fn skill_dir(root: &Path, skill_id: &str) -> PathBuf {
    skills_dir(root).join(skill_id)
}

pub fn skill_meta_path(root: &Path, skill_id: &str) -> PathBuf {
    skill_dir(root, skill_id).join("meta.json")
}

pub fn skill_version_path(root: &Path, skill_id: &str, version: u32) -> PathBuf {
    skill_dir(root, skill_id).join(format!("v{version:04}.json"))
}

pub fn sessions_dir(root: &Path) -> PathBuf {
    root.join("sessions")
}

pub fn session_path(root: &Path, session_id: &str) -> PathBuf {
    sessions_dir(root).join(format!("{session_id}.json"))
}

pub fn runs_dir(root: &Path) -> PathBuf {
    root.join("runs")
}

pub fn run_log_path(root: &Path, date: &str, run_id: &str) -> PathBuf {
    runs_dir(root).join(date).join(format!("{run_id}.jsonl"))
}

/// Run-level outcome, written once the graph completes (spec §9 open
/// question: `started_at` must come from this persisted record, never
/// be recomputed at query time).
pub fn run_result_path(root: &Path, date: &str, run_id: &str) -> PathBuf {
    runs_dir(root).join(date).join(format!("{run_id}.result.json"))
}

pub fn registry_dir(root: &Path) -> PathBuf {
    root.join("registry")
}

pub fn registry_path(root: &Path) -> PathBuf {
    registry_dir(root).join("servers.json")
}
