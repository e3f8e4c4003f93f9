use thiserror::Error;

/// Storage error taxonomy (spec §7): distinct "not found" categories plus
/// corrupt-file handling that degrades rather than crashes the process.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("skill not found: {id}")]
    SkillNotFound { id: String },

    #[error("skill version not found: {id} v{version}")]
    SkillVersionNotFound { id: String, version: u32 },

    #[error("session not found: {id}")]
    SessionNotFound { id: String },

    #[error("run not found: {run_id}")]
    RunNotFound { run_id: String },

    #[error("corrupt file skipped: {path}: {reason}")]
    Corrupt { path: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;
