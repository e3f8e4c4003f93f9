use thiserror::Error;

#[derive(Debug, Error)]
pub enum SkillsError {
    #[error(transparent)]
    Storage(#[from] skillflow_storage::StorageError),

    #[error("invalid skill draft: {0}")]
    InvalidDraft(String),
}

pub type SkillsResult<T> = Result<T, SkillsError>;
