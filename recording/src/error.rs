use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordingError {
    #[error("no active session: {0}")]
    SessionNotActive(String),

    #[error(transparent)]
    Storage(#[from] skillflow_storage::StorageError),

    #[error("invalid expose-param source_path: {0}")]
    InvalidSourcePath(String),
}

pub type RecordingResult<T> = Result<T, RecordingError>;
