//! Top-level error type (spec §7): every crate's error composes in via
//! `#[from]`, collapsed to one taxonomy the façade can redact before a
//! failure reaches a downstream tool-call response (spec §9: "redact
//! internal stack traces from user-visible tool responses by default").

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SkillFlowError {
    #[error(transparent)]
    Storage(#[from] skillflow_storage::StorageError),

    #[error(transparent)]
    Mcp(#[from] skillflow_mcp::McpError),

    #[error(transparent)]
    Skills(#[from] skillflow_skills::SkillsError),

    #[error(transparent)]
    Recording(#[from] skillflow_recording::RecordingError),

    #[error(transparent)]
    Engine(#[from] skillflow_engine::EngineError),

    #[error(transparent)]
    Transform(#[from] skillflow_transform::TransformError),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type SkillFlowResult<T> = Result<T, SkillFlowError>;

impl SkillFlowError {
    /// The taxonomy category (spec §7) a downstream caller is allowed to
    /// see. Never the `Debug` form, never a path or backtrace.
    pub fn category(&self) -> &'static str {
        match self {
            SkillFlowError::Storage(_) => "storage",
            SkillFlowError::Mcp(_) => "connection",
            SkillFlowError::Skills(_) => "validation",
            SkillFlowError::Recording(_) => "execution",
            SkillFlowError::Engine(_) => "execution",
            SkillFlowError::Transform(_) => "transformation",
            SkillFlowError::UnknownTool(_) => "protocol",
            SkillFlowError::InvalidRequest(_) => "protocol",
            SkillFlowError::Io(_) | SkillFlowError::Json(_) | SkillFlowError::Yaml(_) => "protocol",
        }
    }

    /// A message safe to hand back in a tool-call response: the
    /// taxonomy category plus the error's own `Display`. Every crate's
    /// error enum in this workspace already keeps `Display` free of raw
    /// backtraces or filesystem paths, so no further scrubbing is done
    /// here beyond dropping the `Debug` representation.
    pub fn user_message(&self) -> String {
        format!("{}: {}", self.category(), self)
    }
}
