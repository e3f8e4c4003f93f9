//! Engine error taxonomy: every lower-crate error composes in, plus the
//! execution-specific failures a node or loop can raise (spec §4.H, §7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Storage(#[from] skillflow_storage::StorageError),

    #[error(transparent)]
    Mcp(#[from] skillflow_mcp::McpError),

    #[error(transparent)]
    Skills(#[from] skillflow_skills::SkillsError),

    #[error(transparent)]
    Transform(#[from] skillflow_transform::TransformError),

    #[error("node {node_id} failed: {reason}")]
    NodeFailed { node_id: String, reason: String },

    #[error("loop on node {node_id} exceeded max_iterations ({max})")]
    MaxIterationsExceeded { node_id: String, max: u32 },

    #[error("run {run_id} was cancelled")]
    Cancelled { run_id: String },

    #[error("graph references unknown node id: {0}")]
    UnknownNode(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
