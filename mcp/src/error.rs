use thiserror::Error;

#[derive(Debug, Error)]
pub enum McpError {
    #[error(transparent)]
    Transport(#[from] skillflow_transport::TransportError),

    #[error("server not registered: {0}")]
    NotRegistered(String),

    #[error("server disabled: {0}")]
    Disabled(String),

    #[error("discovery failed for {server_id}: {reason}")]
    Discovery { server_id: String, reason: String },

    #[error("invalid config: {0}")]
    Config(String),
}

pub type McpResult<T> = Result<T, McpError>;
