use thiserror::Error;

/// Transformation errors (spec §7 "Transformation"): invalid JSONPath or
/// template. These map to node failure one layer up in the engine.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("invalid JSONPath expression {expr}: {reason}")]
    InvalidJsonPath { expr: String, reason: String },

    #[error("template error in {expr}: {reason}")]
    Template { expr: String, reason: String },

    #[error("invalid condition expression: {0}")]
    InvalidCondition(String),

    #[error("unresolvable reference: {0}")]
    UnresolvedReference(String),
}

pub type TransformResult<T> = Result<T, TransformError>;
