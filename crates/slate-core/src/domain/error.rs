//! Domain-level error taxonomy for Slate.

/// Errors produced when a constraint definition is rejected at construction.
///
/// These are the only fatal errors in the evaluation pipeline: a definition
/// that fails here never reaches evaluation.
#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    #[error("constraint definition is missing an id")]
    MissingId,

    #[error("constraint {id}: unknown constraint type '{kind}'")]
    UnknownType { id: String, kind: String },

    #[error("constraint {id}: {field} must be a finite, non-negative number (got {value})")]
    InvalidNumber {
        id: String,
        field: &'static str,
        value: f64,
    },

    #[error("constraint {id}: invalid parameter '{name}': {reason}")]
    InvalidParameter {
        id: String,
        name: String,
        reason: String,
    },

    #[error("malformed constraint definition: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Slate domain errors.
#[derive(Debug, thiserror::Error)]
pub enum SlateError {
    #[error("invalid constraint definition: {0}")]
    Definition(#[from] DefinitionError),

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("cannot digest value: {0}")]
    Digest(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Slate domain operations.
pub type Result<T> = std::result::Result<T, SlateError>;
