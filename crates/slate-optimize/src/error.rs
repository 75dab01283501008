//! Error types for schedule generation and optimization.

use slate_core::{DefinitionError, SlateError};

/// Errors that abort an optimization run.
///
/// Only input problems land here. Insight and suggestion failures are
/// logged and dropped; they never surface as an `OptimizeError`.
#[derive(Debug, thiserror::Error)]
pub enum OptimizeError {
    #[error("need at least 2 teams to build a schedule (got {0})")]
    TooFewTeams(usize),

    #[error("team id '{0}' appears more than once")]
    DuplicateTeam(String),

    #[error("unknown algorithm '{0}'")]
    UnknownAlgorithm(String),

    #[error("invalid rule constraint: {0}")]
    Definition(#[from] DefinitionError),

    #[error("no strategy produced a candidate: {0}")]
    NoCandidate(String),

    #[error("optimization task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Core(#[from] SlateError),
}

/// Result type for optimization operations.
pub type OptimizeResult<T> = std::result::Result<T, OptimizeError>;
