//! Domain models for Slate.
//!
//! Canonical definitions for the core entities:
//! - `Schedule`, `Team`, `Venue`, `Game`: the value objects being scored
//! - `ConstraintDefinition`: serializable rule definition
//! - `EvaluationContext`: caller facts read by conditions and rules
//! - `EvaluationResult`: per-constraint verdict

pub mod constraint;
pub mod context;
pub mod digest;
pub mod error;
pub mod result;
pub mod schedule;

pub use constraint::{
    Condition, ConditionOperator, ConstraintCategory, ConstraintDefinition, ConstraintPriority,
    ConstraintScope, ResolutionStrategy,
};
pub use context::EvaluationContext;
pub use error::{DefinitionError, Result, SlateError};
pub use result::{EvaluationResult, EvaluationStatus};
pub use schedule::{Game, Location, Schedule, ScheduleMetrics, Sport, Team, Venue};
