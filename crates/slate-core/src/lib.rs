//! Slate Core Library
//!
//! Constraint model, rule registry, evaluator and isolated workers for
//! scoring sports schedules.

pub mod aggregate;
pub mod config;
pub mod constraint;
pub mod domain;
pub mod evaluator;
pub mod metrics;
pub mod obs;
pub mod rules;
pub mod telemetry;
pub mod travel;
pub mod worker;

pub use aggregate::{aggregate_results, AggregateSummary, CriticalFailure, ScheduleEvaluation};
pub use config::{EvaluatorConfig, OrchestratorConfig, SlateConfig, WorkerPoolConfig};
pub use constraint::{
    Constraint, EvaluationHistory, HistoryEntry, Rule, RuleError, RuleOutcome, RuleViolation,
    HISTORY_CAPACITY,
};
pub use domain::{
    Condition, ConditionOperator, ConstraintCategory, ConstraintDefinition, ConstraintPriority,
    ConstraintScope, DefinitionError, EvaluationContext, EvaluationResult, EvaluationStatus, Game,
    Location, ResolutionStrategy, Result, Schedule, ScheduleMetrics, SlateError, Sport, Team,
    Venue,
};
pub use evaluator::{CacheStats, ConstraintEvaluator};
pub use metrics::{EvaluatorMetrics, MetricsSnapshot};
pub use obs::{
    emit_constraint_timed_out, emit_evaluation_finished, emit_evaluation_started,
    emit_optimization_finished, emit_strategy_completed, emit_worker_fault, evaluation_span,
    EvaluationSpan,
};
pub use rules::RuleRegistry;
pub use telemetry::init_tracing;
pub use worker::{
    serve, LocalWorker, LocalWorkerFactory, PoolEvaluation, ProcessWorker, ProcessWorkerFactory,
    RuntimeConfig, TaskOptions, WorkerError, WorkerMessage, WorkerPool, WorkerRequest,
};

/// Slate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
