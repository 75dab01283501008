//! Structured observability hooks for evaluation and optimization runs.
//!
//! This module provides:
//! - Run-scoped tracing spans via the `EvaluationSpan` RAII guard
//! - Emission functions for lifecycle events: evaluation start/finish,
//!   timeouts, worker faults, strategy and optimization completion
//!
//! Events are emitted at `info!` level, faults at `warn!`.

use tracing::{info, warn};

/// RAII guard that enters a run-scoped span for the duration of an evaluation.
///
/// ```ignore
/// let _span = EvaluationSpan::enter("eval-12345");
/// // tracing calls below carry evaluation_id = "eval-12345"
/// ```
pub struct EvaluationSpan {
    _span: tracing::span::EnteredSpan,
}

impl EvaluationSpan {
    pub fn enter(evaluation_id: &str) -> Self {
        Self {
            _span: evaluation_span(evaluation_id).entered(),
        }
    }
}

/// The span behind [`EvaluationSpan`], for attaching to futures with
/// `tracing::Instrument` where a guard cannot be held across `.await`.
pub fn evaluation_span(evaluation_id: &str) -> tracing::Span {
    tracing::info_span!("slate.evaluation", evaluation_id = %evaluation_id)
}

pub fn emit_evaluation_started(evaluation_id: &str, schedule_id: &str, constraints: usize) {
    info!(
        event = "evaluation.started",
        evaluation_id = %evaluation_id,
        schedule_id = %schedule_id,
        constraints = constraints,
    );
}

pub fn emit_evaluation_finished(
    evaluation_id: &str,
    duration_ms: u64,
    total_weighted_penalty: f64,
    valid: bool,
) {
    info!(
        event = "evaluation.finished",
        evaluation_id = %evaluation_id,
        duration_ms = duration_ms,
        total_weighted_penalty = total_weighted_penalty,
        valid = valid,
    );
}

/// Emit event: a constraint exceeded its deadline and is still running detached.
pub fn emit_constraint_timed_out(constraint_id: &str, timeout_ms: u64) {
    warn!(event = "constraint.timed_out", constraint_id = %constraint_id, timeout_ms = timeout_ms);
}

pub fn emit_worker_fault(worker_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "worker.fault", worker_id = %worker_id, error = %error);
}

pub fn emit_strategy_completed(algorithm: &str, score: f64, travel_km: f64) {
    info!(
        event = "strategy.completed",
        algorithm = %algorithm,
        score = score,
        travel_km = travel_km,
    );
}

pub fn emit_optimization_finished(schedule_id: &str, algorithm: &str, duration_ms: u64, score: f64) {
    info!(
        event = "optimization.finished",
        schedule_id = %schedule_id,
        algorithm = %algorithm,
        duration_ms = duration_ms,
        score = score,
    );
}
