//! Schedule-level verdicts.
//!
//! Folds per-constraint [`EvaluationResult`]s into an [`AggregateSummary`]:
//! status counts, penalty totals, the worst offenders and the `valid` flag
//! that hard constraints control.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::domain::{EvaluationResult, EvaluationStatus};

/// Number of results kept in [`AggregateSummary::worst_violations`].
pub const WORST_VIOLATIONS_LIMIT: usize = 10;

// ---------------------------------------------------------------------------
// Summary types
// ---------------------------------------------------------------------------

/// A result that should block acceptance or needs operator attention.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CriticalFailure {
    pub constraint_id: String,
    pub status: EvaluationStatus,
    pub message: String,
}

/// Schedule-level verdict over a list of results.
///
/// # Invariants
///
/// `satisfied + violated + partially_satisfied + not_applicable + errors ==
/// total_constraints`. Rates are percentages whose denominator excludes
/// `ERROR` results: a constraint that could not be scored neither satisfies
/// nor violates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AggregateSummary {
    pub total_constraints: usize,
    pub satisfied: usize,
    pub violated: usize,
    pub partially_satisfied: usize,
    pub not_applicable: usize,
    pub errors: usize,
    pub total_penalty: f64,
    pub total_weighted_penalty: f64,
    /// Violated or partially satisfied results, worst first.
    pub worst_violations: Vec<EvaluationResult>,
    pub satisfaction_rate: f64,
    pub violation_rate: f64,
    /// False when any hard constraint is violated, even partially.
    pub valid: bool,
    pub critical_failures: Vec<CriticalFailure>,
    /// `1 / (1 + total_weighted_penalty)`, in (0, 1].
    pub score: f64,
}

/// Aggregate plus the per-constraint detail it was built from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEvaluation {
    pub summary: AggregateSummary,
    pub results: Vec<EvaluationResult>,
    pub duration_ms: u64,
}

impl ScheduleEvaluation {
    pub fn new(results: Vec<EvaluationResult>, duration_ms: u64) -> Self {
        Self {
            summary: aggregate_results(&results),
            results,
            duration_ms,
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Build the [`AggregateSummary`] for `results`.
pub fn aggregate_results(results: &[EvaluationResult]) -> AggregateSummary {
    let mut summary = AggregateSummary {
        total_constraints: results.len(),
        valid: true,
        ..AggregateSummary::default()
    };

    for result in results {
        match result.status {
            EvaluationStatus::Satisfied => summary.satisfied += 1,
            EvaluationStatus::Violated => summary.violated += 1,
            EvaluationStatus::PartiallySatisfied => summary.partially_satisfied += 1,
            EvaluationStatus::NotApplicable => summary.not_applicable += 1,
            EvaluationStatus::Error => summary.errors += 1,
        }
        summary.total_penalty += result.penalty;
        summary.total_weighted_penalty += result.weighted_penalty;

        let hard_violation = result.is_hard() && result.status.is_violation();
        if hard_violation {
            summary.valid = false;
        }
        if hard_violation || result.is_error() {
            summary.critical_failures.push(CriticalFailure {
                constraint_id: result.constraint_id.clone(),
                status: result.status,
                message: result.message.clone(),
            });
        }
    }

    let scored = summary.total_constraints - summary.errors;
    if scored > 0 {
        let scored = scored as f64;
        summary.satisfaction_rate = summary.satisfied as f64 / scored * 100.0;
        summary.violation_rate =
            (summary.violated + summary.partially_satisfied) as f64 / scored * 100.0;
    }

    let mut worst: Vec<&EvaluationResult> =
        results.iter().filter(|r| r.status.is_violation()).collect();
    worst.sort_by(|a, b| {
        b.weighted_penalty
            .partial_cmp(&a.weighted_penalty)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.constraint_id.cmp(&b.constraint_id))
    });
    summary.worst_violations = worst
        .into_iter()
        .take(WORST_VIOLATIONS_LIMIT)
        .cloned()
        .collect();

    summary.score = 1.0 / (1.0 + summary.total_weighted_penalty);
    summary
}
