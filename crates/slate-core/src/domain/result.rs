//! Per-constraint evaluation results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::constraint::ConstraintCategory;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvaluationStatus {
    Satisfied,
    Violated,
    PartiallySatisfied,
    NotApplicable,
    Error,
}

impl EvaluationStatus {
    /// Statuses that never carry a penalty.
    pub fn is_penalty_free(&self) -> bool {
        matches!(self, EvaluationStatus::NotApplicable | EvaluationStatus::Error)
    }

    pub fn is_violation(&self) -> bool {
        matches!(
            self,
            EvaluationStatus::Violated | EvaluationStatus::PartiallySatisfied
        )
    }
}

/// Outcome of evaluating one constraint against one schedule.
///
/// # Invariants
///
/// `weighted_penalty == penalty * weight`, and `NotApplicable`/`Error`
/// results always carry a zero penalty. Both hold for every value built
/// through the constructors below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub constraint_id: String,
    pub category: ConstraintCategory,
    pub status: EvaluationStatus,
    pub penalty: f64,
    pub weight: f64,
    pub weighted_penalty: f64,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub details: Value,
    #[serde(default)]
    pub duration_ms: u64,
    /// Set when this result was served from the evaluation cache.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_at: Option<DateTime<Utc>>,
}

impl EvaluationResult {
    pub fn new(
        constraint_id: impl Into<String>,
        category: ConstraintCategory,
        status: EvaluationStatus,
        penalty: f64,
        weight: f64,
        message: impl Into<String>,
        details: Value,
    ) -> Self {
        let penalty = if status.is_penalty_free() { 0.0 } else { penalty };
        Self {
            constraint_id: constraint_id.into(),
            category,
            status,
            penalty,
            weight,
            weighted_penalty: penalty * weight,
            message: message.into(),
            timestamp: Utc::now(),
            details,
            duration_ms: 0,
            cached_at: None,
        }
    }

    pub fn not_applicable(
        constraint_id: impl Into<String>,
        category: ConstraintCategory,
        weight: f64,
        reason: impl Into<String>,
    ) -> Self {
        Self::new(
            constraint_id,
            category,
            EvaluationStatus::NotApplicable,
            0.0,
            weight,
            reason,
            Value::Null,
        )
    }

    pub fn error(
        constraint_id: impl Into<String>,
        category: ConstraintCategory,
        weight: f64,
        message: impl Into<String>,
        details: Value,
    ) -> Self {
        Self::new(
            constraint_id,
            category,
            EvaluationStatus::Error,
            0.0,
            weight,
            message,
            details,
        )
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn is_hard(&self) -> bool {
        self.category == ConstraintCategory::Hard
    }

    pub fn is_error(&self) -> bool {
        self.status == EvaluationStatus::Error
    }
}
