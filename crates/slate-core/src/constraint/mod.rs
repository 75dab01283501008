//! Evaluable constraints.
//!
//! A [`Constraint`] pairs a validated [`ConstraintDefinition`] with the
//! [`Rule`] that scores it, plus a bounded history of past evaluations.
//! Evaluation never returns an error: rule failures, panics and failed
//! guards all become an [`EvaluationResult`].

pub mod history;
pub mod rule;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use futures::FutureExt;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::domain::{
    ConstraintCategory, ConstraintDefinition, DefinitionError, EvaluationContext,
    EvaluationResult, EvaluationStatus, Schedule,
};
use crate::rules::RuleRegistry;

pub use history::{EvaluationHistory, HistoryEntry, HISTORY_CAPACITY};
pub use rule::{Rule, RuleError, RuleOutcome, RuleViolation};

/// A rule definition bound to its scoring implementation.
#[derive(Debug)]
pub struct Constraint {
    definition: ConstraintDefinition,
    rule: Arc<dyn Rule>,
    history: Mutex<EvaluationHistory>,
}

impl Constraint {
    /// Bind a definition to an explicit rule. Fails if the definition is invalid.
    pub fn new(definition: ConstraintDefinition, rule: Arc<dyn Rule>) -> Result<Self, DefinitionError> {
        definition.validate()?;
        Ok(Self {
            definition,
            rule,
            history: Mutex::new(EvaluationHistory::default()),
        })
    }

    /// Build through the registry, which resolves `type` and parses parameters.
    pub fn from_definition(
        definition: ConstraintDefinition,
        registry: &RuleRegistry,
    ) -> Result<Self, DefinitionError> {
        definition.validate()?;
        let rule = registry.build(&definition)?;
        Self::new(definition, rule)
    }

    pub fn from_json(value: Value, registry: &RuleRegistry) -> Result<Self, DefinitionError> {
        let definition: ConstraintDefinition = serde_json::from_value(value)?;
        Self::from_definition(definition, registry)
    }

    pub fn id(&self) -> &str {
        &self.definition.id
    }

    pub fn version(&self) -> &str {
        &self.definition.version
    }

    pub fn category(&self) -> ConstraintCategory {
        self.definition.category
    }

    pub fn weight(&self) -> f64 {
        self.definition.weight
    }

    pub fn is_active(&self) -> bool {
        self.definition.is_active
    }

    pub fn definition(&self) -> &ConstraintDefinition {
        &self.definition
    }

    pub fn rule(&self) -> &Arc<dyn Rule> {
        &self.rule
    }

    /// Score `schedule` in `context`.
    ///
    /// Inactive constraints short-circuit to `NOT_APPLICABLE` without
    /// touching history. Every other outcome is appended to history.
    pub async fn evaluate(&self, schedule: &Schedule, context: &EvaluationContext) -> EvaluationResult {
        if !self.definition.is_active {
            return self.not_applicable("constraint is inactive");
        }

        let start = Instant::now();
        let outcome = if !self.rule.applies_in_context(context) {
            self.not_applicable("rule does not apply in this context")
        } else if let Some(failed) = self.definition.conditions.iter().find(|c| !c.holds(context)) {
            self.not_applicable(format!("condition on '{}' not met", failed.field))
        } else {
            match AssertUnwindSafe(self.rule.evaluate(schedule, context))
                .catch_unwind()
                .await
            {
                Ok(Ok(outcome)) => self.score(outcome),
                Ok(Err(e)) => {
                    warn!(constraint_id = %self.definition.id, error = %e, "rule evaluation failed");
                    self.error(
                        format!("evaluation failed: {e}"),
                        json!({ "kind": "rule_error", "error": e.to_string() }),
                    )
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    warn!(constraint_id = %self.definition.id, panic = %message, "rule panicked");
                    self.error(
                        format!("evaluation panicked: {message}"),
                        json!({ "kind": "panic", "error": message }),
                    )
                }
            }
        };
        let result = outcome.with_duration_ms(start.elapsed().as_millis() as u64);

        debug!(
            constraint_id = %self.definition.id,
            status = ?result.status,
            weighted_penalty = result.weighted_penalty,
            "constraint evaluated"
        );
        self.record(&result, context);
        result
    }

    fn score(&self, mut outcome: RuleOutcome) -> EvaluationResult {
        if let Some(reason) = outcome.not_applicable.take() {
            return self.not_applicable(reason);
        }

        let violation_count = outcome.violations.len();
        let status = if violation_count == 0 {
            EvaluationStatus::Satisfied
        } else if self.definition.category == ConstraintCategory::Hard {
            EvaluationStatus::Violated
        } else if violation_count < outcome.checked {
            EvaluationStatus::PartiallySatisfied
        } else {
            EvaluationStatus::Violated
        };

        let message = if violation_count == 0 {
            format!("satisfied ({} checked)", outcome.checked)
        } else {
            format!("{} violation(s) across {} checked", violation_count, outcome.checked)
        };

        let penalty = self.definition.penalty * outcome.total_severity();
        EvaluationResult::new(
            &self.definition.id,
            self.definition.category,
            status,
            penalty,
            self.definition.weight,
            message,
            json!({
                "kind": self.rule.kind(),
                "checked": outcome.checked,
                "violationCount": violation_count,
                "violations": outcome.violations,
                "extra": outcome.details,
            }),
        )
    }

    fn not_applicable(&self, reason: impl Into<String>) -> EvaluationResult {
        EvaluationResult::not_applicable(
            &self.definition.id,
            self.definition.category,
            self.definition.weight,
            reason,
        )
    }

    fn error(&self, message: String, details: Value) -> EvaluationResult {
        EvaluationResult::error(
            &self.definition.id,
            self.definition.category,
            self.definition.weight,
            message,
            details,
        )
    }

    fn record(&self, result: &EvaluationResult, context: &EvaluationContext) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(HistoryEntry {
                result: result.clone(),
                context: context.clone(),
            });
    }

    /// Snapshot of the evaluation history, oldest first.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn history_len(&self) -> usize {
        self.history.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// The only way history is ever fully cleared.
    pub fn reset_history(&self) {
        self.history.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Condition, ConditionOperator, ConstraintScope, Game, Location, Sport, Team};
    use async_trait::async_trait;
    use chrono::NaiveDate;

    #[derive(Debug)]
    struct FixedRule {
        checked: usize,
        violations: usize,
    }

    #[async_trait]
    impl Rule for FixedRule {
        fn kind(&self) -> &str {
            "fixed"
        }

        async fn evaluate(&self, _: &Schedule, _: &EvaluationContext) -> Result<RuleOutcome, RuleError> {
            let violations = (0..self.violations)
                .map(|i| RuleViolation::new(format!("team-{i}"), "broken"))
                .collect();
            Ok(RuleOutcome::checked(self.checked).with_violations(violations))
        }
    }

    #[derive(Debug)]
    struct FailingRule;

    #[async_trait]
    impl Rule for FailingRule {
        fn kind(&self) -> &str {
            "failing"
        }

        async fn evaluate(&self, _: &Schedule, _: &EvaluationContext) -> Result<RuleOutcome, RuleError> {
            Err(RuleError::Failed("database unavailable".to_string()))
        }
    }

    #[derive(Debug)]
    struct PanickingRule;

    #[async_trait]
    impl Rule for PanickingRule {
        fn kind(&self) -> &str {
            "panicking"
        }

        async fn evaluate(&self, _: &Schedule, _: &EvaluationContext) -> Result<RuleOutcome, RuleError> {
            panic!("index out of range");
        }
    }

    fn schedule() -> Schedule {
        let day = NaiveDate::from_ymd_opt(2026, 10, 1).unwrap();
        Schedule::new(
            Sport::Soccer,
            vec![
                Team::new("a", "A", Location::default()),
                Team::new("b", "B", Location::default()),
            ],
        )
        .with_games(vec![Game::new("a", "b", day)])
    }

    fn def(category: ConstraintCategory) -> ConstraintDefinition {
        ConstraintDefinition::new("c1", "fixed", ConstraintScope::Team, category)
            .with_weight(2.0)
            .with_penalty(5.0)
    }

    fn constraint(category: ConstraintCategory, rule: impl Rule + 'static) -> Constraint {
        Constraint::new(def(category), Arc::new(rule)).unwrap()
    }

    #[tokio::test]
    async fn test_inactive_constraint_is_not_applicable_without_history() {
        let c = Constraint::new(
            def(ConstraintCategory::Hard).inactive(),
            Arc::new(FixedRule { checked: 4, violations: 4 }),
        )
        .unwrap();
        let result = c.evaluate(&schedule(), &EvaluationContext::new()).await;
        assert_eq!(result.status, EvaluationStatus::NotApplicable);
        assert_eq!(result.penalty, 0.0);
        assert_eq!(c.history_len(), 0);
    }

    #[tokio::test]
    async fn test_failed_condition_is_not_applicable() {
        let c = Constraint::new(
            def(ConstraintCategory::Soft).with_condition(Condition::new(
                "sport",
                ConditionOperator::Eq,
                json!("football"),
            )),
            Arc::new(FixedRule { checked: 4, violations: 4 }),
        )
        .unwrap();
        let ctx = EvaluationContext::new().with("sport", json!("soccer"));
        let result = c.evaluate(&schedule(), &ctx).await;
        assert_eq!(result.status, EvaluationStatus::NotApplicable);
        assert!(result.message.contains("sport"));
        assert_eq!(c.history_len(), 1);
    }

    #[tokio::test]
    async fn test_penalty_scales_with_violations_and_weight() {
        let c = constraint(ConstraintCategory::Soft, FixedRule { checked: 4, violations: 2 });
        let result = c.evaluate(&schedule(), &EvaluationContext::new()).await;
        assert_eq!(result.status, EvaluationStatus::PartiallySatisfied);
        assert_eq!(result.penalty, 10.0);
        assert_eq!(result.weighted_penalty, 20.0);
        assert_eq!(result.details["violationCount"], json!(2));
    }

    #[tokio::test]
    async fn test_hard_constraint_with_one_violation_is_violated() {
        let c = constraint(ConstraintCategory::Hard, FixedRule { checked: 10, violations: 1 });
        let result = c.evaluate(&schedule(), &EvaluationContext::new()).await;
        assert_eq!(result.status, EvaluationStatus::Violated);
    }

    #[tokio::test]
    async fn test_soft_constraint_violated_everywhere_is_violated() {
        let c = constraint(ConstraintCategory::Soft, FixedRule { checked: 3, violations: 3 });
        let result = c.evaluate(&schedule(), &EvaluationContext::new()).await;
        assert_eq!(result.status, EvaluationStatus::Violated);
    }

    #[tokio::test]
    async fn test_rule_error_becomes_error_result() {
        let c = constraint(ConstraintCategory::Hard, FailingRule);
        let result = c.evaluate(&schedule(), &EvaluationContext::new()).await;
        assert_eq!(result.status, EvaluationStatus::Error);
        assert_eq!(result.penalty, 0.0);
        assert_eq!(result.details["kind"], json!("rule_error"));
        assert!(result.message.contains("database unavailable"));
        assert_eq!(c.history_len(), 1);
    }

    #[tokio::test]
    async fn test_panicking_rule_becomes_error_result() {
        let c = constraint(ConstraintCategory::Soft, PanickingRule);
        let result = c.evaluate(&schedule(), &EvaluationContext::new()).await;
        assert_eq!(result.status, EvaluationStatus::Error);
        assert_eq!(result.details["kind"], json!("panic"));
        assert!(result.message.contains("index out of range"));
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let c = constraint(ConstraintCategory::Soft, FixedRule { checked: 1, violations: 0 });
        let sched = schedule();
        for _ in 0..(HISTORY_CAPACITY + 20) {
            c.evaluate(&sched, &EvaluationContext::new()).await;
        }
        assert_eq!(c.history_len(), HISTORY_CAPACITY);
        c.reset_history();
        assert_eq!(c.history_len(), 0);
    }

    #[test]
    fn test_invalid_definition_fails_construction() {
        let err = Constraint::new(
            def(ConstraintCategory::Soft).with_penalty(f64::NAN),
            Arc::new(FixedRule { checked: 0, violations: 0 }),
        )
        .unwrap_err();
        assert!(err.to_string().contains("penalty"));
    }
}
