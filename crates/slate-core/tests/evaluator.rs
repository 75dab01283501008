//! Batch evaluation over real rules: ordering, isolation, aggregation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::json;
use slate_core::{
    Constraint, ConstraintCategory, ConstraintDefinition, ConstraintEvaluator, ConstraintScope,
    EvaluationContext, EvaluationStatus, EvaluatorConfig, Game, Location, Rule, RuleError,
    RuleOutcome, RuleRegistry, Schedule, Sport, Team,
};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 9, d).unwrap()
}

/// Four teams, one back-to-back for `a`, one double booking on day 3.
fn schedule() -> Arc<Schedule> {
    let teams = vec![
        Team::new("a", "Anchors", Location::new(40.0, -74.0)),
        Team::new("b", "Bisons", Location::new(42.9, -78.9)),
        Team::new("c", "Comets", Location::new(41.5, -81.7)),
        Team::new("d", "Drakes", Location::new(39.9, -75.2)),
    ];
    Arc::new(Schedule::new(Sport::Basketball, teams).with_games(vec![
        Game::new("a", "b", day(1)),
        Game::new("c", "d", day(1)),
        Game::new("a", "c", day(2)),
        Game::new("b", "d", day(3)),
        Game::new("d", "b", day(3)),
    ]))
}

fn build(registry: &RuleRegistry, value: serde_json::Value) -> Arc<Constraint> {
    Arc::new(Constraint::from_json(value, registry).unwrap())
}

#[derive(Debug)]
struct PanicsOnContext;

#[async_trait]
impl Rule for PanicsOnContext {
    fn kind(&self) -> &str {
        "panics_on_context"
    }

    fn applies_in_context(&self, _context: &EvaluationContext) -> bool {
        panic!("context hook exploded");
    }

    async fn evaluate(&self, _: &Schedule, _: &EvaluationContext) -> Result<RuleOutcome, RuleError> {
        Ok(RuleOutcome::checked(0))
    }
}

#[derive(Debug)]
struct Slow;

#[async_trait]
impl Rule for Slow {
    fn kind(&self) -> &str {
        "slow"
    }

    async fn evaluate(&self, _: &Schedule, _: &EvaluationContext) -> Result<RuleOutcome, RuleError> {
        tokio::time::sleep(Duration::from_millis(400)).await;
        Ok(RuleOutcome::checked(1))
    }
}

fn constraints(registry: &RuleRegistry) -> Vec<Arc<Constraint>> {
    vec![
        build(
            registry,
            json!({ "id": "rest", "type": "rest_days", "scope": "team", "category": "soft",
                    "parameters": { "minDays": 2 }, "weight": 2.0 }),
        ),
        build(
            registry,
            json!({ "id": "double", "type": "no_double_booking", "scope": "team", "category": "hard" }),
        ),
        build(
            registry,
            json!({ "id": "off", "type": "unique_matchups", "scope": "schedule", "category": "hard",
                    "isActive": false }),
        ),
        build(
            registry,
            json!({ "id": "meetings", "type": "unique_matchups", "scope": "schedule", "category": "soft" }),
        ),
    ]
}

#[tokio::test]
async fn test_parallel_batch_preserves_order_and_skips_inactive() {
    let registry = RuleRegistry::with_builtin_rules();
    let evaluator = ConstraintEvaluator::new(EvaluatorConfig {
        max_concurrency: 2,
        ..EvaluatorConfig::default()
    });
    let results = evaluator
        .evaluate_constraints(&constraints(&registry), &schedule(), &EvaluationContext::new())
        .await;

    let ids: Vec<_> = results.iter().map(|r| r.constraint_id.as_str()).collect();
    assert_eq!(ids, vec!["rest", "double", "meetings"]);
    for r in &results {
        assert_eq!(r.weighted_penalty, r.penalty * r.weight);
    }
}

#[tokio::test]
async fn test_sequential_and_parallel_agree() {
    let registry = RuleRegistry::with_builtin_rules();
    let sequential = ConstraintEvaluator::new(EvaluatorConfig {
        parallel: false,
        ..EvaluatorConfig::default()
    });
    let parallel = ConstraintEvaluator::default();
    let s = schedule();
    let ctx = EvaluationContext::new();

    let a = sequential.evaluate_constraints(&constraints(&registry), &s, &ctx).await;
    let b = parallel.evaluate_constraints(&constraints(&registry), &s, &ctx).await;
    let summary = |rs: &[slate_core::EvaluationResult]| {
        rs.iter()
            .map(|r| (r.constraint_id.clone(), r.status, r.penalty))
            .collect::<Vec<_>>()
    };
    assert_eq!(summary(&a), summary(&b));
}

#[tokio::test]
async fn test_hard_violation_invalidates_schedule() {
    let registry = RuleRegistry::with_builtin_rules();
    let evaluation = ConstraintEvaluator::default()
        .evaluate_schedule(&schedule(), &constraints(&registry), &EvaluationContext::new())
        .await;

    let summary = &evaluation.summary;
    assert!(!summary.valid);
    assert_eq!(summary.total_constraints, 3);
    assert!(summary
        .critical_failures
        .iter()
        .any(|f| f.constraint_id == "double"));
    // b and d meet twice on day 3.
    assert!(summary
        .worst_violations
        .iter()
        .any(|r| r.constraint_id == "meetings"));
}

#[tokio::test]
async fn test_soft_only_violations_keep_schedule_valid() {
    let registry = RuleRegistry::with_builtin_rules();
    let soft = vec![build(
        &registry,
        json!({ "id": "rest", "type": "rest_days", "scope": "team", "category": "soft",
                "parameters": { "minDays": 2 } }),
    )];
    let evaluation = ConstraintEvaluator::default()
        .evaluate_schedule(&schedule(), &soft, &EvaluationContext::new())
        .await;
    assert!(evaluation.summary.valid);
    assert!(evaluation.summary.total_weighted_penalty > 0.0);
}

#[tokio::test]
async fn test_task_panic_is_isolated_to_its_constraint() {
    let registry = RuleRegistry::with_builtin_rules()
        .with_rule("panics_on_context", |_| Ok(Arc::new(PanicsOnContext) as Arc<dyn Rule>));
    let mut batch = constraints(&registry);
    batch.insert(
        1,
        build(
            &registry,
            json!({ "id": "bomb", "type": "panics_on_context", "scope": "schedule", "category": "soft" }),
        ),
    );

    // No timeout: the evaluation runs directly inside the batch task, so
    // the panic escapes the constraint and fails the task itself.
    let evaluator = ConstraintEvaluator::new(EvaluatorConfig {
        timeout_ms: 0,
        ..EvaluatorConfig::default()
    });
    let results = evaluator
        .evaluate_constraints(&batch, &schedule(), &EvaluationContext::new())
        .await;

    let ids: Vec<_> = results.iter().map(|r| r.constraint_id.as_str()).collect();
    assert_eq!(ids, vec!["rest", "bomb", "double", "meetings"]);
    assert_eq!(results[1].status, EvaluationStatus::Error);
    assert_eq!(results[1].penalty, 0.0);
    assert!(results
        .iter()
        .filter(|r| r.constraint_id != "bomb")
        .all(|r| r.status != EvaluationStatus::Error));
    assert_eq!(evaluator.get_metrics().failed_evaluations, 1);
}

#[tokio::test]
async fn test_timeout_does_not_block_siblings() {
    let registry = RuleRegistry::with_builtin_rules();
    let mut batch = constraints(&registry);
    let slow = ConstraintDefinition::new("slow", "slow", ConstraintScope::Schedule, ConstraintCategory::Soft);
    batch.push(Arc::new(Constraint::new(slow, Arc::new(Slow)).unwrap()));

    let evaluator = ConstraintEvaluator::new(EvaluatorConfig {
        timeout_ms: 50,
        ..EvaluatorConfig::default()
    });
    let results = evaluator
        .evaluate_constraints(&batch, &schedule(), &EvaluationContext::new())
        .await;

    let slow = results.iter().find(|r| r.constraint_id == "slow").unwrap();
    assert_eq!(slow.status, EvaluationStatus::Error);
    assert!(slow.message.contains("50ms"));
    assert_eq!(results.len(), 4);
    assert_eq!(evaluator.get_metrics().timeouts, 1);
}

#[tokio::test]
async fn test_repeat_batch_served_from_cache() {
    let registry = RuleRegistry::with_builtin_rules();
    let evaluator = ConstraintEvaluator::default();
    let batch = constraints(&registry);
    let s = schedule();
    let ctx = EvaluationContext::new().with("season", json!({ "phase": "regular" }));

    let first = evaluator.evaluate_constraints(&batch, &s, &ctx).await;
    let second = evaluator.evaluate_constraints(&batch, &s, &ctx).await;

    assert!(second.iter().all(|r| r.cached_at.is_some()));
    for (a, b) in first.iter().zip(&second) {
        assert_eq!((a.status, a.penalty), (b.status, b.penalty));
    }
    assert_eq!(evaluator.get_metrics().cache_hits, 3);
    assert_eq!(evaluator.cache_stats().entries, 3);
}
