//! Worker protocol and pool behaviour over in-process workers.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::json;
use slate_core::worker::{FaultKind, WorkerTask, WorkerTransport};
use slate_core::{
    ConstraintDefinition, DefinitionError, EvaluationContext, EvaluationStatus, EvaluatorConfig, Game,
    LocalWorker, LocalWorkerFactory, Location, Rule, RuleError, RuleOutcome, RuleRegistry,
    RuntimeConfig, Schedule, Sport, TaskOptions, Team, WorkerError, WorkerMessage, WorkerPool,
    WorkerPoolConfig, WorkerRequest,
};

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

fn registry() -> Arc<RuleRegistry> {
    Arc::new(
        RuleRegistry::with_builtin_rules()
            .with_rule("panics_on_context", |_| Ok(Arc::new(PanicsOnContext) as Arc<dyn Rule>)),
    )
}

/// Evaluations run inline so a panicking hook takes down the task itself.
fn runtime(worker_id: &str) -> RuntimeConfig {
    RuntimeConfig::new(worker_id)
        .with_registry(registry())
        .with_evaluator(EvaluatorConfig {
            timeout_ms: 0,
            ..EvaluatorConfig::default()
        })
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
}

fn schedule() -> Schedule {
    let teams = vec![
        Team::new("a", "Anchors", Location::new(40.0, -74.0)),
        Team::new("b", "Bisons", Location::new(42.9, -78.9)),
        Team::new("c", "Comets", Location::new(41.5, -81.7)),
        Team::new("d", "Drakes", Location::new(39.9, -75.2)),
    ];
    Schedule::new(Sport::Soccer, teams).with_games(vec![
        Game::new("a", "b", day(1)),
        Game::new("c", "d", day(1)),
        Game::new("a", "c", day(2)),
        Game::new("d", "b", day(2)),
        Game::new("a", "d", day(5)),
        Game::new("b", "c", day(5)),
    ])
}

fn definition(value: serde_json::Value) -> ConstraintDefinition {
    serde_json::from_value(value).unwrap()
}

/// Seven cheap definitions; `rest` is violated by a and c.
fn definitions() -> Vec<ConstraintDefinition> {
    let mut defs = vec![
        definition(json!({ "id": "rest", "type": "rest_days", "scope": "team", "category": "hard",
                           "parameters": { "minDays": 2 }, "weight": 10.0 })),
        definition(json!({ "id": "double", "type": "no_double_booking", "scope": "team", "category": "hard" })),
        definition(json!({ "id": "meetings", "type": "unique_matchups", "scope": "schedule", "category": "soft" })),
    ];
    for i in 0..4 {
        defs.push(definition(json!({
            "id": format!("balance-{i}"), "type": "home_away_balance", "scope": "team",
            "category": "soft", "parameters": { "maxDifference": 3 }
        })));
    }
    defs
}

fn bomb() -> ConstraintDefinition {
    definition(json!({ "id": "bomb", "type": "panics_on_context", "scope": "schedule", "category": "soft" }))
}

fn task(task_id: &str, constraints: Vec<ConstraintDefinition>) -> WorkerTask {
    WorkerTask {
        task_id: task_id.to_string(),
        constraints,
        schedule: schedule(),
        context: EvaluationContext::new(),
        options: TaskOptions::default(),
    }
}

async fn ready(worker_id: &str) -> LocalWorker {
    let mut worker = LocalWorker::spawn(runtime(worker_id));
    match worker.recv().await.unwrap() {
        WorkerMessage::Ready { worker_id: id } => assert_eq!(id, worker_id),
        other => panic!("expected ready, got {other:?}"),
    }
    worker
}

#[tokio::test]
async fn test_task_streams_progress_then_result() {
    let mut worker = ready("w-1").await;
    worker
        .send(WorkerRequest::Task(task("t-1", definitions())))
        .await
        .unwrap();

    let mut progress = Vec::new();
    let report = loop {
        match worker.recv().await.unwrap() {
            WorkerMessage::Progress(p) => progress.push((p.completed, p.total)),
            WorkerMessage::TaskResult(report) => break report,
            other => panic!("unexpected message {other:?}"),
        }
    };

    assert_eq!(progress, vec![(5, 7), (7, 7)]);
    assert_eq!(report.task_id, "t-1");
    assert_eq!(report.result.results.len(), 7);
    assert!(report.early_termination.is_none());
    assert!(!report.result.summary.valid);
    assert_eq!(report.stats.tasks_processed, 1);
    assert_eq!(report.stats.constraints_evaluated, 7);

    worker.send(WorkerRequest::Shutdown).await.unwrap();
    match worker.recv().await.unwrap() {
        WorkerMessage::Shutdown { stats, .. } => assert_eq!(stats.tasks_processed, 1),
        other => panic!("expected shutdown, got {other:?}"),
    }
    worker.join().await.unwrap();
}

#[tokio::test]
async fn test_early_termination_stops_the_task() {
    let mut worker = ready("w-2").await;
    let mut t = task("t-early", definitions());
    t.options = TaskOptions::early_termination(1.0);
    worker.send(WorkerRequest::Task(t)).await.unwrap();

    let report = loop {
        if let WorkerMessage::TaskResult(report) = worker.recv().await.unwrap() {
            break report;
        }
    };
    let stop = report.early_termination.expect("threshold crossed on the first constraint");
    assert_eq!((stop.evaluated, stop.total), (1, 7));
    assert_eq!(report.result.results.len(), 1);
    assert_eq!(report.result.results[0].constraint_id, "rest");
}

/// A worker fed an unvetted definition directly still fails only that task.
#[tokio::test]
async fn test_unknown_rule_type_fails_the_task_only() {
    let mut worker = ready("w-3").await;
    let bad = definition(json!({ "id": "x", "type": "no_such_rule", "scope": "team", "category": "soft" }));
    worker
        .send(WorkerRequest::Task(task("t-bad", vec![bad])))
        .await
        .unwrap();

    match worker.recv().await.unwrap() {
        WorkerMessage::TaskError { task_id, stats, .. } => {
            assert_eq!(task_id, "t-bad");
            assert_eq!(stats.tasks_failed, 1);
        }
        other => panic!("expected taskError, got {other:?}"),
    }

    // Still serving.
    worker.send(WorkerRequest::HealthCheck).await.unwrap();
    match worker.recv().await.unwrap() {
        WorkerMessage::HealthResponse(health) => {
            assert_eq!(health.worker_id, "w-3");
            assert!(health.ready);
            assert_eq!(health.queued_tasks, 0);
        }
        other => panic!("expected health, got {other:?}"),
    }
    assert!(worker.is_alive());
}

#[tokio::test]
async fn test_shutdown_settles_every_accepted_task() {
    let mut worker = ready("w-4").await;
    for id in ["t-a", "t-b", "t-c"] {
        worker
            .send(WorkerRequest::Task(task(id, definitions())))
            .await
            .unwrap();
    }
    worker.send(WorkerRequest::Shutdown).await.unwrap();

    let mut settled = Vec::new();
    loop {
        match worker.recv().await.unwrap() {
            WorkerMessage::TaskResult(r) => settled.push(r.task_id),
            WorkerMessage::TaskError { task_id, .. } => settled.push(task_id),
            WorkerMessage::Shutdown { .. } => break,
            _ => {}
        }
    }
    settled.sort();
    assert_eq!(settled, vec!["t-a", "t-b", "t-c"]);
    worker.join().await.unwrap();
}

#[tokio::test]
async fn test_panic_in_task_is_reported_as_fault() {
    let mut worker = ready("w-5").await;
    worker
        .send(WorkerRequest::Task(task("t-boom", vec![bomb()])))
        .await
        .unwrap();

    let (kind, message) = loop {
        match worker.recv().await.unwrap() {
            WorkerMessage::Error { error_type, message } => break (error_type, message),
            WorkerMessage::Progress(_) => continue,
            other => panic!("expected error, got {other:?}"),
        }
    };
    assert_eq!(kind, FaultKind::UncaughtException);
    assert!(message.contains("context hook exploded"));
    assert!(matches!(worker.recv().await, Err(WorkerError::TransportClosed)));
    assert!(matches!(worker.join().await, Err(WorkerError::Fault(_))));
}

#[tokio::test]
async fn test_pool_isolates_crashed_chunk_and_respawns() {
    let factory = Arc::new(LocalWorkerFactory::new(runtime("template")));
    let config = WorkerPoolConfig {
        workers: 2,
        ..WorkerPoolConfig::default()
    };
    let mut pool = WorkerPool::start(config, factory)
        .await
        .unwrap()
        .with_registry(registry());
    assert_eq!(pool.size(), 2);

    // Chunks of two: [rest, double] and [meetings, bomb].
    let mut defs: Vec<_> = definitions().into_iter().take(3).collect();
    defs.push(bomb());
    let ctx = EvaluationContext::new();
    let first = pool
        .evaluate(&schedule(), &defs, &ctx, &TaskOptions::default())
        .await
        .unwrap();

    let results = &first.evaluation.results;
    let ids: Vec<_> = results.iter().map(|r| r.constraint_id.as_str()).collect();
    assert_eq!(ids, vec!["rest", "double", "meetings", "bomb"]);
    assert_ne!(results[0].status, EvaluationStatus::Error);
    assert_ne!(results[1].status, EvaluationStatus::Error);
    assert!(results[2..].iter().all(|r| r.status == EvaluationStatus::Error));
    assert_eq!(results[3].details["kind"], "worker_failure");
    assert_eq!(first.failed_workers, vec!["worker-1".to_string()]);
    assert_eq!(first.evaluation.summary.errors, 2);

    let second = pool
        .evaluate(&schedule(), &definitions(), &ctx, &TaskOptions::default())
        .await
        .unwrap();
    assert_eq!(pool.respawned(), 1);
    assert!(second.failed_workers.is_empty());
    assert_eq!(second.evaluation.results.len(), 7);
    assert!(second
        .evaluation
        .results
        .iter()
        .all(|r| r.status != EvaluationStatus::Error));

    assert_eq!(pool.health_check().await.len(), 2);
    assert_eq!(pool.live_workers(), 2);
    let stats = pool.shutdown().await;
    assert_eq!(stats.len(), 2);
}

#[tokio::test]
async fn test_pool_skips_inactive_definitions() {
    let factory = Arc::new(LocalWorkerFactory::new(runtime("template")));
    let mut pool = WorkerPool::start(WorkerPoolConfig::default(), factory)
        .await
        .unwrap();
    let defs: Vec<_> = definitions().into_iter().map(|d| d.inactive()).collect();
    let out = pool
        .evaluate(&schedule(), &defs, &EvaluationContext::new(), &TaskOptions::default())
        .await
        .unwrap();
    assert!(out.evaluation.results.is_empty());
    assert!(out.evaluation.summary.valid);
    pool.shutdown().await;
}

#[tokio::test]
async fn test_pool_rejects_invalid_definition_before_dispatch() {
    let factory = Arc::new(LocalWorkerFactory::new(runtime("template")));
    let config = WorkerPoolConfig {
        workers: 1,
        ..WorkerPoolConfig::default()
    };
    let mut pool = WorkerPool::start(config, factory).await.unwrap();

    // `rest` is a real hard violation; the typo must not bury it.
    let rest = definitions().remove(0);
    let typo = definition(json!({ "id": "typo", "type": "no_such_rule", "scope": "team", "category": "soft" }));
    let err = pool
        .evaluate(
            &schedule(),
            &[rest.clone(), typo],
            &EvaluationContext::new(),
            &TaskOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DefinitionError::UnknownType { ref id, .. } if id == "typo"));

    let bad_weight = rest.clone().with_weight(-1.0);
    assert!(matches!(
        pool.evaluate(&schedule(), &[bad_weight], &EvaluationContext::new(), &TaskOptions::default())
            .await,
        Err(DefinitionError::InvalidNumber { .. })
    ));

    let out = pool
        .evaluate(&schedule(), &[rest], &EvaluationContext::new(), &TaskOptions::default())
        .await
        .unwrap();
    assert_eq!(out.evaluation.results[0].status, EvaluationStatus::Violated);
    assert!(!out.evaluation.summary.valid);

    // Nothing was dispatched for the rejected calls.
    let stats = pool.shutdown().await;
    assert_eq!(stats[0].tasks_processed, 1);
    assert_eq!(stats[0].tasks_failed, 0);
}
