//! The worker message loop.
//!
//! [`serve`] reads [`WorkerRequest`]s, runs one task at a time in its own
//! spawned tokio task (the panic boundary) and streams [`WorkerMessage`]s
//! back. Tasks that arrive while one is running are queued. Health checks
//! are answered immediately, even mid-task.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use super::protocol::{
    EarlyTermination, FaultKind, ResourceUsage, TaskProgress, TaskReport, WorkerHealth,
    WorkerMessage, WorkerRequest, WorkerStats, WorkerTask,
};
use super::WorkerError;
use crate::aggregate::ScheduleEvaluation;
use crate::config::EvaluatorConfig;
use crate::constraint::{panic_message, Constraint};
use crate::evaluator::ConstraintEvaluator;
use crate::obs;
use crate::rules::RuleRegistry;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub worker_id: String,
    pub evaluator: EvaluatorConfig,
    pub progress_interval: usize,
    pub registry: Arc<RuleRegistry>,
}

impl RuntimeConfig {
    pub fn new(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            evaluator: EvaluatorConfig::default(),
            progress_interval: 5,
            registry: Arc::new(RuleRegistry::with_builtin_rules()),
        }
    }

    pub fn with_evaluator(mut self, evaluator: EvaluatorConfig) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_progress_interval(mut self, every: usize) -> Self {
        self.progress_interval = every.max(1);
        self
    }

    pub fn with_registry(mut self, registry: Arc<RuleRegistry>) -> Self {
        self.registry = registry;
        self
    }
}

/// What a finished task hands back to the loop.
struct Completion {
    task_id: String,
    processing_ms: u64,
    evaluated: usize,
    outcome: Result<(ScheduleEvaluation, Option<EarlyTermination>), String>,
}

/// Run the worker until `shutdown`, a closed request channel, or a fault.
///
/// On a fault an `error` message is emitted and `Err(WorkerError::Fault)`
/// returned; the caller decides whether to respawn.
pub async fn serve(
    mut requests: mpsc::Receiver<WorkerRequest>,
    events: mpsc::Sender<WorkerMessage>,
    config: RuntimeConfig,
) -> Result<(), WorkerError> {
    let started = Instant::now();
    let evaluator = ConstraintEvaluator::new(config.evaluator.clone());
    let (done_tx, mut done_rx) = mpsc::channel::<Result<Completion, JoinError>>(1);
    let mut stats = WorkerStats::default();
    let mut queue: VecDeque<WorkerTask> = VecDeque::new();
    let mut running: Option<String> = None;

    info!(worker_id = %config.worker_id, "worker ready");
    emit(
        &events,
        WorkerMessage::Ready {
            worker_id: config.worker_id.clone(),
        },
    )
    .await?;

    loop {
        tokio::select! {
            request = requests.recv() => match request {
                Some(WorkerRequest::Task(task)) => {
                    if running.is_some() {
                        debug!(task_id = %task.task_id, queued = queue.len() + 1, "task queued");
                        queue.push_back(task);
                    } else {
                        running = Some(start(task, &evaluator, &config, &events, &done_tx));
                    }
                }
                Some(WorkerRequest::HealthCheck) => {
                    let health = WorkerHealth {
                        worker_id: config.worker_id.clone(),
                        ready: running.is_none(),
                        current_task_id: running.clone(),
                        queued_tasks: queue.len(),
                        stats,
                        resource_usage: ResourceUsage {
                            uptime_ms: started.elapsed().as_millis() as u64,
                            pid: std::process::id(),
                        },
                    };
                    emit(&events, WorkerMessage::HealthResponse(health)).await?;
                }
                Some(WorkerRequest::Shutdown) | None => {
                    if running.take().is_some() {
                        match done_rx.recv().await {
                            Some(joined) => settle(joined, &mut stats, &events, &config).await?,
                            None => return Err(WorkerError::TransportClosed),
                        }
                    }
                    for task in queue.drain(..) {
                        stats.tasks_failed += 1;
                        emit(
                            &events,
                            WorkerMessage::TaskError {
                                task_id: task.task_id,
                                message: "worker shut down before the task started".to_string(),
                                processing_time: 0,
                                stats,
                            },
                        )
                        .await?;
                    }
                    info!(worker_id = %config.worker_id, tasks = stats.tasks_processed, "worker shutting down");
                    emit(
                        &events,
                        WorkerMessage::Shutdown {
                            worker_id: config.worker_id.clone(),
                            stats,
                        },
                    )
                    .await?;
                    return Ok(());
                }
            },
            Some(joined) = done_rx.recv() => {
                running = None;
                settle(joined, &mut stats, &events, &config).await?;
                if let Some(next) = queue.pop_front() {
                    running = Some(start(next, &evaluator, &config, &events, &done_tx));
                }
            }
        }
    }
}

/// Spawn the task and a watcher that reports how it ended.
fn start(
    task: WorkerTask,
    evaluator: &ConstraintEvaluator,
    config: &RuntimeConfig,
    events: &mpsc::Sender<WorkerMessage>,
    done: &mpsc::Sender<Result<Completion, JoinError>>,
) -> String {
    let task_id = task.task_id.clone();
    info!(worker_id = %config.worker_id, task_id = %task_id, constraints = task.constraints.len(), "task started");

    let handle = tokio::spawn(run_task(
        task,
        evaluator.clone(),
        Arc::clone(&config.registry),
        events.clone(),
        config.progress_interval.max(1),
    ));
    let done = done.clone();
    tokio::spawn(async move {
        let _ = done.send(handle.await).await;
    });
    task_id
}

async fn settle(
    joined: Result<Completion, JoinError>,
    stats: &mut WorkerStats,
    events: &mpsc::Sender<WorkerMessage>,
    config: &RuntimeConfig,
) -> Result<(), WorkerError> {
    let completion = match joined {
        Ok(completion) => completion,
        Err(e) => {
            let (error_type, message) = if e.is_panic() {
                (FaultKind::UncaughtException, panic_message(&*e.into_panic()))
            } else {
                (FaultKind::UnhandledRejection, e.to_string())
            };
            obs::emit_worker_fault(&config.worker_id, &message);
            emit(
                events,
                WorkerMessage::Error {
                    error_type,
                    message: message.clone(),
                },
            )
            .await?;
            return Err(WorkerError::Fault(message));
        }
    };

    stats.tasks_processed += 1;
    stats.constraints_evaluated += completion.evaluated as u64;
    stats.total_processing_ms += completion.processing_ms;

    let message = match completion.outcome {
        Ok((result, early_termination)) => {
            info!(
                worker_id = %config.worker_id,
                task_id = %completion.task_id,
                duration_ms = completion.processing_ms,
                terminated_early = early_termination.is_some(),
                "task finished"
            );
            WorkerMessage::TaskResult(TaskReport {
                task_id: completion.task_id,
                result,
                processing_time: completion.processing_ms,
                stats: *stats,
                early_termination,
            })
        }
        Err(message) => {
            stats.tasks_failed += 1;
            warn!(worker_id = %config.worker_id, task_id = %completion.task_id, error = %message, "task failed");
            WorkerMessage::TaskError {
                task_id: completion.task_id,
                message,
                processing_time: completion.processing_ms,
                stats: *stats,
            }
        }
    };
    emit(events, message).await
}

async fn run_task(
    task: WorkerTask,
    evaluator: ConstraintEvaluator,
    registry: Arc<RuleRegistry>,
    events: mpsc::Sender<WorkerMessage>,
    progress_interval: usize,
) -> Completion {
    let start = Instant::now();
    let task_id = task.task_id.clone();
    let failed = |message: String| Completion {
        task_id: task_id.clone(),
        processing_ms: start.elapsed().as_millis() as u64,
        evaluated: 0,
        outcome: Err(message),
    };

    let constraints = match task
        .constraints
        .into_iter()
        .map(|d| Constraint::from_definition(d, &registry).map(Arc::new))
        .collect::<Result<Vec<_>, _>>()
    {
        Ok(constraints) => constraints,
        Err(e) => return failed(format!("invalid constraint definition: {e}")),
    };
    if let Err(e) = task.schedule.validate() {
        return failed(e.to_string());
    }

    let schedule = Arc::new(task.schedule);
    let active: Vec<Arc<Constraint>> = constraints.into_iter().filter(|c| c.is_active()).collect();
    let total = active.len();
    let threshold = task.options.threshold();

    let mut results = Vec::with_capacity(total);
    let mut weighted = 0.0;
    let mut violations = 0;
    let mut early_termination = None;
    let progress = |completed: usize, weighted: f64, violations: usize| {
        WorkerMessage::Progress(TaskProgress {
            task_id: task_id.clone(),
            completed,
            total,
            current_score: weighted,
            violation_count: violations,
        })
    };

    for constraint in &active {
        let result = evaluator
            .evaluate_constraint(constraint, &schedule, &task.context)
            .await;
        weighted += result.weighted_penalty;
        if result.status.is_violation() {
            violations += 1;
        }
        results.push(result);

        let completed = results.len();
        let stop = threshold
            .filter(|&t| weighted > t && completed < total)
            .map(|t| EarlyTermination {
                reason: format!("weighted penalty {weighted:.2} exceeded threshold {t:.2}"),
                evaluated: completed,
                total,
            });
        if completed % progress_interval == 0 || completed == total || stop.is_some() {
            let _ = events.send(progress(completed, weighted, violations)).await;
        }
        if stop.is_some() {
            early_termination = stop;
            break;
        }
    }
    if total == 0 {
        let _ = events.send(progress(0, 0.0, 0)).await;
    }

    let processing_ms = start.elapsed().as_millis() as u64;
    Completion {
        task_id: task_id.clone(),
        processing_ms,
        evaluated: results.len(),
        outcome: Ok((ScheduleEvaluation::new(results, processing_ms), early_termination)),
    }
}

async fn emit(events: &mpsc::Sender<WorkerMessage>, message: WorkerMessage) -> Result<(), WorkerError> {
    events
        .send(message)
        .await
        .map_err(|_| WorkerError::TransportClosed)
}
