//! A fixed-size pool of isolated workers.
//!
//! Each call partitions the active constraints into one contiguous chunk
//! per worker, dispatches the chunks concurrently and concatenates the
//! results in chunk order, so the output follows the input order. A chunk
//! whose worker fails comes back as per-constraint `ERROR` results; the
//! dead worker is replaced before the next call.
//!
//! Definitions are checked against the pool's [`RuleRegistry`] before
//! anything is dispatched; an invalid one fails the whole call.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use super::{
    EarlyTermination, TaskOptions, WorkerError, WorkerFactory, WorkerHealth, WorkerMessage,
    WorkerRequest, WorkerStats, WorkerTask, WorkerTransport,
};
use crate::aggregate::ScheduleEvaluation;
use crate::config::WorkerPoolConfig;
use crate::domain::{
    ConstraintDefinition, DefinitionError, EvaluationContext, EvaluationResult, Schedule,
};
use crate::obs;
use crate::rules::RuleRegistry;

type Slot = Option<Box<dyn WorkerTransport>>;

/// Pool-level result: the merged evaluation plus what happened per worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PoolEvaluation {
    #[serde(flatten)]
    pub evaluation: ScheduleEvaluation,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub early_terminations: Vec<EarlyTermination>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_workers: Vec<String>,
}

struct ChunkOutcome {
    results: Vec<EvaluationResult>,
    early_termination: Option<EarlyTermination>,
    failed_worker: Option<String>,
}

impl ChunkOutcome {
    fn failed(definitions: &[ConstraintDefinition], worker_id: &str, message: &str) -> Self {
        let results = definitions
            .iter()
            .map(|d| {
                EvaluationResult::error(
                    &d.id,
                    d.category,
                    d.weight,
                    message,
                    json!({ "kind": "worker_failure", "workerId": worker_id }),
                )
            })
            .collect();
        Self {
            results,
            early_termination: None,
            failed_worker: Some(worker_id.to_string()),
        }
    }
}

pub struct WorkerPool {
    config: WorkerPoolConfig,
    factory: Arc<dyn WorkerFactory>,
    registry: Arc<RuleRegistry>,
    slots: Vec<Slot>,
    next_task: u64,
    respawned: u64,
}

impl WorkerPool {
    /// Spawn `config.workers` workers and wait until each is ready.
    pub async fn start(
        config: WorkerPoolConfig,
        factory: Arc<dyn WorkerFactory>,
    ) -> Result<Self, WorkerError> {
        let size = config.workers.max(1);
        let spawned = join_all((0..size).map(|i| factory.spawn(worker_id(i)))).await;
        let slots = spawned
            .into_iter()
            .map(|w| w.map(Some))
            .collect::<Result<Vec<_>, _>>()?;
        info!(workers = size, "worker pool started");
        Ok(Self {
            config,
            factory,
            registry: Arc::new(RuleRegistry::with_builtin_rules()),
            slots,
            next_task: 0,
            respawned: 0,
        })
    }

    /// Registry used to vet definitions before dispatch. It should know
    /// every rule type the workers know.
    pub fn with_registry(mut self, registry: Arc<RuleRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// Workers replaced since the pool started.
    pub fn respawned(&self) -> u64 {
        self.respawned
    }

    pub fn live_workers(&mut self) -> usize {
        self.slots
            .iter_mut()
            .filter_map(|s| s.as_mut())
            .map(|w| w.is_alive())
            .filter(|&alive| alive)
            .count()
    }

    /// Evaluate `definitions` against `schedule` across the pool.
    ///
    /// Fails before dispatch if any definition is invalid or names a rule
    /// type the registry does not know.
    #[instrument(skip_all, fields(schedule_id = %schedule.id, constraints = definitions.len()))]
    pub async fn evaluate(
        &mut self,
        schedule: &Schedule,
        definitions: &[ConstraintDefinition],
        context: &EvaluationContext,
        options: &TaskOptions,
    ) -> Result<PoolEvaluation, DefinitionError> {
        for definition in definitions {
            definition.validate()?;
            self.registry.build(definition)?;
        }

        let start = Instant::now();
        let active: Vec<ConstraintDefinition> =
            definitions.iter().filter(|d| d.is_active).cloned().collect();

        if active.is_empty() {
            return Ok(PoolEvaluation {
                evaluation: ScheduleEvaluation::new(Vec::new(), 0),
                early_terminations: Vec::new(),
                failed_workers: Vec::new(),
            });
        }
        self.ensure_workers().await;

        let chunk_size = active.len().div_ceil(self.slots.len());
        let tasks: Vec<WorkerTask> = active
            .chunks(chunk_size)
            .map(|chunk| {
                self.next_task += 1;
                WorkerTask {
                    task_id: format!("task-{}", self.next_task),
                    constraints: chunk.to_vec(),
                    schedule: schedule.clone(),
                    context: context.clone(),
                    options: options.clone(),
                }
            })
            .collect();
        debug!(chunks = tasks.len(), chunk_size, "dispatching chunks");

        let outcomes = join_all(
            self.slots
                .iter_mut()
                .zip(tasks)
                .map(|(slot, task)| run_chunk(slot, task)),
        )
        .await;

        let mut results = Vec::with_capacity(active.len());
        let mut early_terminations = Vec::new();
        let mut failed_workers = Vec::new();
        for outcome in outcomes {
            results.extend(outcome.results);
            early_terminations.extend(outcome.early_termination);
            failed_workers.extend(outcome.failed_worker);
        }

        Ok(PoolEvaluation {
            evaluation: ScheduleEvaluation::new(results, start.elapsed().as_millis() as u64),
            early_terminations,
            failed_workers,
        })
    }

    /// Ask every live worker for its health. Unresponsive workers are dropped.
    pub async fn health_check(&mut self) -> Vec<WorkerHealth> {
        let mut reports = Vec::new();
        for slot in &mut self.slots {
            let Some(worker) = slot.as_mut() else {
                continue;
            };
            match request_health(&mut **worker).await {
                Ok(health) => reports.push(health),
                Err(e) => {
                    obs::emit_worker_fault(worker.id(), &e);
                    *slot = None;
                }
            }
        }
        reports
    }

    /// Stop every worker gracefully, returning their final stats.
    pub async fn shutdown(mut self) -> Vec<WorkerStats> {
        let mut stats = Vec::new();
        for worker in self.slots.iter_mut().filter_map(|s| s.as_mut()) {
            if worker.send(WorkerRequest::Shutdown).await.is_err() {
                continue;
            }
            loop {
                match worker.recv().await {
                    Ok(WorkerMessage::Shutdown { stats: s, .. }) => {
                        stats.push(s);
                        break;
                    }
                    Ok(_) => continue,
                    Err(_) => break,
                }
            }
        }
        info!(workers = stats.len(), "worker pool stopped");
        stats
    }

    async fn ensure_workers(&mut self) {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            let alive = slot.as_mut().is_some_and(|w| w.is_alive());
            if alive {
                continue;
            }
            *slot = None;
            if !self.config.respawn {
                continue;
            }
            match self.factory.spawn(worker_id(i)).await {
                Ok(worker) => {
                    info!(worker_id = %worker.id(), "worker respawned");
                    self.respawned += 1;
                    *slot = Some(worker);
                }
                Err(e) => warn!(worker_id = %worker_id(i), error = %e, "worker respawn failed"),
            }
        }
    }
}

fn worker_id(index: usize) -> String {
    format!("worker-{index}")
}

async fn run_chunk(slot: &mut Slot, task: WorkerTask) -> ChunkOutcome {
    let Some(worker) = slot.as_mut() else {
        return ChunkOutcome::failed(&task.constraints, "unavailable", "no live worker for this chunk");
    };
    let worker_id = worker.id().to_string();
    let task_id = task.task_id.clone();
    let definitions = task.constraints.clone();

    if let Err(e) = worker.send(WorkerRequest::Task(task)).await {
        obs::emit_worker_fault(&worker_id, &e);
        *slot = None;
        return ChunkOutcome::failed(&definitions, &worker_id, &format!("worker unreachable: {e}"));
    }

    loop {
        match worker.recv().await {
            Ok(WorkerMessage::Progress(p)) => {
                debug!(worker_id = %worker_id, completed = p.completed, total = p.total, "progress");
            }
            Ok(WorkerMessage::TaskResult(report)) if report.task_id == task_id => {
                return ChunkOutcome {
                    results: report.result.results,
                    early_termination: report.early_termination,
                    failed_worker: None,
                };
            }
            Ok(WorkerMessage::TaskError {
                task_id: failed,
                message,
                ..
            }) if failed == task_id => {
                return ChunkOutcome::failed(
                    &definitions,
                    &worker_id,
                    &format!("worker task failed: {message}"),
                );
            }
            Ok(WorkerMessage::Error { error_type, message }) => {
                obs::emit_worker_fault(&worker_id, &message);
                *slot = None;
                return ChunkOutcome::failed(
                    &definitions,
                    &worker_id,
                    &format!("worker crashed ({error_type:?}): {message}"),
                );
            }
            Ok(_) => continue,
            Err(e) => {
                obs::emit_worker_fault(&worker_id, &e);
                *slot = None;
                return ChunkOutcome::failed(&definitions, &worker_id, &format!("worker lost: {e}"));
            }
        }
    }
}

async fn request_health(worker: &mut dyn WorkerTransport) -> Result<WorkerHealth, WorkerError> {
    worker.send(WorkerRequest::HealthCheck).await?;
    loop {
        if let WorkerMessage::HealthResponse(health) = worker.recv().await? {
            return Ok(health);
        }
    }
}
