//! Constraint evaluator.
//!
//! Evaluates one or many constraints against a schedule with caching,
//! per-constraint deadlines, bounded-concurrency batches and metrics.
//! Nothing here returns an error to the caller: every failure mode
//! (rule error, panic, timeout, task failure) becomes an `ERROR`
//! [`EvaluationResult`] for the constraint it belongs to.

pub mod cache;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde_json::json;
use tracing::{debug, instrument, warn, Instrument};
use uuid::Uuid;

use crate::aggregate::{aggregate_results, AggregateSummary, ScheduleEvaluation};
use crate::config::EvaluatorConfig;
use crate::constraint::Constraint;
use crate::domain::digest::digest_of;
use crate::domain::{EvaluationContext, EvaluationResult, Schedule};
use crate::metrics::{EvaluatorMetrics, MetricsSnapshot};
use crate::obs;

pub use cache::{CacheKey, CacheStats, EvaluationCache};

/// Content digests shared by every constraint in one batch call.
#[derive(Debug, Clone, Default)]
struct Digests {
    schedule: Option<String>,
    context: Option<String>,
}

impl Digests {
    fn compute(schedule: &Schedule, context: &EvaluationContext) -> Self {
        let digest = |what: &str, r: crate::Result<String>| match r {
            Ok(d) => Some(d),
            Err(e) => {
                warn!(error = %e, "cannot digest {what}; evaluating uncached");
                None
            }
        };
        Self {
            schedule: digest("schedule", digest_of(schedule)),
            context: digest("context", digest_of(context)),
        }
    }

    fn key(&self, constraint: &Constraint) -> Option<CacheKey> {
        Some(CacheKey {
            constraint_id: constraint.id().to_string(),
            version: constraint.version().to_string(),
            schedule_digest: self.schedule.clone()?,
            context_digest: self.context.clone()?,
        })
    }
}

#[derive(Debug)]
struct Inner {
    config: EvaluatorConfig,
    cache: Mutex<EvaluationCache>,
    metrics: EvaluatorMetrics,
}

/// Cheap to clone; clones share the cache and metrics.
#[derive(Debug, Clone)]
pub struct ConstraintEvaluator {
    inner: Arc<Inner>,
}

impl Default for ConstraintEvaluator {
    fn default() -> Self {
        Self::new(EvaluatorConfig::default())
    }
}

impl ConstraintEvaluator {
    pub fn new(config: EvaluatorConfig) -> Self {
        let cache = EvaluationCache::new(config.cache_capacity, config.cache_ttl());
        Self {
            inner: Arc::new(Inner {
                config,
                cache: Mutex::new(cache),
                metrics: EvaluatorMetrics::new(),
            }),
        }
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.inner.config
    }

    /// Evaluate a single constraint, consulting the cache first.
    pub async fn evaluate_constraint(
        &self,
        constraint: &Arc<Constraint>,
        schedule: &Arc<Schedule>,
        context: &EvaluationContext,
    ) -> EvaluationResult {
        let digests = if self.inner.config.caching {
            Digests::compute(schedule, context)
        } else {
            Digests::default()
        };
        self.evaluate_one(constraint, schedule, context, &digests).await
    }

    /// Evaluate every active constraint. Inactive constraints are skipped
    /// and do not appear in the output; the rest keep their input order.
    #[instrument(skip_all, fields(schedule_id = %schedule.id, constraints = constraints.len()))]
    pub async fn evaluate_constraints(
        &self,
        constraints: &[Arc<Constraint>],
        schedule: &Arc<Schedule>,
        context: &EvaluationContext,
    ) -> Vec<EvaluationResult> {
        let active: Vec<&Arc<Constraint>> = constraints.iter().filter(|c| c.is_active()).collect();
        let digests = if self.inner.config.caching {
            Digests::compute(schedule, context)
        } else {
            Digests::default()
        };

        if !self.inner.config.parallel {
            let mut results = Vec::with_capacity(active.len());
            for constraint in active {
                results.push(self.evaluate_one(constraint, schedule, context, &digests).await);
            }
            return results;
        }

        let batch_size = self.inner.config.max_concurrency.max(1);
        let mut results = Vec::with_capacity(active.len());
        for (index, batch) in active.chunks(batch_size).enumerate() {
            debug!(batch = index, size = batch.len(), "evaluating batch");
            let handles: Vec<_> = batch
                .iter()
                .map(|&constraint| {
                    let evaluator = self.clone();
                    let constraint = Arc::clone(constraint);
                    let schedule = Arc::clone(schedule);
                    let context = context.clone();
                    let digests = digests.clone();
                    tokio::spawn(async move {
                        evaluator
                            .evaluate_one(&constraint, &schedule, &context, &digests)
                            .await
                    })
                })
                .collect();

            // Positional join: output order follows input order, not completion.
            for (constraint, joined) in batch.iter().zip(futures::future::join_all(handles).await) {
                results.push(match joined {
                    Ok(result) => result,
                    Err(e) => {
                        warn!(constraint_id = %constraint.id(), error = %e, "evaluation task failed");
                        self.inner.metrics.record_evaluation(false, 0.0);
                        task_failure(constraint, &e)
                    }
                });
            }
        }
        results
    }

    /// Evaluate and aggregate in one call.
    pub async fn evaluate_schedule(
        &self,
        schedule: &Arc<Schedule>,
        constraints: &[Arc<Constraint>],
        context: &EvaluationContext,
    ) -> ScheduleEvaluation {
        let evaluation_id = Uuid::new_v4().to_string();
        obs::emit_evaluation_started(&evaluation_id, &schedule.id, constraints.len());

        let start = Instant::now();
        let results = self
            .evaluate_constraints(constraints, schedule, context)
            .instrument(obs::evaluation_span(&evaluation_id))
            .await;
        let evaluation = ScheduleEvaluation::new(results, start.elapsed().as_millis() as u64);

        obs::emit_evaluation_finished(
            &evaluation_id,
            evaluation.duration_ms,
            evaluation.summary.total_weighted_penalty,
            evaluation.summary.valid,
        );
        evaluation
    }

    pub fn aggregate_results(&self, results: &[EvaluationResult]) -> AggregateSummary {
        aggregate_results(results)
    }

    pub fn get_metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Zero the metrics. The cache is untouched.
    pub fn reset_metrics(&self) {
        self.inner.metrics.reset();
    }

    pub fn flush_metrics(&self) {
        self.inner.metrics.flush();
    }

    /// Empty the cache. Metrics are untouched.
    pub fn clear_cache(&self) {
        self.lock_cache().clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.lock_cache().stats()
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, EvaluationCache> {
        self.inner.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn evaluate_one(
        &self,
        constraint: &Arc<Constraint>,
        schedule: &Arc<Schedule>,
        context: &EvaluationContext,
        digests: &Digests,
    ) -> EvaluationResult {
        let key = if self.inner.config.caching {
            digests.key(constraint)
        } else {
            None
        };

        if let Some(key) = &key {
            let cached = self.lock_cache().get(key);
            if let Some(hit) = cached {
                self.inner.metrics.inc_cache_hit();
                debug!(constraint_id = %constraint.id(), "cache hit");
                return hit;
            }
            self.inner.metrics.inc_cache_miss();
        }

        let start = Instant::now();
        let result = match self.inner.config.timeout() {
            None => constraint.evaluate(schedule, context).await,
            Some(timeout) => self.evaluate_with_deadline(constraint, schedule, context, timeout).await,
        };
        self.inner
            .metrics
            .record_evaluation(!result.is_error(), start.elapsed().as_secs_f64() * 1000.0);

        if let Some(key) = key {
            if !result.is_error() {
                self.lock_cache().insert(key, result.clone());
            }
        }
        result
    }

    /// Race the evaluation against `timeout`. On expiry the task is left to
    /// finish in the background and counted in the in-flight gauge.
    async fn evaluate_with_deadline(
        &self,
        constraint: &Arc<Constraint>,
        schedule: &Arc<Schedule>,
        context: &EvaluationContext,
        timeout: Duration,
    ) -> EvaluationResult {
        let mut handle = {
            let constraint = Arc::clone(constraint);
            let schedule = Arc::clone(schedule);
            let context = context.clone();
            tokio::spawn(async move { constraint.evaluate(&schedule, &context).await })
        };

        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => task_failure(constraint, &e),
            Err(_) => {
                let timeout_ms = timeout.as_millis() as u64;
                obs::emit_constraint_timed_out(constraint.id(), timeout_ms);
                self.inner.metrics.inc_timeouts();
                self.inner.metrics.timed_out_task_started();

                let inner = Arc::clone(&self.inner);
                tokio::spawn(async move {
                    let _ = handle.await;
                    inner.metrics.timed_out_task_finished();
                });

                EvaluationResult::error(
                    constraint.id(),
                    constraint.category(),
                    constraint.weight(),
                    format!("evaluation timed out after {timeout_ms}ms"),
                    json!({ "kind": "timeout", "timeoutMs": timeout_ms }),
                )
            }
        }
    }
}

fn task_failure(constraint: &Constraint, error: &tokio::task::JoinError) -> EvaluationResult {
    let detail = if error.is_panic() {
        "evaluation task panicked".to_string()
    } else {
        format!("evaluation task failed: {error}")
    };
    EvaluationResult::error(
        constraint.id(),
        constraint.category(),
        constraint.weight(),
        detail.clone(),
        json!({ "kind": "task_failure", "error": detail }),
    )
}
