//! Evaluator counters.
//!
//! Counters are incremented silently at the call site. Call
//! [`EvaluatorMetrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a batch).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

/// Running mean updated incrementally: `avg += (x - avg) / n`.
#[derive(Debug, Default, Clone, Copy)]
struct RunningAverage {
    samples: u64,
    mean: f64,
}

impl RunningAverage {
    fn record(&mut self, value: f64) {
        self.samples += 1;
        self.mean += (value - self.mean) / self.samples as f64;
    }
}

/// Atomic counters owned by one evaluator.
#[derive(Debug, Default)]
pub struct EvaluatorMetrics {
    total_evaluations: AtomicU64,
    successful_evaluations: AtomicU64,
    failed_evaluations: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    timeouts: AtomicU64,
    in_flight_after_timeout: AtomicU64,
    duration: Mutex<RunningAverage>,
}

/// Point-in-time copy of [`EvaluatorMetrics`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub total_evaluations: u64,
    pub successful_evaluations: u64,
    pub failed_evaluations: u64,
    pub average_evaluation_ms: f64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub timeouts: u64,
    /// Timed-out evaluations still running in the background.
    pub in_flight_after_timeout: u64,
}

impl EvaluatorMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one finished (non-cached) evaluation.
    pub fn record_evaluation(&self, success: bool, duration_ms: f64) {
        self.total_evaluations.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_evaluations.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_evaluations.fetch_add(1, Ordering::Relaxed);
        }
        self.duration
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(duration_ms);
        tracing::trace!(metric = "evaluations", success, "counter incremented");
    }

    pub fn inc_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_timeouts(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn timed_out_task_started(&self) {
        self.in_flight_after_timeout.fetch_add(1, Ordering::Relaxed);
    }

    pub fn timed_out_task_finished(&self) {
        // Saturate: a reset may race with a detached task finishing.
        let _ = self.in_flight_after_timeout.fetch_update(
            Ordering::Relaxed,
            Ordering::Relaxed,
            |n| Some(n.saturating_sub(1)),
        );
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let duration = *self.duration.lock().unwrap_or_else(PoisonError::into_inner);
        MetricsSnapshot {
            total_evaluations: self.total_evaluations.load(Ordering::Relaxed),
            successful_evaluations: self.successful_evaluations.load(Ordering::Relaxed),
            failed_evaluations: self.failed_evaluations.load(Ordering::Relaxed),
            average_evaluation_ms: duration.mean,
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            in_flight_after_timeout: self.in_flight_after_timeout.load(Ordering::Relaxed),
        }
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            total_evaluations = s.total_evaluations,
            successful_evaluations = s.successful_evaluations,
            failed_evaluations = s.failed_evaluations,
            average_evaluation_ms = s.average_evaluation_ms,
            cache_hits = s.cache_hits,
            cache_misses = s.cache_misses,
            timeouts = s.timeouts,
            in_flight_after_timeout = s.in_flight_after_timeout,
        );
    }

    /// Zero every counter. The in-flight gauge is left alone because it
    /// tracks live tasks rather than history.
    pub fn reset(&self) {
        self.total_evaluations.store(0, Ordering::Relaxed);
        self.successful_evaluations.store(0, Ordering::Relaxed);
        self.failed_evaluations.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.cache_misses.store(0, Ordering::Relaxed);
        self.timeouts.store(0, Ordering::Relaxed);
        *self.duration.lock().unwrap_or_else(PoisonError::into_inner) = RunningAverage::default();
    }
}
