//! Wire vocabulary between a caller and an isolated worker.
//!
//! Every message is a JSON object tagged by `type`. Transports that cross a
//! process boundary frame one message per line.

use serde::{Deserialize, Serialize};

use crate::aggregate::ScheduleEvaluation;
use crate::domain::{ConstraintDefinition, EvaluationContext, Schedule};

// ---------------------------------------------------------------------------
// Caller -> worker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkerRequest {
    Task(WorkerTask),
    HealthCheck,
    Shutdown,
}

/// One batch of constraints to evaluate against one schedule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkerTask {
    pub task_id: String,
    pub constraints: Vec<ConstraintDefinition>,
    pub schedule: Schedule,
    #[serde(default)]
    pub context: EvaluationContext,
    #[serde(default)]
    pub options: TaskOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskOptions {
    /// Stop once the running weighted penalty exceeds the threshold.
    pub enable_early_termination: bool,
    pub early_termination_threshold: Option<f64>,
}

impl TaskOptions {
    pub fn early_termination(threshold: f64) -> Self {
        Self {
            enable_early_termination: true,
            early_termination_threshold: Some(threshold),
        }
    }

    /// Threshold in force, if early termination is switched on.
    pub fn threshold(&self) -> Option<f64> {
        self.early_termination_threshold
            .filter(|_| self.enable_early_termination)
    }
}

// ---------------------------------------------------------------------------
// Worker -> caller
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum WorkerMessage {
    Ready {
        worker_id: String,
    },
    Progress(TaskProgress),
    TaskResult(TaskReport),
    TaskError {
        task_id: String,
        message: String,
        processing_time: u64,
        stats: WorkerStats,
    },
    HealthResponse(WorkerHealth),
    Shutdown {
        worker_id: String,
        stats: WorkerStats,
    },
    /// An unrecoverable fault; the worker stops after sending it.
    Error {
        error_type: FaultKind,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FaultKind {
    /// The evaluation code panicked.
    UncaughtException,
    /// A task ended without producing an outcome (cancelled or lost).
    UnhandledRejection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskProgress {
    pub task_id: String,
    pub completed: usize,
    pub total: usize,
    /// Running weighted penalty.
    pub current_score: f64,
    pub violation_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskReport {
    pub task_id: String,
    pub result: ScheduleEvaluation,
    pub processing_time: u64,
    pub stats: WorkerStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub early_termination: Option<EarlyTermination>,
}

/// Why a batch stopped before its last constraint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EarlyTermination {
    pub reason: String,
    pub evaluated: usize,
    pub total: usize,
}

/// Cumulative counters for one worker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStats {
    pub tasks_processed: u64,
    pub tasks_failed: u64,
    pub constraints_evaluated: u64,
    pub total_processing_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkerHealth {
    pub worker_id: String,
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task_id: Option<String>,
    pub queued_tasks: usize,
    pub stats: WorkerStats,
    pub resource_usage: ResourceUsage,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceUsage {
    pub uptime_ms: u64,
    pub pid: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_format() {
        let json = serde_json::to_value(WorkerRequest::HealthCheck).unwrap();
        assert_eq!(json, json!({ "type": "healthCheck" }));

        let parsed: WorkerRequest = serde_json::from_value(json!({ "type": "shutdown" })).unwrap();
        assert_eq!(parsed, WorkerRequest::Shutdown);
    }

    #[test]
    fn test_task_request_defaults_options() {
        let parsed: WorkerRequest = serde_json::from_value(json!({
            "type": "task",
            "taskId": "t1",
            "constraints": [],
            "schedule": { "id": "s1", "sport": "hockey" }
        }))
        .unwrap();
        let WorkerRequest::Task(task) = parsed else {
            panic!("expected a task");
        };
        assert_eq!(task.task_id, "t1");
        assert_eq!(task.options.threshold(), None);
    }

    #[test]
    fn test_error_message_tags_fault_kind() {
        let json = serde_json::to_value(WorkerMessage::Error {
            error_type: FaultKind::UncaughtException,
            message: "boom".to_string(),
        })
        .unwrap();
        assert_eq!(
            json,
            json!({ "type": "error", "errorType": "uncaughtException", "message": "boom" })
        );
    }

    #[test]
    fn test_progress_fields_are_camel_case() {
        let json = serde_json::to_value(WorkerMessage::Progress(TaskProgress {
            task_id: "t".to_string(),
            completed: 5,
            total: 10,
            current_score: 2.5,
            violation_count: 1,
        }))
        .unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["currentScore"], 2.5);
        assert_eq!(json["violationCount"], 1);
    }

    #[test]
    fn test_threshold_requires_flag() {
        let opts = TaskOptions {
            enable_early_termination: false,
            early_termination_threshold: Some(3.0),
        };
        assert_eq!(opts.threshold(), None);
        assert_eq!(TaskOptions::early_termination(3.0).threshold(), Some(3.0));
    }
}
