//! Isolated evaluation workers.
//!
//! A worker runs batches of constraint evaluations outside the caller's
//! failure domain and talks to it only through the message vocabulary in
//! [`protocol`]. The same [`serve`] loop backs an in-process worker
//! ([`LocalWorker`], its own tokio task) and a child-process worker
//! ([`ProcessWorker`], NDJSON over stdio). [`WorkerPool`] fans a batch out
//! across several workers and replaces the ones that die.

pub mod local;
pub mod pool;
pub mod process;
pub mod protocol;
pub mod runtime;

use async_trait::async_trait;

pub use local::{LocalWorker, LocalWorkerFactory};
pub use pool::{PoolEvaluation, WorkerPool};
pub use process::{ProcessWorker, ProcessWorkerFactory};
pub use protocol::{
    EarlyTermination, FaultKind, ResourceUsage, TaskOptions, TaskProgress, TaskReport,
    WorkerHealth, WorkerMessage, WorkerRequest, WorkerStats, WorkerTask,
};
pub use runtime::{serve, RuntimeConfig};

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("worker transport closed")]
    TransportClosed,

    #[error("protocol error: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("failed to spawn worker: {0}")]
    Spawn(String),

    #[error("worker fault: {0}")]
    Fault(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Caller side of one worker connection.
#[async_trait]
pub trait WorkerTransport: Send {
    fn id(&self) -> &str;

    async fn send(&mut self, request: WorkerRequest) -> Result<(), WorkerError>;

    /// Next message from the worker. `TransportClosed` once it has gone away.
    async fn recv(&mut self) -> Result<WorkerMessage, WorkerError>;

    /// Whether the worker is still running.
    fn is_alive(&mut self) -> bool;
}

/// Creates ready workers for a [`WorkerPool`].
#[async_trait]
pub trait WorkerFactory: Send + Sync {
    async fn spawn(&self, worker_id: String) -> Result<Box<dyn WorkerTransport>, WorkerError>;
}

/// Consume messages until the worker announces itself.
pub async fn await_ready(transport: &mut dyn WorkerTransport) -> Result<(), WorkerError> {
    loop {
        match transport.recv().await? {
            WorkerMessage::Ready { .. } => return Ok(()),
            WorkerMessage::Error { message, .. } => return Err(WorkerError::Fault(message)),
            _ => continue,
        }
    }
}
