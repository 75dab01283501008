//! In-process worker: the [`serve`] loop on its own tokio task.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::runtime::{serve, RuntimeConfig};
use super::{await_ready, WorkerError, WorkerFactory, WorkerMessage, WorkerRequest, WorkerTransport};

const CHANNEL_CAPACITY: usize = 64;

pub struct LocalWorker {
    id: String,
    requests: mpsc::Sender<WorkerRequest>,
    events: mpsc::Receiver<WorkerMessage>,
    handle: JoinHandle<Result<(), WorkerError>>,
}

impl LocalWorker {
    /// Start a worker. The `ready` message is left in the stream.
    pub fn spawn(config: RuntimeConfig) -> Self {
        let (request_tx, request_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let id = config.worker_id.clone();
        let handle = tokio::spawn(serve(request_rx, event_tx, config));
        Self {
            id,
            requests: request_tx,
            events: event_rx,
            handle,
        }
    }

    /// Wait for the loop to exit and return how it ended.
    pub async fn join(self) -> Result<(), WorkerError> {
        drop(self.requests);
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(WorkerError::Fault(e.to_string())),
        }
    }
}

#[async_trait]
impl WorkerTransport for LocalWorker {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send(&mut self, request: WorkerRequest) -> Result<(), WorkerError> {
        self.requests
            .send(request)
            .await
            .map_err(|_| WorkerError::TransportClosed)
    }

    async fn recv(&mut self) -> Result<WorkerMessage, WorkerError> {
        self.events.recv().await.ok_or(WorkerError::TransportClosed)
    }

    fn is_alive(&mut self) -> bool {
        !self.handle.is_finished()
    }
}

/// Spawns [`LocalWorker`]s sharing one runtime configuration.
#[derive(Debug, Clone)]
pub struct LocalWorkerFactory {
    template: RuntimeConfig,
}

impl LocalWorkerFactory {
    pub fn new(template: RuntimeConfig) -> Self {
        Self { template }
    }
}

#[async_trait]
impl WorkerFactory for LocalWorkerFactory {
    async fn spawn(&self, worker_id: String) -> Result<Box<dyn WorkerTransport>, WorkerError> {
        let mut config = self.template.clone();
        config.worker_id = worker_id;
        let mut worker = LocalWorker::spawn(config);
        await_ready(&mut worker).await?;
        Ok(Box::new(worker))
    }
}
