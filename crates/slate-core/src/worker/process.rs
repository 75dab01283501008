//! Child-process worker speaking newline-delimited JSON over stdio.
//!
//! The child's stderr is inherited so its logs reach the parent's terminal.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::debug;

use super::{await_ready, WorkerError, WorkerFactory, WorkerMessage, WorkerRequest, WorkerTransport};

pub struct ProcessWorker {
    id: String,
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl ProcessWorker {
    /// Launch `program` with `args`, passing the worker id in `SLATE_WORKER_ID`.
    pub fn spawn(id: impl Into<String>, program: &Path, args: &[String]) -> Result<Self, WorkerError> {
        let id = id.into();
        let mut child = Command::new(program)
            .args(args)
            .env("SLATE_WORKER_ID", &id)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| WorkerError::Spawn(format!("{}: {e}", program.display())))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| WorkerError::Spawn("child stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| WorkerError::Spawn("child stdout unavailable".to_string()))?;
        debug!(worker_id = %id, pid = ?child.id(), "worker process spawned");

        Ok(Self {
            id,
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        })
    }

    /// Wait for the child to exit and return its exit code.
    pub async fn wait(mut self) -> Result<Option<i32>, WorkerError> {
        drop(self.stdin);
        Ok(self.child.wait().await?.code())
    }
}

#[async_trait]
impl WorkerTransport for ProcessWorker {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send(&mut self, request: WorkerRequest) -> Result<(), WorkerError> {
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|_| WorkerError::TransportClosed)?;
        self.stdin
            .flush()
            .await
            .map_err(|_| WorkerError::TransportClosed)
    }

    async fn recv(&mut self) -> Result<WorkerMessage, WorkerError> {
        loop {
            match self.stdout.next_line().await? {
                None => return Err(WorkerError::TransportClosed),
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => return Ok(serde_json::from_str(&line)?),
            }
        }
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }
}

/// Spawns [`ProcessWorker`]s from one executable.
#[derive(Debug, Clone)]
pub struct ProcessWorkerFactory {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessWorkerFactory {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }
}

#[async_trait]
impl WorkerFactory for ProcessWorkerFactory {
    async fn spawn(&self, worker_id: String) -> Result<Box<dyn WorkerTransport>, WorkerError> {
        let mut worker = ProcessWorker::spawn(worker_id, &self.program, &self.args)?;
        await_ready(&mut worker).await?;
        Ok(Box::new(worker))
    }
}
