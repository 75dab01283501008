//! slate-worker - isolated evaluation worker process
//!
//! Reads one JSON [`WorkerRequest`] per line from stdin and writes one JSON
//! [`WorkerMessage`] per line to stdout. Logs go to stderr. Exits with
//! status 1 after reporting a fault so the parent can respawn it.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, warn, Level};

use slate_core::{serve, RuntimeConfig, SlateConfig, WorkerError, WorkerMessage, WorkerRequest};

const CHANNEL_CAPACITY: usize = 64;

#[derive(Parser)]
#[command(name = "slate-worker")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Slate evaluation worker (NDJSON over stdio)", long_about = None)]
struct Args {
    /// Worker id reported in every message
    #[arg(long, env = "SLATE_WORKER_ID", default_value = "worker")]
    id: String,

    /// TOML configuration file
    #[arg(long, env = "SLATE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    slate_core::init_tracing(args.json, level);

    let config = match &args.config {
        Some(path) => SlateConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => SlateConfig::default(),
    };
    let runtime = RuntimeConfig::new(args.id)
        .with_evaluator(config.evaluator)
        .with_progress_interval(config.worker.progress_interval);

    let (request_tx, request_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);

    let reader = tokio::spawn(read_requests(BufReader::new(tokio::io::stdin()), request_tx));
    let writer = tokio::spawn(write_messages(event_rx, tokio::io::stdout()));

    let outcome = serve(request_rx, event_tx, runtime).await;
    // The event sender went with `serve`, so the writer drains and stops.
    writer.await.context("stdout writer panicked")??;
    reader.abort();

    let code = match outcome {
        Ok(()) => 0,
        Err(WorkerError::Fault(message)) => {
            error!(error = %message, "worker fault");
            1
        }
        Err(e) => {
            error!(error = %e, "worker stopped");
            2
        }
    };
    // stdin may still be parked in a blocking read; don't wait for it.
    std::process::exit(code)
}

/// Forward parsed request lines until input ends or `serve` stops listening.
/// Lines that don't parse are logged and skipped.
async fn read_requests<R>(reader: R, requests: mpsc::Sender<WorkerRequest>) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let request = match serde_json::from_str::<WorkerRequest>(&line) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "ignoring malformed request line");
                continue;
            }
        };
        if requests.send(request).await.is_err() {
            break;
        }
    }
    debug!("request stream closed");
    Ok(())
}

/// Write each message as one line, flushing after every message.
async fn write_messages<W>(mut events: mpsc::Receiver<WorkerMessage>, mut out: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = events.recv().await {
        let mut line = serde_json::to_string(&message)?;
        line.push('\n');
        out.write_all(line.as_bytes()).await?;
        out.flush().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use slate_core::worker::WorkerStats;

    #[tokio::test]
    async fn test_read_requests_skips_noise() {
        let input: &[u8] = b"{\"type\":\"healthCheck\"}\n\nnot json\n{\"type\":\"shutdown\"}\n";
        let (tx, mut rx) = mpsc::channel(8);
        read_requests(input, tx).await.unwrap();

        assert_eq!(rx.recv().await, Some(WorkerRequest::HealthCheck));
        assert_eq!(rx.recv().await, Some(WorkerRequest::Shutdown));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_read_requests_stops_when_receiver_gone() {
        let input: &[u8] = b"{\"type\":\"healthCheck\"}\n{\"type\":\"healthCheck\"}\n";
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        read_requests(input, tx).await.unwrap();
    }

    #[tokio::test]
    async fn test_write_messages_frames_lines() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(WorkerMessage::Ready {
            worker_id: "w1".to_string(),
        })
        .await
        .unwrap();
        tx.send(WorkerMessage::Shutdown {
            worker_id: "w1".to_string(),
            stats: WorkerStats::default(),
        })
        .await
        .unwrap();
        drop(tx);

        let mut out = Vec::new();
        write_messages(rx, &mut out).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: WorkerMessage = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(
            first,
            WorkerMessage::Ready {
                worker_id: "w1".to_string()
            }
        );
        assert!(lines[1].contains("\"type\":\"shutdown\""));
    }
}
