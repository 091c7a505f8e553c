//! Worker subsystem.
//!
//! # Data Flow
//! ```text
//! channel (child stdin, or in-memory pipe)
//!     → first line: configuration → validate → Worker (handler.rs)
//!     → every later line: RequestDescriptor
//!         → spawned task: rule → upstream → upstream.rs forward
//!         → ReplyDescriptor → single writer task → channel
//! ```
//!
//! # Design Decisions
//! - Configuration is fixed at startup; invalid configuration ends the worker
//!   before any request is read, which the dispatcher observes as a closed link
//! - Requests are handled concurrently, so replies leave in completion order
//! - A worker never answers with anything but a reply descriptor; failures
//!   become error codes, not crashes

pub mod handler;
pub mod upstream;

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use crate::config::ConfigError;
use crate::error::ProxyError;
use crate::protocol::{codec, ReplyDescriptor};

pub use handler::Worker;

/// Replies buffered between request tasks and the writer.
const REPLY_QUEUE: usize = 1024;

/// Run a worker over a byte channel until the dispatcher closes it.
pub async fn serve<R, W>(worker_id: usize, reader: R, writer: W) -> Result<(), ProxyError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut lines = BufReader::new(reader).lines();

    let first = lines
        .next_line()
        .await?
        .ok_or_else(|| ConfigError::Parse("channel closed before configuration arrived".into()))?;
    let config = codec::decode_config(&first).map_err(|e| ConfigError::Parse(e.to_string()))?;
    let worker = match Worker::from_config(worker_id, &config) {
        Ok(worker) => Arc::new(worker),
        Err(e) => {
            tracing::error!(worker = worker_id, error = %e, "Worker configuration rejected");
            return Err(e);
        }
    };

    tracing::info!(
        worker = worker_id,
        rules = config.server.rules.len(),
        upstreams = config.server.upstreams.len(),
        "Worker ready"
    );

    let (reply_tx, reply_rx) = mpsc::channel(REPLY_QUEUE);
    let writer_task = tokio::spawn(write_replies(worker_id, writer, reply_rx));

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let worker = worker.clone();
        let reply_tx = reply_tx.clone();
        tokio::spawn(async move {
            if let Some(reply) = worker.handle_line(&line).await {
                if reply_tx.send(reply).await.is_err() {
                    tracing::debug!(worker = worker.id(), "Reply dropped, writer is gone");
                }
            }
        });
    }

    tracing::info!(worker = worker_id, "Dispatcher closed the channel, draining");
    drop(reply_tx);
    writer_task
        .await
        .map_err(|e| ProxyError::Io(std::io::Error::other(e)))?
}

async fn write_replies<W>(
    worker_id: usize,
    mut writer: W,
    mut replies: mpsc::Receiver<ReplyDescriptor>,
) -> Result<(), ProxyError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(reply) = replies.recv().await {
        let line = match codec::encode(&reply) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!(worker = worker_id, error = %e, "Failed to encode reply");
                continue;
            }
        };
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
    writer.shutdown().await?;
    Ok(())
}
