//! One dispatcher-side connection to a worker.
//!
//! A link owns the write half of the worker channel (through a writer task)
//! and the correlation table filled by [`WorkerLink::call`] and drained by the
//! reader task. Replies complete exactly their own pending entry, in whatever
//! order the worker produces them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};
use tokio::time;

use crate::error::ProxyError;
use crate::observability::metrics;
use crate::protocol::{codec, ReplyDescriptor, RequestDescriptor};

/// Lines queued for the writer task.
const OUTBOUND_QUEUE: usize = 1024;

type Pending = HashMap<String, oneshot::Sender<ReplyDescriptor>>;

#[derive(Debug)]
struct LinkState {
    pending: Mutex<Pending>,
    alive: AtomicBool,
    mismatches: AtomicUsize,
}

impl LinkState {
    fn pending(&self) -> std::sync::MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a pending request. Refused once the link is down so nothing
    /// waits on a table that will never be drained again.
    fn register(&self, correlation_id: String, tx: oneshot::Sender<ReplyDescriptor>) -> bool {
        let mut pending = self.pending();
        if !self.alive.load(Ordering::SeqCst) {
            return false;
        }
        pending.insert(correlation_id, tx);
        true
    }

    fn complete(&self, worker: usize, reply: ReplyDescriptor) {
        let waiter = self.pending().remove(&reply.correlation_id);
        match waiter {
            Some(tx) => {
                // Receiver gone means the client already left.
                let _ = tx.send(reply);
            }
            None => {
                self.mismatches.fetch_add(1, Ordering::Relaxed);
                let err = ProxyError::CorrelationMismatch(reply.correlation_id);
                tracing::warn!(worker, error = %err, "Dropping unmatched reply");
                metrics::record_correlation_mismatch(worker);
            }
        }
    }

    fn deliver(&self, worker: usize, line: &str) {
        match codec::decode_reply(line) {
            Ok(reply) => {
                let reply = match reply.validate() {
                    Ok(()) => reply,
                    Err(e) => {
                        tracing::warn!(worker, correlation_id = %reply.correlation_id, error = %e, "Invalid reply descriptor");
                        ReplyDescriptor::failure(reply.correlation_id, &e)
                    }
                };
                self.complete(worker, reply);
            }
            Err(malformed) => match malformed.correlation_id {
                Some(id) => {
                    tracing::warn!(worker, correlation_id = %id, error = %malformed.error, "Malformed reply descriptor");
                    self.complete(worker, ReplyDescriptor::failure(id, &malformed.error));
                }
                None => {
                    tracing::warn!(worker, error = %malformed.error, "Dropping reply without correlation id");
                }
            },
        }
    }

    /// Mark the link down and fail everything in flight.
    fn close(&self, worker: usize, reason: &str) {
        let was_alive = self.alive.swap(false, Ordering::SeqCst);
        let failed = {
            let mut pending = self.pending();
            let failed = pending.len();
            // Dropping the senders wakes every waiter with a closed channel.
            pending.clear();
            failed
        };
        if was_alive {
            tracing::error!(worker, reason, failed, "Worker link down");
        }
    }
}

/// Removes the pending entry when the caller stops waiting for any reason.
struct PendingGuard<'a> {
    state: &'a LinkState,
    correlation_id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.state.pending().remove(self.correlation_id);
    }
}

#[derive(Debug)]
pub struct WorkerLink {
    id: usize,
    outbound: mpsc::Sender<String>,
    state: Arc<LinkState>,
    child: Mutex<Option<Child>>,
}

impl WorkerLink {
    /// Attach to a worker channel and start the reader and writer tasks.
    pub fn connect<R, W>(id: usize, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let state = Arc::new(LinkState {
            pending: Mutex::new(HashMap::new()),
            alive: AtomicBool::new(true),
            mismatches: AtomicUsize::new(0),
        });
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);

        tokio::spawn(read_replies(id, reader, state.clone()));
        tokio::spawn(write_lines(id, writer, outbound_rx, state.clone()));

        Self {
            id,
            outbound,
            state,
            child: Mutex::new(None),
        }
    }

    /// Tie a child process to this link; it is killed when the link drops.
    pub fn with_child(self, child: Child) -> Self {
        *self.child.lock().unwrap_or_else(PoisonError::into_inner) = Some(child);
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn is_alive(&self) -> bool {
        self.state.alive.load(Ordering::SeqCst)
    }

    pub fn pending_count(&self) -> usize {
        self.state.pending().len()
    }

    /// Replies dropped because no caller was waiting for their id.
    pub fn mismatch_count(&self) -> usize {
        self.state.mismatches.load(Ordering::Relaxed)
    }

    /// Queue a raw line, used for the configuration handshake.
    pub async fn send_line(&self, line: String) -> Result<(), ProxyError> {
        self.outbound
            .send(line)
            .await
            .map_err(|_| self.unavailable("channel closed"))
    }

    /// Send one request and wait for the reply carrying the same correlation id.
    /// The deadline covers queueing the line as well as the wait, so a worker
    /// that stops reading cannot stall callers.
    pub async fn call(&self, request: RequestDescriptor, timeout: Duration) -> Result<ReplyDescriptor, ProxyError> {
        let line = codec::encode(&request)?;
        let correlation_id = request.correlation_id;

        let (tx, rx) = oneshot::channel();
        if !self.state.register(correlation_id.clone(), tx) {
            return Err(self.unavailable("link down"));
        }
        let _guard = PendingGuard {
            state: &self.state,
            correlation_id: &correlation_id,
        };

        let exchange = async {
            self.send_line(line).await?;
            metrics::record_worker_dispatch(self.id);
            metrics::record_pending(self.id, self.pending_count());
            rx.await.map_err(|_| self.unavailable("link down"))
        };

        match time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    worker = self.id,
                    correlation_id = %correlation_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Worker reply timed out"
                );
                Err(self.unavailable("timed out"))
            }
        }
    }

    fn unavailable(&self, reason: &'static str) -> ProxyError {
        ProxyError::WorkerUnavailable { worker: self.id, reason }
    }
}

async fn read_replies<R>(worker: usize, reader: R, state: Arc<LinkState>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => state.deliver(worker, &line),
            Ok(None) => {
                state.close(worker, "channel closed");
                return;
            }
            Err(e) => {
                tracing::debug!(worker, error = %e, "Worker read failed");
                state.close(worker, "read failed");
                return;
            }
        }
    }
}

async fn write_lines<W>(worker: usize, mut writer: W, mut lines: mpsc::Receiver<String>, state: Arc<LinkState>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = lines.recv().await {
        let written = async {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await
        }
        .await;
        if let Err(e) = written {
            tracing::debug!(worker, error = %e, "Worker write failed");
            state.close(worker, "write failed");
            return;
        }
    }
    // Link dropped: closing our half lets the worker drain and exit.
    let _ = writer.shutdown().await;
}
