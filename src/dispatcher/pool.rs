//! Fixed pool of worker links.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{duplex, split};
use tokio::process::Command;

use crate::config::ProxyConfig;
use crate::dispatcher::link::WorkerLink;
use crate::error::ProxyError;
use crate::load_balancer::{self, LoadBalancer};
use crate::protocol::codec;
use crate::worker;

/// In-memory pipe capacity for in-process workers.
const PIPE_CAPACITY: usize = 256 * 1024;

/// How worker siblings are started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerMode {
    /// Tokio tasks over in-memory pipes.
    InProcess,
    /// Child processes running `<program> worker --id N` over stdin/stdout.
    Process { program: PathBuf },
}

#[derive(Debug)]
pub struct WorkerPool {
    workers: Vec<Arc<WorkerLink>>,
    balancer: Box<dyn LoadBalancer>,
}

impl WorkerPool {
    /// Start `server.workers` siblings and hand each the configuration as its
    /// first line.
    pub async fn spawn(config: &ProxyConfig, mode: &WorkerMode) -> Result<Self, ProxyError> {
        let config_line = codec::encode_config(config)?;
        let mut workers = Vec::with_capacity(config.server.workers);

        for id in 0..config.server.workers {
            let link = match mode {
                WorkerMode::InProcess => spawn_in_process(id),
                WorkerMode::Process { program } => spawn_process(id, program, &config.observability.log_level)?,
            };
            link.send_line(config_line.clone()).await?;
            workers.push(Arc::new(link));
        }

        tracing::info!(workers = workers.len(), mode = ?mode, "Worker pool started");
        Ok(Self::from_links(workers, load_balancer::from_strategy(config.server.balancing)))
    }

    pub fn from_links(workers: Vec<Arc<WorkerLink>>, balancer: Box<dyn LoadBalancer>) -> Self {
        Self { workers, balancer }
    }

    /// Next worker by the balancing policy. A dead pick is not retried.
    pub fn select(&self) -> Result<Arc<WorkerLink>, ProxyError> {
        let index = self
            .balancer
            .next_index(self.workers.len())
            .ok_or(ProxyError::WorkerUnavailable { worker: 0, reason: "pool is empty" })?;
        let link = &self.workers[index];
        if !link.is_alive() {
            return Err(ProxyError::WorkerUnavailable { worker: link.id(), reason: "link down" });
        }
        Ok(link.clone())
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn alive(&self) -> usize {
        self.workers.iter().filter(|w| w.is_alive()).count()
    }

    pub fn workers(&self) -> &[Arc<WorkerLink>] {
        &self.workers
    }
}

fn spawn_in_process(id: usize) -> WorkerLink {
    let (dispatcher_side, worker_side) = duplex(PIPE_CAPACITY);
    let (worker_read, worker_write) = split(worker_side);
    tokio::spawn(async move {
        if let Err(e) = worker::serve(id, worker_read, worker_write).await {
            tracing::error!(worker = id, error = %e, "In-process worker stopped");
        }
    });
    let (read, write) = split(dispatcher_side);
    WorkerLink::connect(id, read, write)
}

fn spawn_process(id: usize, program: &Path, log_level: &str) -> Result<WorkerLink, ProxyError> {
    let mut child = Command::new(program)
        .arg("worker")
        .arg("--id")
        .arg(id.to_string())
        .arg("--log-level")
        .arg(log_level)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()?;

    let stdin = child
        .stdin
        .take()
        .ok_or(ProxyError::WorkerUnavailable { worker: id, reason: "stdin not captured" })?;
    let stdout = child
        .stdout
        .take()
        .ok_or(ProxyError::WorkerUnavailable { worker: id, reason: "stdout not captured" })?;

    tracing::debug!(worker = id, pid = ?child.id(), "Worker process spawned");
    Ok(WorkerLink::connect(id, stdout, stdin).with_child(child))
}
