//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use fleet_proxy::config::{ProxyConfig, RuleConfig, UpstreamConfig};
use fleet_proxy::lifecycle::{ProxyServer, Shutdown};
use fleet_proxy::{ProxyError, WorkerMode};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A mock upstream bound on an ephemeral port.
pub struct MockBackend {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
}

impl MockBackend {
    /// Requests received so far.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn upstream(&self, id: &str) -> UpstreamConfig {
        UpstreamConfig { id: id.into(), url: format!("http://{}", self.addr) }
    }
}

/// Start a mock backend that answers `200 "{name}:{request target}"`.
pub async fn start_mock_backend(name: &'static str) -> MockBackend {
    start_programmable_backend(move |target| async move { (200, format!("{name}:{target}")) }).await
}

/// Start a programmable mock backend; `f` maps the request target to a
/// status and body.
pub async fn start_programmable_backend<F, Fut>(f: F) -> MockBackend
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let f = Arc::new(f);

    let counter = hits.clone();
    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                break;
            };
            let f = f.clone();
            let counter = counter.clone();
            tokio::spawn(async move {
                let (read, mut write) = socket.into_split();
                let mut reader = BufReader::new(read);

                let mut request_line = String::new();
                if reader.read_line(&mut request_line).await.unwrap_or(0) == 0 {
                    return;
                }
                loop {
                    let mut header = String::new();
                    match reader.read_line(&mut header).await {
                        Ok(0) | Err(_) => break,
                        Ok(_) if header == "\r\n" || header == "\n" => break,
                        Ok(_) => continue,
                    }
                }

                counter.fetch_add(1, Ordering::SeqCst);
                let target = request_line.split_whitespace().nth(1).unwrap_or("/").to_string();
                let (status, body) = f(target).await;
                let status_text = match status {
                    200 => "200 OK",
                    404 => "404 Not Found",
                    500 => "500 Internal Server Error",
                    503 => "503 Service Unavailable",
                    _ => "200 OK",
                };
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_text,
                    body.len(),
                    body
                );
                let _ = write.write_all(response.as_bytes()).await;
                let _ = write.shutdown().await;
            });
        }
    });

    MockBackend { addr, hits }
}

/// An address nothing is listening on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub fn rule(path: &str, upstreams: &[&str]) -> RuleConfig {
    RuleConfig {
        path: path.into(),
        upstreams: upstreams.iter().map(|s| s.to_string()).collect(),
        rate_limit: None,
        cache: None,
    }
}

pub fn proxy_config(workers: usize, upstreams: Vec<UpstreamConfig>, rules: Vec<RuleConfig>) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.server.host = "127.0.0.1".into();
    config.server.listen = 0;
    config.server.workers = workers;
    config.server.upstreams = upstreams;
    config.server.rules = rules;
    config
}

/// A proxy serving on an ephemeral port.
pub struct RunningProxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub task: JoinHandle<Result<(), ProxyError>>,
}

impl RunningProxy {
    pub fn url(&self, target: &str) -> String {
        format!("http://{}{}", self.addr, target)
    }

    pub async fn stop(self) -> Result<(), ProxyError> {
        self.shutdown.trigger();
        self.task.await.unwrap()
    }
}

pub async fn start_proxy(config: ProxyConfig, mode: WorkerMode) -> RunningProxy {
    let server = ProxyServer::bind(config, mode).await.unwrap();
    let addr = server.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let task = tokio::spawn(server.run(&shutdown));
    RunningProxy { addr, shutdown, task }
}
