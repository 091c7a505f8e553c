//! Startup orchestration.
//!
//! # Responsibilities
//! - Validate configuration
//! - Start the worker pool, then the dispatcher around it
//! - Bind the listener last, so traffic only arrives once workers exist
//! - Run the sweeper and the HTTP server until shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Workers are killed when the server value is dropped

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::cache::Sweeper;
use crate::config::ProxyConfig;
use crate::dispatcher::{Dispatcher, WorkerMode};
use crate::error::ProxyError;
use crate::http::HttpServer;
use crate::lifecycle::Shutdown;

/// A started but not yet serving proxy.
pub struct ProxyServer {
    dispatcher: Arc<Dispatcher>,
    listener: TcpListener,
}

impl ProxyServer {
    /// Start workers and bind `server.host:server.listen`.
    pub async fn bind(config: ProxyConfig, mode: WorkerMode) -> Result<Self, ProxyError> {
        let addr = format!("{}:{}", config.server.host, config.server.listen);
        let dispatcher = Arc::new(Dispatcher::start(config, &mode).await?);
        let listener = TcpListener::bind(&addr).await?;

        tracing::info!(
            address = %listener.local_addr()?,
            workers = dispatcher.pool().len(),
            rules = dispatcher.config().server.rules.len(),
            "Proxy bound"
        );
        Ok(Self { dispatcher, listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ProxyError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    /// Serve until `shutdown` fires. Subscribes before returning, so a
    /// trigger that races the first poll is not lost.
    pub fn run(self, shutdown: &Shutdown) -> impl Future<Output = Result<(), ProxyError>> + Send + 'static {
        let sweeper_stop = shutdown.subscribe();
        let server_stop = shutdown.subscribe();
        let shutdown = shutdown.clone();

        async move {
            let sweeper = Sweeper::new(
                self.dispatcher.cache(),
                self.dispatcher.limiter(),
                self.dispatcher.config().sweep_interval(),
            );
            let sweeper_task = tokio::spawn(sweeper.run(sweeper_stop));

            let server = HttpServer::new(self.dispatcher.clone());
            let served = server.run(self.listener, server_stop).await;

            // The server may have stopped on its own; make sure the sweeper follows.
            shutdown.trigger();
            if let Err(e) = sweeper_task.await {
                tracing::warn!(error = %e, "Sweeper task ended abnormally");
            }
            served?;
            Ok(())
        }
    }
}
