//! Dispatcher subsystem: the request pipeline of the listening process.
//!
//! # Data Flow
//! ```text
//! InboundRequest (peer ip, path + query, headers)
//!     → routing: first rule with the same path (may be none)
//!     → security/rate_limit: effective limit ⇒ 429 + Retry-After
//!     → cache: effective cache, hit ⇒ 200 without dispatch
//!     → pool.rs: load balancer picks a worker ⇒ dead pick is 503
//!     → link.rs: RequestDescriptor with a fresh correlation id
//!     → ReplyDescriptor: error code ⇒ that status, data ⇒ 200 + cache store
//! ```
//!
//! # Design Decisions
//! - Limiter and cache live only here; workers never see them
//! - Unmatched paths are still dispatched so the worker answers 404
//! - No failover: a request is tried on exactly one worker

pub mod link;
pub mod pool;

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::http::StatusCode;
use uuid::Uuid;

use crate::cache::{PutOutcome, ResponseCache};
use crate::config::{validate_config, CacheConfig, ConfigError, ProxyConfig};
use crate::error::ProxyError;
use crate::observability::metrics;
use crate::protocol::{ErrorCode, ReplyDescriptor, RequestDescriptor};
use crate::routing::{path_of, RuleTable};
use crate::security::RateLimiter;

pub use link::WorkerLink;
pub use pool::{WorkerMode, WorkerPool};

/// What the HTTP layer hands to the pipeline.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub client: IpAddr,
    /// Path and query as received.
    pub target: String,
    pub headers: HashMap<String, String>,
}

/// Where a response body came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Worker,
    Dispatcher,
}

impl ResponseSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseSource::Cache => "cache",
            ResponseSource::Worker => "worker",
            ResponseSource::Dispatcher => "dispatcher",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub body: Bytes,
    pub source: ResponseSource,
    /// Seconds until a rate-limited client may retry.
    pub retry_after: Option<u64>,
}

impl ProxyResponse {
    fn ok(body: Bytes, source: ResponseSource) -> Self {
        Self { status: StatusCode::OK, body, source, retry_after: None }
    }

    fn rejected(err: &ProxyError) -> Self {
        Self {
            status: err.status(),
            body: Bytes::from_static(err.client_message().as_bytes()),
            source: ResponseSource::Dispatcher,
            retry_after: None,
        }
    }
}

pub struct Dispatcher {
    config: Arc<ProxyConfig>,
    rules: RuleTable,
    limiter: Arc<RateLimiter>,
    cache: Arc<ResponseCache>,
    pool: WorkerPool,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(config: ProxyConfig, pool: WorkerPool) -> Self {
        Self {
            rules: RuleTable::new(config.server.rules.clone()),
            timeout: config.server.worker_timeout(),
            config: Arc::new(config),
            limiter: Arc::new(RateLimiter::new()),
            cache: Arc::new(ResponseCache::new()),
            pool,
        }
    }

    /// Validate the configuration and start the worker pool.
    pub async fn start(config: ProxyConfig, mode: &WorkerMode) -> Result<Self, ProxyError> {
        validate_config(&config).map_err(ConfigError::Validation)?;
        let pool = WorkerPool::spawn(&config, mode).await?;
        Ok(Self::new(config, pool))
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn limiter(&self) -> Arc<RateLimiter> {
        self.limiter.clone()
    }

    pub fn cache(&self) -> Arc<ResponseCache> {
        self.cache.clone()
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub async fn handle(&self, request: InboundRequest) -> ProxyResponse {
        let start = Instant::now();
        let response = self.process(request).await;
        metrics::record_request(response.status.as_u16(), response.source.as_str(), start);
        response
    }

    async fn process(&self, request: InboundRequest) -> ProxyResponse {
        let path = path_of(&request.target).to_string();
        let rule = self.rules.find(&path);

        if let Some(limit) = self.config.effective_rate_limit(rule) {
            let decision = self.limiter.check(request.client, &path, limit);
            if !decision.allowed {
                let mut response = ProxyResponse::rejected(&ProxyError::RateLimited);
                response.retry_after = Some(decision.retry_after(Instant::now()));
                return response;
            }
        }

        let cache = self.config.effective_cache(rule);
        if cache.is_some() {
            if let Some(body) = self.cache.get(&path) {
                tracing::debug!(path = %path, "Cache hit");
                return ProxyResponse::ok(body, ResponseSource::Cache);
            }
        }

        let worker = match self.pool.select() {
            Ok(worker) => worker,
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "No worker for request");
                return ProxyResponse::rejected(&e);
            }
        };

        let correlation_id = Uuid::new_v4().to_string();
        tracing::debug!(
            worker = worker.id(),
            correlation_id = %correlation_id,
            target = %request.target,
            "Dispatching request"
        );
        let descriptor = RequestDescriptor::http(correlation_id, request.target, request.headers);

        match worker.call(descriptor, self.timeout).await {
            Ok(reply) => self.respond(reply, &path, cache),
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Worker round-trip failed");
                ProxyResponse::rejected(&e)
            }
        }
    }

    fn respond(&self, reply: ReplyDescriptor, path: &str, cache: Option<&CacheConfig>) -> ProxyResponse {
        match (reply.data, reply.error) {
            (Some(data), None) => {
                let body = Bytes::from(data);
                if let Some(cache) = cache {
                    match self.cache.put(path, body.clone(), cache.ttl(), cache.max_size) {
                        PutOutcome::Evicted(key) => tracing::debug!(path, evicted = %key, "Cache full, evicted entry"),
                        PutOutcome::Skipped => tracing::debug!(path, "Cache disabled by size, not stored"),
                        PutOutcome::Stored => {}
                    }
                }
                ProxyResponse::ok(body, ResponseSource::Worker)
            }
            (_, Some(error)) => ProxyResponse {
                status: reply.error_code.unwrap_or(ErrorCode::Internal).status(),
                body: Bytes::from(error),
                source: ResponseSource::Worker,
                retry_after: None,
            },
            (None, None) => ProxyResponse::rejected(&ProxyError::MessageMalformed(
                "reply carries neither data nor error".into(),
            )),
        }
    }
}
