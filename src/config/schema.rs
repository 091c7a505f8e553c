//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! Field names are camelCase on the wire so the same document can be written
//! as YAML, JSON or TOML. Durations are expressed in milliseconds.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ProxyConfig {
    /// Listener, worker pool and routing table.
    pub server: ServerConfig,

    /// Global rate limit, used by rules that do not declare their own.
    pub rate_limit: Option<RateLimitConfig>,

    /// Global cache settings, used by rules that do not declare their own.
    pub cache: Option<CacheConfig>,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,
}

/// Server section.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,

    /// Port to listen on (0 picks an ephemeral port).
    pub listen: u16,

    /// Number of worker processes.
    pub workers: usize,

    /// Worker selection policy.
    pub balancing: BalancingStrategy,

    /// How long the dispatcher waits for a worker reply, in milliseconds.
    pub worker_timeout: u64,

    /// Deadline of the worker's upstream call, in milliseconds. Must stay below
    /// `worker_timeout` so an upstream failure reaches the client as 500 rather
    /// than 503. Defaults to 80% of `worker_timeout`.
    pub upstream_timeout: Option<u64>,

    /// Concurrent outbound connections allowed per upstream inside one worker.
    pub max_connections_per_upstream: usize,

    /// Backend targets.
    pub upstreams: Vec<UpstreamConfig>,

    /// Extra response headers. Informational, not applied to forwarded requests.
    pub headers: Vec<HeaderConfig>,

    /// Routing rules, matched in declaration order.
    pub rules: Vec<RuleConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            listen: 8080,
            workers: 4,
            balancing: BalancingStrategy::default(),
            worker_timeout: 5_000,
            upstream_timeout: None,
            max_connections_per_upstream: 100,
            upstreams: Vec::new(),
            headers: Vec::new(),
            rules: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn worker_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_timeout)
    }

    pub fn upstream_timeout(&self) -> Duration {
        let millis = self
            .upstream_timeout
            .unwrap_or(self.worker_timeout.saturating_mul(4) / 5)
            .max(1);
        Duration::from_millis(millis)
    }
}

/// Load-balancing policy across the worker pool.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum BalancingStrategy {
    #[default]
    RoundRobin,
    Random,
}

/// A named backend target.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct UpstreamConfig {
    /// Unique upstream identifier.
    pub id: String,

    /// Base URL, e.g. `http://127.0.0.1:3000`. A bare `host:port` is read as http.
    pub url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct HeaderConfig {
    pub key: String,
    pub value: String,
}

/// Path-keyed routing entry.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuleConfig {
    /// Exact request path this rule answers.
    pub path: String,

    /// Candidate upstream ids; the first one is used.
    #[serde(default)]
    pub upstreams: Vec<String>,

    /// Replaces the global rate limit for this path.
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,

    /// Replaces the global cache settings for this path.
    #[serde(default)]
    pub cache: Option<CacheConfig>,
}

/// Fixed-window rate limit.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Requests accepted per window.
    pub max_requests: u32,

    /// Window length in milliseconds.
    pub time_window: u64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.time_window)
    }
}

/// Response cache settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum number of cached paths.
    #[serde(default = "default_cache_size")]
    pub max_size: usize,

    /// Entry lifetime in milliseconds.
    pub expiration_time: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.expiration_time)
    }
}

fn default_true() -> bool {
    true
}

fn default_cache_size() -> usize {
    1_000
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error), overridden by `RUST_LOG`.
    pub log_level: String,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

impl ProxyConfig {
    /// Rule-level rate limit if declared, else the global one.
    pub fn effective_rate_limit<'a>(&'a self, rule: Option<&'a RuleConfig>) -> Option<&'a RateLimitConfig> {
        rule.and_then(|r| r.rate_limit.as_ref())
            .or(self.rate_limit.as_ref())
            .filter(|limit| limit.enabled)
    }

    /// Rule-level cache settings if declared, else the global ones.
    pub fn effective_cache<'a>(&'a self, rule: Option<&'a RuleConfig>) -> Option<&'a CacheConfig> {
        rule.and_then(|r| r.cache.as_ref())
            .or(self.cache.as_ref())
            .filter(|cache| cache.enabled)
    }

    /// Interval of the background cache sweep: the global TTL, else 60s.
    pub fn sweep_interval(&self) -> Duration {
        self.cache
            .as_ref()
            .filter(|c| c.expiration_time > 0)
            .map(CacheConfig::ttl)
            .unwrap_or(Duration::from_secs(60))
    }
}
