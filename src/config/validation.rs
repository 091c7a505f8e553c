//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check upstream identity (ids present and unique, URLs usable)
//! - Validate value ranges (worker count, rate-limit windows, cache TTLs)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Dangling upstream references are NOT rejected: they surface per request
//!   as a 500 from the worker, so a typo in one rule does not take down the
//!   whole routing table
//! - Runs in the dispatcher at load time and again inside every worker

use std::collections::HashSet;

use thiserror::Error;
use url::Url;

use crate::config::schema::{CacheConfig, ProxyConfig, RateLimitConfig};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("server.workers must be at least 1")]
    NoWorkers,

    #[error("server.workerTimeout must be greater than 0")]
    ZeroWorkerTimeout,

    #[error("server.upstreamTimeout ({upstream} ms) must be greater than 0 and below server.workerTimeout ({worker} ms)")]
    UpstreamTimeoutOutOfRange { upstream: u64, worker: u64 },

    #[error("server.maxConnectionsPerUpstream must be greater than 0")]
    ZeroUpstreamConnections,

    #[error("upstream #{0} has an empty id")]
    EmptyUpstreamId(usize),

    #[error("upstream id '{0}' is declared more than once")]
    DuplicateUpstream(String),

    #[error("upstream '{id}' has an invalid url '{url}': {reason}")]
    InvalidUpstreamUrl { id: String, url: String, reason: String },

    #[error("rule #{0} path '{1}' must start with '/'")]
    InvalidRulePath(usize, String),

    #[error("{0}: rateLimit.timeWindow must be greater than 0")]
    ZeroTimeWindow(String),

    #[error("{0}: cache.expirationTime must be greater than 0")]
    ZeroExpiration(String),
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let server = &config.server;

    if server.workers == 0 {
        errors.push(ValidationError::NoWorkers);
    }
    if server.worker_timeout == 0 {
        errors.push(ValidationError::ZeroWorkerTimeout);
    }
    if let Some(upstream) = server.upstream_timeout {
        if upstream == 0 || upstream >= server.worker_timeout {
            errors.push(ValidationError::UpstreamTimeoutOutOfRange {
                upstream,
                worker: server.worker_timeout,
            });
        }
    }
    if server.max_connections_per_upstream == 0 {
        errors.push(ValidationError::ZeroUpstreamConnections);
    }

    let mut seen = HashSet::new();
    for (index, upstream) in server.upstreams.iter().enumerate() {
        if upstream.id.is_empty() {
            errors.push(ValidationError::EmptyUpstreamId(index));
        } else if !seen.insert(upstream.id.as_str()) {
            errors.push(ValidationError::DuplicateUpstream(upstream.id.clone()));
        }
        if let Err(reason) = parse_upstream_url(&upstream.url) {
            errors.push(ValidationError::InvalidUpstreamUrl {
                id: upstream.id.clone(),
                url: upstream.url.clone(),
                reason,
            });
        }
    }

    check_rate_limit("rateLimit", config.rate_limit.as_ref(), &mut errors);
    check_cache("cache", config.cache.as_ref(), &mut errors);

    for (index, rule) in server.rules.iter().enumerate() {
        if !rule.path.starts_with('/') {
            errors.push(ValidationError::InvalidRulePath(index, rule.path.clone()));
        }
        let scope = format!("rule '{}'", rule.path);
        check_rate_limit(&scope, rule.rate_limit.as_ref(), &mut errors);
        check_cache(&scope, rule.cache.as_ref(), &mut errors);

        for id in &rule.upstreams {
            if !seen.contains(id.as_str()) {
                tracing::warn!(path = %rule.path, upstream = %id, "Rule references an undeclared upstream");
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Parse an upstream URL. A bare `host:port` is treated as `http://host:port`.
pub fn parse_upstream_url(raw: &str) -> Result<Url, String> {
    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };
    let url = Url::parse(&candidate).map_err(|e| e.to_string())?;
    if url.scheme() != "http" {
        return Err(format!("unsupported scheme '{}'", url.scheme()));
    }
    if url.host_str().is_none() {
        return Err("missing host".to_string());
    }
    Ok(url)
}

fn check_rate_limit(scope: &str, limit: Option<&RateLimitConfig>, errors: &mut Vec<ValidationError>) {
    if let Some(limit) = limit {
        if limit.enabled && limit.time_window == 0 {
            errors.push(ValidationError::ZeroTimeWindow(scope.to_string()));
        }
    }
}

fn check_cache(scope: &str, cache: Option<&CacheConfig>, errors: &mut Vec<ValidationError>) {
    if let Some(cache) = cache {
        if cache.enabled && cache.expiration_time == 0 {
            errors.push(ValidationError::ZeroExpiration(scope.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{RuleConfig, UpstreamConfig};

    fn valid_config() -> ProxyConfig {
        let mut config = ProxyConfig::default();
        config.server.upstreams.push(UpstreamConfig {
            id: "node1".into(),
            url: "http://127.0.0.1:8001".into(),
        });
        config.server.rules.push(RuleConfig {
            path: "/todos".into(),
            upstreams: vec!["node1".into()],
            rate_limit: None,
            cache: None,
        });
        config
    }

    #[test]
    fn accepts_valid_config() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = valid_config();
        config.server.workers = 0;
        config.server.upstreams.push(UpstreamConfig {
            id: "node1".into(),
            url: "https://secure.example".into(),
        });
        config.server.rules[0].path = "todos".into();
        config.server.rules[0].rate_limit = Some(RateLimitConfig {
            enabled: true,
            max_requests: 3,
            time_window: 0,
        });

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::NoWorkers));
        assert!(errors.contains(&ValidationError::DuplicateUpstream("node1".into())));
        assert!(errors.contains(&ValidationError::InvalidRulePath(0, "todos".into())));
        assert!(errors.contains(&ValidationError::ZeroTimeWindow("rule 'todos'".into())));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidUpstreamUrl { id, .. } if id == "node1")));
        assert_eq!(errors.len(), 5);
    }

    #[test]
    fn dangling_upstream_reference_is_allowed() {
        let mut config = valid_config();
        config.server.rules[0].upstreams = vec!["ghost".into()];
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn disabled_sections_are_not_range_checked() {
        let mut config = valid_config();
        config.cache = Some(CacheConfig { enabled: false, max_size: 0, expiration_time: 0 });
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn bare_host_port_reads_as_http() {
        let url = parse_upstream_url("localhost:3000").unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/");
        assert!(parse_upstream_url("ftp://files.example").is_err());
    }

    #[test]
    fn upstream_timeout_must_undercut_worker_timeout() {
        let mut config = valid_config();
        config.server.worker_timeout = 1_000;
        config.server.upstream_timeout = Some(1_000);
        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::UpstreamTimeoutOutOfRange { upstream: 1_000, worker: 1_000 }]
        );

        config.server.upstream_timeout = Some(900);
        assert!(validate_config(&config).is_ok());
    }
}
