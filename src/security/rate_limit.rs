//! Fixed-window rate limiting keyed by client IP and request path.
//!
//! Each key carries the time of its last accepted request and a counter.
//! A check first rolls the window over when more than `timeWindow` has
//! passed since that last accepted request, then either counts the request
//! or rejects it. Rejections leave the state untouched so the client's next
//! attempt is judged against the same window.

use std::net::IpAddr;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::config::RateLimitConfig;
use crate::observability::metrics;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey {
    pub ip: IpAddr,
    pub path: String,
}

/// Per-client window bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientWindow {
    pub last_request: Instant,
    pub request_count: u32,
    /// Window length of the limit that last judged this client, used for pruning.
    window: Duration,
}

/// Outcome of a check together with the state it left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub state: ClientWindow,
}

impl RateDecision {
    /// Whole seconds until the window rolls over, at least 1.
    pub fn retry_after(&self, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.state.last_request);
        let remaining = self.state.window.saturating_sub(elapsed);
        remaining.as_millis().div_ceil(1000).max(1) as u64
    }
}

/// Dispatcher-owned limiter state. Sharded map, one lock per key.
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: DashMap<ClientKey, ClientWindow>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&self, ip: IpAddr, path: &str, limit: &RateLimitConfig) -> RateDecision {
        self.check_at(ip, path, limit, Instant::now())
    }

    pub fn check_at(&self, ip: IpAddr, path: &str, limit: &RateLimitConfig, now: Instant) -> RateDecision {
        let window = limit.window();
        let key = ClientKey { ip, path: path.to_string() };
        let mut entry = self.windows.entry(key).or_insert(ClientWindow {
            last_request: now,
            request_count: 0,
            window,
        });
        let state = entry.value_mut();
        state.window = window;

        if now.saturating_duration_since(state.last_request) > window {
            state.request_count = 0;
        }

        if state.request_count >= limit.max_requests {
            tracing::warn!(client = %ip, path = %path, count = state.request_count, "Rate limit exceeded");
            metrics::record_rate_limited();
            return RateDecision { allowed: false, state: *state };
        }

        state.request_count += 1;
        state.last_request = now;
        RateDecision { allowed: true, state: *state }
    }

    /// Current state for a client, if it has been seen.
    pub fn state(&self, ip: IpAddr, path: &str) -> Option<ClientWindow> {
        let key = ClientKey { ip, path: path.to_string() };
        self.windows.get(&key).map(|entry| *entry.value())
    }

    /// Drop clients whose window has fully elapsed. Returns how many were removed.
    pub fn prune_at(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows
            .retain(|_, state| now.saturating_duration_since(state.last_request) <= state.window);
        before.saturating_sub(self.windows.len())
    }

    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}
