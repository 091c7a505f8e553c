//! TTL response store.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::body::Bytes;

use crate::observability::metrics;

/// A cached response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub body: Bytes,
    pub expires_at: Instant,
}

impl CacheEntry {
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// What `put` did with the entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    Stored,
    /// Stored after evicting the entry soonest to expire.
    Evicted(String),
    /// Not stored: the configured capacity is zero.
    Skipped,
}

/// Dispatcher-owned cache keyed by request path.
///
/// Capacity is enforced on insertion of a new key: expired entries go
/// first, then the live entry with the earliest `expires_at`.
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&self, key: &str, now: Instant) -> Option<Bytes> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                metrics::record_cache("hit");
                Some(entry.body.clone())
            }
            Some(_) => {
                entries.remove(key);
                metrics::record_cache("expired");
                None
            }
            None => {
                metrics::record_cache("miss");
                None
            }
        }
    }

    pub fn put(&self, key: &str, body: Bytes, ttl: Duration, max_size: usize) -> PutOutcome {
        self.put_at(key, body, ttl, max_size, Instant::now())
    }

    pub fn put_at(&self, key: &str, body: Bytes, ttl: Duration, max_size: usize, now: Instant) -> PutOutcome {
        if max_size == 0 {
            return PutOutcome::Skipped;
        }

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut outcome = PutOutcome::Stored;

        if !entries.contains_key(key) && entries.len() >= max_size {
            entries.retain(|_, entry| !entry.is_expired(now));
            while entries.len() >= max_size {
                let victim = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.expires_at)
                    .map(|(k, _)| k.clone());
                let Some(victim) = victim else { break };
                entries.remove(&victim);
                metrics::record_cache("evicted");
                tracing::debug!(key = %victim, "Evicted cache entry at capacity");
                outcome = PutOutcome::Evicted(victim);
            }
        }

        entries.insert(
            key.to_string(),
            CacheEntry { body, expires_at: now + ttl },
        );
        metrics::record_cache_size(entries.len());
        outcome
    }

    /// Remove every entry with `expires_at <= now`. Returns how many were removed.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        metrics::record_cache_size(entries.len());
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
