//! Background eviction of expired cache entries and idle rate-limit windows.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::time;

use crate::cache::ResponseCache;
use crate::security::RateLimiter;

pub struct Sweeper {
    cache: Arc<ResponseCache>,
    limiter: Arc<RateLimiter>,
    interval: Duration,
}

impl Sweeper {
    pub fn new(cache: Arc<ResponseCache>, limiter: Arc<RateLimiter>, interval: Duration) -> Self {
        Self { cache, limiter, interval }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval = ?self.interval, "Cache sweeper starting");

        let mut ticker = time::interval(self.interval);
        // The first tick completes immediately; nothing can have expired yet.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_once(Instant::now());
                }
                _ = shutdown.recv() => {
                    tracing::info!("Cache sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// One sweep pass. Returns (cache entries removed, client windows removed).
    pub fn sweep_once(&self, now: Instant) -> (usize, usize) {
        let expired = self.cache.sweep_at(now);
        let idle = self.limiter.prune_at(now);
        if expired > 0 || idle > 0 {
            tracing::debug!(
                expired_entries = expired,
                idle_clients = idle,
                remaining_entries = self.cache.len(),
                "Sweep completed"
            );
        }
        (expired, idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitConfig;
    use axum::body::Bytes;

    #[test]
    fn sweep_once_cleans_both_stores() {
        let cache = Arc::new(ResponseCache::new());
        let limiter = Arc::new(RateLimiter::new());
        let now = Instant::now();

        cache.put_at("/a", Bytes::from_static(b"a"), Duration::from_millis(100), 10, now);
        let limit = RateLimitConfig { enabled: true, max_requests: 5, time_window: 100 };
        limiter.check_at("127.0.0.1".parse().unwrap(), "/a", &limit, now);

        let sweeper = Sweeper::new(cache.clone(), limiter.clone(), Duration::from_secs(1));
        assert_eq!(sweeper.sweep_once(now), (0, 0));
        assert_eq!(sweeper.sweep_once(now + Duration::from_millis(150)), (1, 1));
        assert!(cache.is_empty());
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[tokio::test]
    async fn background_task_evicts_and_stops_on_shutdown() {
        let cache = Arc::new(ResponseCache::new());
        let limiter = Arc::new(RateLimiter::new());
        cache.put("/a", Bytes::from_static(b"a"), Duration::from_millis(20), 10);

        let (tx, rx) = broadcast::channel(1);
        let sweeper = Sweeper::new(cache.clone(), limiter, Duration::from_millis(30));
        let handle = tokio::spawn(sweeper.run(rx));

        time::sleep(Duration::from_millis(120)).await;
        assert!(cache.is_empty());

        tx.send(()).unwrap();
        time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }
}
