//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::load_balancer::LoadBalancer;

/// Round-robin selector.
/// Stores an internal counter to rotate through workers.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobin {
    fn next_index(&self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        Some(self.counter.fetch_add(1, Ordering::Relaxed) % len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_robin() {
        let lb = RoundRobin::new();
        assert_eq!(lb.next_index(2), Some(0));
        assert_eq!(lb.next_index(2), Some(1));
        assert_eq!(lb.next_index(2), Some(0));
        assert_eq!(lb.next_index(0), None);
    }

    #[test]
    fn distribution_is_even() {
        for pool in 1..=5usize {
            for requests in [0usize, 1, 7, 10, 23] {
                let lb = RoundRobin::new();
                let mut hits = vec![0usize; pool];
                for _ in 0..requests {
                    hits[lb.next_index(pool).unwrap()] += 1;
                }
                let floor = requests / pool;
                let ceil = requests.div_ceil(pool);
                assert!(
                    hits.iter().all(|&h| h == floor || h == ceil),
                    "pool={pool} requests={requests} hits={hits:?}"
                );
            }
        }
    }
}
