//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Request admitted (not rate limited, not cached)
//!     → Apply load balancing algorithm over the worker pool:
//!         - round_robin.rs (rotate through workers)
//!         - random.rs (uniform pick)
//!     → dispatcher checks the chosen worker is alive
//!     → dead worker ⇒ 503, no second pick
//! ```
//!
//! # Design Decisions
//! - Algorithms only choose a slot; availability is the pool's concern
//! - One strategy per pool, chosen from configuration

pub mod random;
pub mod round_robin;

use crate::config::BalancingStrategy;

pub use random::RandomPick;
pub use round_robin::RoundRobin;

/// Worker selection policy.
pub trait LoadBalancer: Send + Sync + std::fmt::Debug {
    /// Index of the next worker in a pool of `len`, or `None` for an empty pool.
    fn next_index(&self, len: usize) -> Option<usize>;
}

pub fn from_strategy(strategy: BalancingStrategy) -> Box<dyn LoadBalancer> {
    match strategy {
        BalancingStrategy::RoundRobin => Box::new(RoundRobin::new()),
        BalancingStrategy::Random => Box::new(RandomPick::new()),
    }
}
