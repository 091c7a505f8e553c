//! Response cache subsystem.
//!
//! # Data Flow
//! ```text
//! Request admitted by the rate limiter
//!     → store.rs get(path): hit → respond 200, no worker contacted
//!     → miss → dispatch → successful reply → store.rs put(path, body, ttl)
//!
//! Background:
//!     sweeper.rs every interval → drop expired entries (+ idle limiter windows)
//! ```
//!
//! # Design Decisions
//! - Key is the raw request path; the query string is not part of it
//! - Entries are never served at or after their expiry, sweep or not
//! - Capacity is enforced on insert (see `ResponseCache`)

pub mod store;
pub mod sweeper;

pub use store::{CacheEntry, PutOutcome, ResponseCache};
pub use sweeper::Sweeper;
