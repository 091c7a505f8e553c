//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (fixed window per client IP and path)
//!     → Pass to cache lookup and dispatch
//! ```
//!
//! # Design Decisions
//! - Client identity is the transport peer address; forwarded headers are not trusted
//! - Fail closed: a rejected request never reaches a worker
//! - State lives only in the dispatcher process

pub mod rate_limit;

pub use rate_limit::{ClientKey, ClientWindow, RateDecision, RateLimiter};
