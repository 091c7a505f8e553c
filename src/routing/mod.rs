//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Request path
//!     → router.rs (rule lookup, exact path equality)
//!     → Return: matched RuleConfig or NoMatch
//!
//! Rule table (at startup):
//!     RuleConfig[] in declaration order
//!     → Freeze as immutable RuleTable
//! ```
//!
//! # Design Decisions
//! - Both the dispatcher (for per-rule limits and caching) and the worker
//!   (authoritative routing) build the same table from the same config
//! - Deterministic: same input always matches same rule
//! - First match wins

pub mod router;

pub use router::{path_of, RuleTable};
