//! Fleet Proxy Library
//!
//! A reverse proxy whose listening process (the dispatcher) rate-limits,
//! caches and load-balances requests over a fixed pool of isolated workers
//! that perform the upstream calls.
//!
//! ```text
//!   client ──▶ http ──▶ dispatcher ──────────────▶ worker ──▶ upstream
//!                       │ rate limit               │ rule match
//!                       │ cache                    │ upstream resolve
//!                       │ load balancer            │ pooled forward
//!                       │ correlation table ◀──────┘ reply descriptor
//! ```

// Core subsystems
pub mod config;
pub mod dispatcher;
pub mod http;
pub mod protocol;
pub mod routing;
pub mod worker;

// Traffic management
pub mod cache;
pub mod load_balancer;
pub mod security;

// Cross-cutting concerns
pub mod error;
pub mod lifecycle;
pub mod observability;

pub use config::schema::ProxyConfig;
pub use dispatcher::{Dispatcher, WorkerMode};
pub use error::ProxyError;
pub use http::HttpServer;
pub use lifecycle::{ProxyServer, Shutdown};
