//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, peer address, tracing)
//!     → dispatcher pipeline (rate limit, cache, worker round-trip)
//!     → response.rs (status, body, x-cache, Retry-After)
//!     → Send to client
//! ```

pub mod response;
pub mod server;

pub use response::X_CACHE;
pub use server::HttpServer;
