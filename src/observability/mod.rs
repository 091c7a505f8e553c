//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher and workers produce:
//!     → logging.rs (structured log events on stderr)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stderr of the dispatcher and every worker)
//!     → Metrics endpoint (Prometheus scrape, dispatcher only)
//! ```
//!
//! # Design Decisions
//! - Correlation id flows through dispatcher and worker log events
//! - Metrics are cheap (no-ops until a recorder is installed)

pub mod logging;
pub mod metrics;
