//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): responses by status and source
//! - `proxy_request_duration_seconds` (histogram): end-to-end latency
//! - `proxy_rate_limited_total` (counter): requests rejected with 429
//! - `proxy_cache_events_total` (counter): hit / miss / expired / evicted
//! - `proxy_cache_entries` (gauge): live cache cardinality
//! - `proxy_worker_dispatch_total` (counter): descriptors sent per worker
//! - `proxy_worker_pending` (gauge): in-flight correlations per worker
//! - `proxy_correlation_mismatch_total` (counter): replies nobody waited for
//! - `proxy_upstream_duration_seconds` (histogram): worker-side upstream latency
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(status: u16, source: &'static str, start: Instant) {
    metrics::counter!("proxy_requests_total", "status" => status.to_string(), "source" => source).increment(1);
    metrics::histogram!("proxy_request_duration_seconds", "source" => source)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited() {
    metrics::counter!("proxy_rate_limited_total").increment(1);
}

pub fn record_cache(event: &'static str) {
    metrics::counter!("proxy_cache_events_total", "event" => event).increment(1);
}

pub fn record_cache_size(entries: usize) {
    metrics::gauge!("proxy_cache_entries").set(entries as f64);
}

pub fn record_worker_dispatch(worker: usize) {
    metrics::counter!("proxy_worker_dispatch_total", "worker" => worker.to_string()).increment(1);
}

pub fn record_pending(worker: usize, pending: usize) {
    metrics::gauge!("proxy_worker_pending", "worker" => worker.to_string()).set(pending as f64);
}

pub fn record_correlation_mismatch(worker: usize) {
    metrics::counter!("proxy_correlation_mismatch_total", "worker" => worker.to_string()).increment(1);
}

pub fn record_upstream(upstream: &str, outcome: &'static str, start: Instant) {
    metrics::histogram!(
        "proxy_upstream_duration_seconds",
        "upstream" => upstream.to_string(),
        "outcome" => outcome
    )
    .record(start.elapsed().as_secs_f64());
}
