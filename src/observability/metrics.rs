//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define proxy metrics (requests, latency, rejections, upstream attempts)
//! - Track allowlist refresh outcomes and size
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status, route
//! - `proxy_request_duration_seconds` (histogram): latency per route
//! - `proxy_access_denied_total` (counter): gated requests rejected
//! - `proxy_upstream_attempts_total` (counter): upstream calls by outcome
//! - `allowlist_refresh_total` (counter): refreshes by outcome
//! - `allowlist_entries` (gauge): size of the live allowlist
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, which keeps tests free of setup

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a completed client request.
pub fn record_request(method: &str, status: u16, route: &'static str, start: Instant) {
    metrics::counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "route" => route,
    )
    .increment(1);
    metrics::histogram!("proxy_request_duration_seconds", "route" => route)
        .record(start.elapsed().as_secs_f64());
}

/// Record a gated request rejected by the allowlist.
pub fn record_access_denied() {
    metrics::counter!("proxy_access_denied_total").increment(1);
}

/// Record one upstream call (`success` or `failure`).
pub fn record_upstream_attempt(outcome: &'static str) {
    metrics::counter!("proxy_upstream_attempts_total", "outcome" => outcome).increment(1);
}

/// Record a refresh outcome (`success` or `failure`).
pub fn record_allowlist_refresh(outcome: &'static str) {
    metrics::counter!("allowlist_refresh_total", "outcome" => outcome).increment(1);
}

/// Record the size of the live allowlist.
pub fn record_allowlist_size(entries: usize) {
    metrics::gauge!("allowlist_entries").set(entries as f64);
}
