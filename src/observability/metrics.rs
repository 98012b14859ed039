//! Metrics collection and exposition.
//!
//! # Metrics
//! - `master_requests_total` (counter): requests by method, status, route
//! - `master_request_duration_seconds` (histogram): latency distribution
//!
//! The Prometheus recorder is installed once at startup; the handle it
//! returns renders the exposition text served by `/v{n}/metrics`.

use std::time::Instant;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the process-wide Prometheus recorder.
///
/// Returns `None` (and logs) when a recorder is already installed;
/// request recording then degrades to no-ops.
pub fn install_recorder() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::error!(error = %e, "Failed to install metrics recorder");
            None
        }
    }
}

/// Record one handled request. `route` is the compiled route pattern,
/// never the concrete path, so label cardinality stays bounded.
pub fn record_request(method: &str, status: u16, route: &str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("route", route.to_string()),
    ];
    metrics::counter!("master_requests_total", &labels).increment(1);
    metrics::histogram!("master_request_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());
}
