//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status
//! - `proxy_request_duration_seconds` (histogram): latency distribution
//! - `proxy_direct_access_decisions_total` (counter): routing decisions
//! - `proxy_direct_access_total` (counter): direct access results by stage
//!
//! # Design Decisions
//! - Uses the `metrics` facade; calls are no-ops without an installed recorder
//! - Prometheus exporter is optional and started from main

use std::net::SocketAddr;
use std::time::Instant;

use metrics::Label;
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::routing::Decision;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a finished request.
pub fn record_request(method: &str, status: u16, start_time: Instant) {
    let labels = vec![
        Label::new("method", method.to_string()),
        Label::new("status", status.to_string()),
    ];
    metrics::counter!("proxy_requests_total", labels.clone()).increment(1);
    metrics::histogram!("proxy_request_duration_seconds", labels)
        .record(start_time.elapsed().as_secs_f64());
}

/// Record a routing decision.
pub fn record_decision(decision: Decision) {
    metrics::counter!("proxy_direct_access_decisions_total", "decision" => decision.as_str()).increment(1);
}

/// Record the result of a direct access attempt ("completed" or the failed stage).
pub fn record_direct_access(result: &'static str) {
    metrics::counter!("proxy_direct_access_total", "result" => result).increment(1);
}
