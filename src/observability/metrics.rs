//! Metrics collection and exposition.
//!
//! # Metrics
//! - `engarde_requests_total` (counter): requests by application, method, status
//! - `engarde_request_duration_seconds` (histogram): dispatch latency
//! - `engarde_route_table_rebuilds_total` (counter): route tables compiled
//! - `engarde_gate_denials_total` (counter): requests stopped by the security gate
//! - `engarde_response_cache_hits_total` (counter): responses served from cache
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Prometheus exporter is installed only when enabled in config

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(application: &str, method: &str, status: u16, elapsed: Duration) {
    counter!(
        "engarde_requests_total",
        "application" => application.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!(
        "engarde_request_duration_seconds",
        "application" => application.to_string()
    )
    .record(elapsed.as_secs_f64());
}

pub fn record_route_rebuild(application: &str) {
    counter!(
        "engarde_route_table_rebuilds_total",
        "application" => application.to_string()
    )
    .increment(1);
}

pub fn record_gate_denial(application: &str, reason: &str) {
    counter!(
        "engarde_gate_denials_total",
        "application" => application.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

pub fn record_cache_hit(application: &str) {
    counter!(
        "engarde_response_cache_hits_total",
        "application" => application.to_string()
    )
    .increment(1);
}
