//! Metrics collection and exposition.
//!
//! # Metrics
//! - `fanboy_requests_total` (counter): requests by route, status
//! - `fanboy_request_duration_seconds` (histogram): latency by route
//! - `fanboy_backend_errors_total` (counter): backend errors by verdict
//! - `fanboy_cancelled_requests_total` (counter): connections closed before a response
//! - `fanboy_active_connections` (gauge): open client connections
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Labels stay low-cardinality (route names, never raw paths)

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(route: &'static str, status: u16, start: Instant) {
    counter!("fanboy_requests_total", "route" => route, "status" => status.to_string())
        .increment(1);
    histogram!("fanboy_request_duration_seconds", "route" => route)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_backend_error(verdict: &'static str) {
    counter!("fanboy_backend_errors_total", "verdict" => verdict).increment(1);
}

pub fn record_cancelled(route: &'static str) {
    counter!("fanboy_cancelled_requests_total", "route" => route).increment(1);
}

pub fn set_active_connections(active: u64) {
    gauge!("fanboy_active_connections").set(active as f64);
}
