//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define API metrics (requests, latency, stream sessions, rate limiting)
//! - Expose a Prometheus-compatible scrape endpoint
//!
//! # Metrics
//! - `api_requests_total` (counter): requests by method, route, status
//! - `api_request_duration_seconds` (histogram): latency by method, route
//! - `api_stream_sessions_active` (gauge): open stream sessions by kind
//! - `api_stream_bytes_total` (counter): stream bytes by kind, direction
//! - `api_rate_limited_total` (counter): rejected requests by reason
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so tests need no setup
//! - Route label is the matched template, never the raw path

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "metrics exporter listening");
    Ok(())
}

/// Record a finished request.
pub fn record_request(method: &str, status: u16, route: &str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("route", route.to_string()),
        ("status", status.to_string()),
    ];
    counter!("api_requests_total", &labels).increment(1);
    histogram!(
        "api_request_duration_seconds",
        "method" => method.to_string(),
        "route" => route.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited(reason: &'static str) {
    counter!("api_rate_limited_total", "reason" => reason).increment(1);
}

/// Adjust the open stream session gauge.
pub fn record_stream_session(kind: &'static str, delta: f64) {
    gauge!("api_stream_sessions_active", "kind" => kind).increment(delta);
}

pub fn record_stream_bytes(kind: &'static str, direction: &'static str, bytes: u64) {
    counter!("api_stream_bytes_total", "kind" => kind, "direction" => direction).increment(bytes);
}
