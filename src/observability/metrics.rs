//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define orchestrator metrics (requests, latency, upstream calls, rejections)
//! - Expose a Prometheus-compatible scrape endpoint
//!
//! # Metrics
//! - `orchestrator_requests_total` (counter): requests by outcome
//! - `orchestrator_request_duration_seconds` (histogram): end-to-end latency
//! - `orchestrator_upstream_requests_total` (counter): upstream calls by service, outcome
//! - `orchestrator_detector_rejections_total` (counter): rejecting detections by detector
//! - `orchestrator_service_health` (gauge): 1=healthy, 0=unhealthy, per service
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so tests need no setup
//! - Labels are bounded: outcomes are fixed strings, services come from config

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its HTTP listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(outcome: &'static str, start: Instant) {
    counter!("orchestrator_requests_total", "outcome" => outcome).increment(1);
    histogram!("orchestrator_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_upstream(service: &str, outcome: &'static str) {
    counter!(
        "orchestrator_upstream_requests_total",
        "service" => service.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_detector_rejection(detector: &str) {
    counter!("orchestrator_detector_rejections_total", "detector" => detector.to_string())
        .increment(1);
}

pub fn record_service_health(service: &str, healthy: bool) {
    gauge!("orchestrator_service_health", "service" => service.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}
