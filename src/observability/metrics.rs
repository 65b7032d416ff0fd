//! Metrics collection and exposition.
//!
//! # Metrics
//! - `switchyard_requests_total` (counter): requests by method, status
//! - `switchyard_request_duration_seconds` (histogram): latency by method
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - The exporter serves its own HTTP listener, apart from the app

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const REQUESTS_TOTAL: &str = "switchyard_requests_total";
pub const REQUEST_DURATION_SECONDS: &str = "switchyard_request_duration_seconds";

/// Install the Prometheus exporter on `addr`. Needs a running Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// Record one finished request.
pub fn record_request(method: &str, status: u16, started: Instant) {
    metrics::counter!(
        REQUESTS_TOTAL,
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!(REQUEST_DURATION_SECONDS, "method" => method.to_string())
        .record(started.elapsed().as_secs_f64());
}
