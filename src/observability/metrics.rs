//! Metrics collection and exposition.
//!
//! # Metrics
//! - `noa_client_requests_total` (counter): requests by method, status
//! - `noa_client_request_duration_seconds` (histogram): latency by method
//! - `noa_client_token_refresh_total` (counter): refreshes by outcome
//! - `noa_client_session_expired_total` (counter): sessions torn down
//!
//! Recording is a no-op until a recorder is installed with [`init_metrics`].

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder and its scrape endpoint.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record a completed request (status 500 for transport failures).
pub fn record_request(method: &str, status: u16, start_time: Instant) {
    metrics::counter!(
        "noa_client_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!(
        "noa_client_request_duration_seconds",
        "method" => method.to_string()
    )
    .record(start_time.elapsed().as_secs_f64());
}

/// Record the outcome of a token refresh ("success" or "failure").
pub fn record_refresh(outcome: &'static str) {
    metrics::counter!("noa_client_token_refresh_total", "outcome" => outcome).increment(1);
}

pub fn record_session_expired() {
    metrics::counter!("noa_client_session_expired_total").increment(1);
}
