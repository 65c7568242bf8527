//! Metrics collection and export for Herald.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use herald_core::DispatchReport;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "herald_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "herald_connections_active";
    pub const EVENTS_TOTAL: &str = "herald_events_total";
    pub const DELIVERIES_TOTAL: &str = "herald_deliveries_total";
    pub const DISPATCH_SECONDS: &str = "herald_dispatch_seconds";
    pub const CHANNELS_ACTIVE: &str = "herald_channels_active";
    pub const ERRORS_TOTAL: &str = "herald_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of active connections"
    );
    metrics::describe_counter!(names::EVENTS_TOTAL, "Service events dispatched");
    metrics::describe_counter!(
        names::DELIVERIES_TOTAL,
        "Per-recipient deliveries by outcome"
    );
    metrics::describe_histogram!(names::DISPATCH_SECONDS, "Event fan-out time in seconds");
    metrics::describe_gauge!(names::CHANNELS_ACTIVE, "Current number of channels");
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record the outcome of one dispatch.
pub fn record_dispatch(report: &DispatchReport, seconds: f64) {
    let published = if report.published { "true" } else { "false" };
    counter!(names::EVENTS_TOTAL, "published" => published).increment(1);
    counter!(names::DELIVERIES_TOTAL, "outcome" => "delivered").increment(report.delivered as u64);
    counter!(names::DELIVERIES_TOTAL, "outcome" => "failed").increment(report.failed as u64);
    counter!(names::DELIVERIES_TOTAL, "outcome" => "skipped").increment(report.skipped as u64);
    histogram!(names::DISPATCH_SECONDS).record(seconds);
}

/// Update active channel count.
pub fn set_active_channels(count: usize) {
    gauge!(names::CHANNELS_ACTIVE).set(count as f64);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        counter!(names::CONNECTIONS_TOTAL).increment(1);
        gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
    }
}
