//! Metrics collection and export for Parley.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use parley_core::MessageKind;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const JOINS_TOTAL: &str = "parley_joins_total";
    pub const PARTICIPANTS_ACTIVE: &str = "parley_participants_active";
    pub const MESSAGES_TOTAL: &str = "parley_messages_total";
    pub const ERRORS_TOTAL: &str = "parley_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    // Describe metrics
    metrics::describe_counter!(
        names::JOINS_TOTAL,
        "Total number of participants registered since server start"
    );
    metrics::describe_gauge!(
        names::PARTICIPANTS_ACTIVE,
        "Number of participants in the room at the last instrumented request"
    );
    metrics::describe_counter!(names::MESSAGES_TOTAL, "Total number of messages posted");
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of rejected requests");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a successful join.
pub fn record_join() {
    counter!(names::JOINS_TOTAL).increment(1);
}

/// Update the active participant gauge.
pub fn set_active_participants(count: usize) {
    gauge!(names::PARTICIPANTS_ACTIVE).set(count as f64);
}

/// Record a posted message.
pub fn record_message(kind: MessageKind) {
    counter!(names::MESSAGES_TOTAL, "kind" => kind_label(kind)).increment(1);
}

/// Record a rejected request.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

fn kind_label(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Message => "message",
        MessageKind::PrivateMessage => "private_message",
        MessageKind::Status => "status",
    }
}
