//! # netglobe Telemetry
//!
//! Crate for logging and metrics.

pub mod logging;
pub mod metrics;

pub use logging::EventLogger;
pub use metrics::MetricsRecorder;

/// Failures while installing telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("Failed to install log subscriber: {0}")]
    Subscriber(String),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}
