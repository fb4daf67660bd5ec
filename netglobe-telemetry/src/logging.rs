//! ## netglobe-telemetry::logging
//! **Structured logging with tracing and OpenTelemetry attributes**
//!
//! ### Expectations:
//! - `RUST_LOG` overrides the configured level
//! - Lifecycle events (batch delivered, upload finished, viewer pruned) carry
//!   their attributes as `KeyValue`s under one `lifecycle_event` span

use opentelemetry::KeyValue;
use tracing::{info_span, Instrument};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

use crate::TelemetryError;

#[derive(Clone)]
pub struct EventLogger;

impl EventLogger {
    /// Installs the global subscriber. Fails if one is already installed.
    pub fn init(level: &str) -> Result<(), TelemetryError> {
        fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
            )
            .with_thread_names(true)
            .with_span_events(FmtSpan::ENTER)
            .try_init()
            .map_err(|e| TelemetryError::Subscriber(e.to_string()))
    }

    /// Synchronous variant of [`EventLogger::log_event`].
    pub fn emit(event_type: &str, metadata: &[KeyValue]) {
        let span = info_span!(
            "lifecycle_event",
            event_type = event_type,
            otel.kind = "INTERNAL"
        );
        span.in_scope(|| {
            tracing::info!(metadata = ?metadata, "Lifecycle event");
        });
    }

    #[inline]
    pub async fn log_event(event_type: &str, metadata: Vec<KeyValue>) {
        let span = info_span!(
            "lifecycle_event",
            event_type = event_type,
            otel.kind = "INTERNAL"
        );

        async {
            tracing::info!(
                metadata = ?metadata,
                "Lifecycle event"
            );
        }
        .instrument(span)
        .await
    }
}
