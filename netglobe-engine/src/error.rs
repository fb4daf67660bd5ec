use thiserror::Error;
use tokio::task::JoinError;

use netglobe_api::ApiError;
use netglobe_config::ConfigError;
use netglobe_core::error::{CaptureError, StorageError};
use netglobe_geo::OpenError;
use netglobe_telemetry::TelemetryError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Geolocation database error: {0}")]
    Geo(#[from] OpenError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Snapshot storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    #[error("Task failed: {0}")]
    Task(String),
}

impl From<JoinError> for EngineError {
    fn from(err: JoinError) -> Self {
        EngineError::Task(err.to_string())
    }
}
