//! Flow pipeline parameters.
//!
//! Governs how observed flows are placed on the globe and how often they
//! are pushed to viewers:
//! - Home coordinate where local lines start or end
//! - Batch threshold and broadcast interval
//! - Per-packet debug logging

use std::time::Duration;

use netglobe_core::events::Coordinate;
use netglobe_core::scheduler::BatchThreshold;
use serde::{Deserialize, Serialize};
use validator::{self, Validate};

/// Fixed position of the local host.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, Copy, PartialEq)]
pub struct HomeConfig {
    #[validate(range(min = -90.0, max = 90.0))]
    pub lat: f64,

    #[validate(range(min = -180.0, max = 180.0))]
    pub lng: f64,
}

impl Default for HomeConfig {
    fn default() -> Self {
        Self {
            lat: 39.781932,
            lng: -104.970578,
        }
    }
}

impl From<HomeConfig> for Coordinate {
    fn from(home: HomeConfig) -> Self {
        Coordinate::new(home.lat, home.lng)
    }
}

#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
pub struct PipelineConfig {
    #[validate(nested)]
    #[serde(default)]
    pub home: HomeConfig,

    /// Minimum batch size before anything is sent to viewers.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// What `batch_size` is compared against.
    #[serde(default)]
    pub batch_threshold: BatchThreshold,

    #[validate(range(min = 1, max = 3600))]
    #[serde(default = "default_interval")]
    pub broadcast_interval_secs: u64,

    /// Enables per-packet debug lines.
    #[serde(default = "default_true")]
    pub debug: bool,

    /// Only payloads larger than this are logged per packet.
    #[serde(default = "default_debug_payload_bytes")]
    pub debug_payload_bytes: usize,

    /// Deadline for one send to one viewer.
    #[validate(range(min = 1, max = 60000))]
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
}

fn default_batch_size() -> usize {
    5
}

fn default_interval() -> u64 {
    6
}

fn default_true() -> bool {
    true
}

fn default_debug_payload_bytes() -> usize {
    900
}

fn default_send_timeout_ms() -> u64 {
    2000
}

impl PipelineConfig {
    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_secs(self.broadcast_interval_secs)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Threshold for per-packet debug lines, `None` when debugging is off.
    pub fn debug_threshold(&self) -> Option<usize> {
        self.debug.then_some(self.debug_payload_bytes)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            home: HomeConfig::default(),
            batch_size: default_batch_size(),
            batch_threshold: BatchThreshold::default(),
            broadcast_interval_secs: default_interval(),
            debug: default_true(),
            debug_payload_bytes: default_debug_payload_bytes(),
            send_timeout_ms: default_send_timeout_ms(),
        }
    }
}
