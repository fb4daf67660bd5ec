//! Packet capture configuration.
//!
//! Defaults match a laptop capturing its own TCP traffic on the primary
//! interface.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

/// Packet capture configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
pub struct CaptureConfig {
    /// Network interface for live capture.
    #[validate(custom(function = validation::validate_interface))]
    #[serde(default = "default_interface")]
    pub interface: String,

    /// Run in promiscuous mode?
    #[serde(default)]
    pub promiscuous: bool,

    /// Bytes captured per frame.
    #[validate(range(min = 64, max = 65535))]
    #[serde(default = "default_snaplen")]
    pub snaplen: i32,

    /// Read timeout; also bounds how long shutdown waits on the capture loop.
    #[validate(range(min = 1, max = 60000))]
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: i32,

    /// BPF filter expression.
    #[validate(custom(function = validation::validate_filter))]
    #[serde(default = "default_filter")]
    pub filter: String,

    /// Overrides the interface's first IPv4 address for classification.
    #[serde(default)]
    pub local_address: Option<Ipv4Addr>,
}

fn default_interface() -> String {
    "en0".into()
}

fn default_snaplen() -> i32 {
    1024
}

fn default_timeout_ms() -> i32 {
    1000
}

fn default_filter() -> String {
    "tcp".into()
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            promiscuous: false,
            snaplen: default_snaplen(),
            timeout_ms: default_timeout_ms(),
            filter: default_filter(),
            local_address: None,
        }
    }
}
