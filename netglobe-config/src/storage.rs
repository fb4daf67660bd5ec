//! Snapshot upload configuration.
//!
//! Uploads are disabled unless `enabled` is set.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
pub struct StorageConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Directory holding one subdirectory per bucket.
    #[validate(custom(function = validation::validate_non_empty_path))]
    #[serde(default = "default_root")]
    pub root: PathBuf,

    #[validate(custom(function = validation::validate_object_name))]
    #[serde(default = "default_bucket")]
    pub bucket: String,

    #[validate(custom(function = validation::validate_object_name))]
    #[serde(default = "default_object_key")]
    pub object_key: String,

    /// Snapshot lifetime, at most one year.
    #[validate(range(min = 1, max = 31536000))]
    #[serde(default = "default_expiry_secs")]
    pub expiry_secs: u64,

    #[validate(range(min = 1, max = 67108864))]
    #[serde(default = "default_payload_bytes")]
    pub payload_bytes: usize,

    /// Upload only after a viewer sent `start` or `routes_done`.
    #[serde(default)]
    pub require_viewer_signal: bool,
}

fn default_root() -> PathBuf {
    PathBuf::from("./snapshots")
}

fn default_bucket() -> String {
    "network-globe".into()
}

fn default_object_key() -> String {
    "test.txt".into()
}

fn default_expiry_secs() -> u64 {
    3600
}

fn default_payload_bytes() -> usize {
    8024
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            root: default_root(),
            bucket: default_bucket(),
            object_key: default_object_key(),
            expiry_secs: default_expiry_secs(),
            payload_bytes: default_payload_bytes(),
            require_viewer_signal: false,
        }
    }
}
