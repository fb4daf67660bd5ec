//! Viewer-facing HTTP server.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    #[serde(default = "default_host")]
    pub host: String,

    #[validate(range(min = 1))]
    #[serde(default = "default_port")]
    pub port: u16,

    /// Static viewer assets served for any path the API does not claim.
    #[serde(default)]
    pub frontend_dir: Option<PathBuf>,
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    8000
}

impl ServerConfig {
    /// `host:port` suitable for binding.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            frontend_dir: None,
        }
    }
}
