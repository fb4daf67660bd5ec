//! # netglobe Configuration System
//!
//! Layered configuration for the network globe.
//!
//! ## Features
//! - **Defaults**: every field has one, so an empty environment runs
//! - **Validation**: ranges and name formats checked before anything starts
//! - **Environment Awareness**: per-environment YAML overlays and `NETGLOBE_*` overrides

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod capture;
mod error;
mod geo;
mod pipeline;
mod server;
mod storage;
mod telemetry;
mod validation;

pub use capture::CaptureConfig;
pub use error::ConfigError;
pub use geo::GeoConfig;
pub use pipeline::{HomeConfig, PipelineConfig};
pub use server::ServerConfig;
pub use storage::StorageConfig;
pub use telemetry::TelemetryConfig;

pub const BASE_FILE: &str = "config/netglobe.yaml";
pub const ENV_PREFIX: &str = "NETGLOBE_";

/// Top‑level configuration container.
#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone, PartialEq)]
pub struct NetglobeConfig {
    #[validate(nested)]
    #[serde(default)]
    pub capture: CaptureConfig,

    #[validate(nested)]
    #[serde(default)]
    pub geo: GeoConfig,

    #[validate(nested)]
    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[validate(nested)]
    #[serde(default)]
    pub server: ServerConfig,

    #[validate(nested)]
    #[serde(default)]
    pub storage: StorageConfig,

    #[validate(nested)]
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl NetglobeConfig {
    /// Load configuration from default files and environment.
    ///
    /// Hierarchy:
    /// 1. Default Values
    /// 2. `config/netglobe.yaml` - Base settings. If missing, defaults are used.
    /// 3. `config/<NETGLOBE_ENV>.yaml` - Environment‑specific overrides.
    /// 4. `NETGLOBE_*` environment variables, `__` separating sections.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(NetglobeConfig::default()));

        if Path::new(BASE_FILE).exists() {
            figment = figment.merge(Yaml::file(BASE_FILE));
        }

        let env = std::env::var("NETGLOBE_ENV").unwrap_or_else(|_| "production".into());
        let env_file = format!("config/{}.yaml", env);
        if Path::new(&env_file).exists() {
            figment = figment.merge(Yaml::file(env_file));
        }

        Self::finish(figment)
    }

    /// Load one explicit YAML file on top of the defaults, then environment.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(PathBuf::from(path)));
        }

        Self::finish(
            Figment::from(Serialized::defaults(NetglobeConfig::default())).merge(Yaml::file(path)),
        )
    }

    /// Re-runs validation, e.g. after command-line overrides.
    pub fn revalidate(self) -> Result<Self, ConfigError> {
        self.validate()?;
        Ok(self)
    }

    fn finish(figment: Figment) -> Result<Self, ConfigError> {
        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(Self::revalidate)
    }
}
