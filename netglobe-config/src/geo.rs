//! Geolocation database location.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
pub struct GeoConfig {
    /// Path to a GeoLite2 City database.
    #[validate(custom(function = validation::validate_non_empty_path))]
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./GeoLite2-City.mmdb")
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}
