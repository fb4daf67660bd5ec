//! ## netglobe-geo
//! **GeoLite2 City lookups**
//!
//! ### Expectations:
//! - The database is memory-loaded once at startup and shared read-only
//! - A missing country name resolves to `""`, a missing location to `(0, 0)`

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use maxminddb::{geoip2, MaxMindDBError, Reader};
use netglobe_core::error::GeoError;
use netglobe_core::events::Coordinate;
use netglobe_core::geo::{GeoLocation, GeoResolver};
use thiserror::Error;
use tracing::info;

pub const DOWNLOAD_URL: &str = "https://dev.maxmind.com/geoip/geolite2-free-geolocation-data";

#[derive(Debug, Error)]
pub enum OpenError {
    #[error("{}: no such file or directory\n\nDownload the free GeoLite2-City.mmdb file from:\n\n  https://dev.maxmind.com/geoip/geolite2-free-geolocation-data\n\nThen run with `--geolite2-path <path to database>`", path.display())]
    Missing { path: PathBuf },

    #[error("Failed to open geolocation database {}: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },
}

/// [`GeoResolver`] over a MaxMind City database.
pub struct MaxMindResolver {
    reader: Reader<Vec<u8>>,
}

impl MaxMindResolver {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, OpenError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(OpenError::Missing {
                path: path.to_path_buf(),
            });
        }

        let reader = Reader::open_readfile(path).map_err(|e| OpenError::Invalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        info!(
            path = %path.display(),
            database = %reader.metadata.database_type,
            "Geolocation database loaded"
        );
        Ok(Self { reader })
    }
}

impl GeoResolver for MaxMindResolver {
    fn lookup(&self, ip: IpAddr) -> Result<GeoLocation, GeoError> {
        let city: geoip2::City = self.reader.lookup(ip).map_err(|e| match e {
            MaxMindDBError::AddressNotFoundError(_) => GeoError::NotFound(ip),
            other => GeoError::Database(other.to_string()),
        })?;

        let names = city.country.as_ref().and_then(|c| c.names.as_ref());
        let (lat, lng) = city
            .location
            .as_ref()
            .map(|l| (l.latitude, l.longitude))
            .unwrap_or_default();

        Ok(location(names, lat, lng))
    }
}

/// Builds a [`GeoLocation`] from the optional database fields.
fn location(names: Option<&BTreeMap<&str, &str>>, lat: Option<f64>, lng: Option<f64>) -> GeoLocation {
    GeoLocation {
        country_name: names
            .and_then(|n| n.get("en"))
            .map(|name| (*name).to_owned())
            .unwrap_or_default(),
        coordinate: Coordinate::new(lat.unwrap_or(0.0), lng.unwrap_or(0.0)),
    }
}
