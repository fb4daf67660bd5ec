//! ## netglobe-core::geo
//! **Geolocation of remote endpoints**
//!
//! [`GeoEnricher`] resolves the remote side of an observation and orients
//! the resulting line so the packet sender is always `src`.

use std::net::IpAddr;
use std::sync::Arc;

use crate::error::GeoError;
use crate::events::{Coordinate, FlowEvent, FlowObservation};

/// Result of a successful address lookup.
#[derive(Clone, Debug, PartialEq)]
pub struct GeoLocation {
    /// English country name, empty when the database has none
    pub country_name: String,
    pub coordinate: Coordinate,
}

/// Maps an IP address to a country and approximate coordinate.
pub trait GeoResolver: Send + Sync {
    fn lookup(&self, ip: IpAddr) -> Result<GeoLocation, GeoError>;
}

impl<T: GeoResolver + ?Sized> GeoResolver for Arc<T> {
    fn lookup(&self, ip: IpAddr) -> Result<GeoLocation, GeoError> {
        (**self).lookup(ip)
    }
}

/// Turns observations into oriented flow events.
#[derive(Clone)]
pub struct GeoEnricher {
    resolver: Arc<dyn GeoResolver>,
    home: Coordinate,
}

impl GeoEnricher {
    pub fn new(resolver: Arc<dyn GeoResolver>, home: Coordinate) -> Self {
        Self { resolver, home }
    }

    pub fn home(&self) -> Coordinate {
        self.home
    }

    /// Resolves the remote endpoint of `observation`.
    ///
    /// When the local host sent the packet the line starts at home; otherwise
    /// it starts at the resolved peer and ends at home.
    pub fn enrich(&self, observation: &FlowObservation) -> Result<FlowEvent, GeoError> {
        let location = self.resolver.lookup(observation.remote_address)?;

        let (src, dst) = if observation.local_is_source {
            (self.home, location.coordinate)
        } else {
            (location.coordinate, self.home)
        };

        Ok(FlowEvent::new(
            src,
            dst,
            observation.direction,
            location.country_name,
        ))
    }
}
