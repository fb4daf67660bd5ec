//! ## netglobe-core::events
//! **Flow data model shared by every pipeline stage**
//!
//! A captured [`TransportRecord`] is classified into a [`FlowObservation`],
//! geolocated into a [`FlowEvent`], aggregated under its [`FlowKey`] and
//! finally delivered to viewers inside a [`BatchMessage`].

pub mod network;

pub use network::{TransportProtocol, TransportRecord};

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Geographic position in decimal degrees.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Direction of payload relative to the local host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Upload,
    Download,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upload => f.write_str("Upload"),
            Direction::Download => f.write_str("Download"),
        }
    }
}

/// A data-carrying TCP segment seen from the local host's point of view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlowObservation {
    pub local_is_source: bool,
    pub remote_address: IpAddr,
    pub payload_bytes: usize,
    pub direction: Direction,
}

/// One visualized line between the home coordinate and a geolocated peer.
///
/// Serializes to the wire shape viewers expect:
/// `{"src":{..},"dst":{..},"direction","count","name","color"}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlowEvent {
    pub src: Coordinate,
    pub dst: Coordinate,
    pub direction: Direction,
    #[serde(rename = "count")]
    pub occurrence_count: u64,
    #[serde(rename = "name")]
    pub country_name: String,
    pub color: String,
}

impl FlowEvent {
    /// Builds a fresh event with no count and no color yet.
    pub fn new(src: Coordinate, dst: Coordinate, direction: Direction, country_name: String) -> Self {
        Self {
            src,
            dst,
            direction,
            occurrence_count: 0,
            country_name,
            color: String::new(),
        }
    }

    pub fn key(&self) -> FlowKey {
        FlowKey::new(&self.src, &self.dst)
    }
}

/// Aggregation key built from the four coordinate components of an event.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlowKey(String);

impl FlowKey {
    pub fn new(src: &Coordinate, dst: &Coordinate) -> Self {
        Self(format!(
            "{:.6},{:.6}:{:.6},{:.6}",
            src.lat, src.lng, dst.lat, dst.lng
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The single message sent to every viewer per delivered batch.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchMessage {
    pub messages: Vec<FlowEvent>,
}

impl BatchMessage {
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
