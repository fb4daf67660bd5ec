//! ## netglobe-core::classify
//! **Upload/download classification of captured TCP segments**
//!
//! Only IPv4-over-TCP segments that carry payload are kept. Handshake
//! segments and bare ACKs have no payload and are dropped here, so they
//! never reach the aggregation stage.

use std::net::{IpAddr, Ipv4Addr};

use crate::events::{Direction, FlowObservation, TransportProtocol, TransportRecord};

/// Classifies records relative to the local host's IPv4 address.
#[derive(Clone, Copy, Debug)]
pub struct FlowClassifier {
    local: Ipv4Addr,
}

impl FlowClassifier {
    pub fn new(local: Ipv4Addr) -> Self {
        Self { local }
    }

    pub fn local_address(&self) -> Ipv4Addr {
        self.local
    }

    /// Turns a record into an observation, or `None` when the record is not
    /// a data-carrying IPv4 TCP segment.
    #[inline]
    pub fn classify(&self, record: &TransportRecord) -> Option<FlowObservation> {
        if record.protocol != TransportProtocol::Tcp || !record.is_ipv4() {
            return None;
        }
        if record.payload_len == 0 {
            return None;
        }

        let local = IpAddr::V4(self.local);
        let local_is_source = record.source == local;
        let (direction, remote_address) = if local_is_source {
            (Direction::Upload, record.destination)
        } else {
            (Direction::Download, record.source)
        };

        Some(FlowObservation {
            local_is_source,
            remote_address,
            payload_bytes: record.payload_len,
            direction,
        })
    }
}
