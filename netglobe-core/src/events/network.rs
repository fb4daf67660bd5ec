//! Decoded transport-layer records handed over by a packet source.

use std::net::IpAddr;

/// Transport protocol carried by a captured IP packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportProtocol {
    Tcp,
    Udp,
    Other,
}

/// Protocol-agnostic view of one captured packet, reduced to what the
/// flow pipeline inspects: endpoints, transport, payload size and whether
/// the segment is part of a TCP handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportRecord {
    /// Source address from the network header
    pub source: IpAddr,

    /// Destination address from the network header
    pub destination: IpAddr,

    pub protocol: TransportProtocol,

    /// Length of the transport payload in bytes (headers excluded)
    pub payload_len: usize,

    /// SYN flag set on a TCP segment
    pub syn: bool,
}

impl TransportRecord {
    /// Creates a TCP record with the given payload length.
    #[inline]
    pub fn tcp(source: IpAddr, destination: IpAddr, payload_len: usize) -> Self {
        Self {
            source,
            destination,
            protocol: TransportProtocol::Tcp,
            payload_len,
            syn: false,
        }
    }

    #[inline]
    pub fn is_ipv4(&self) -> bool {
        self.source.is_ipv4() && self.destination.is_ipv4()
    }
}
