//! Decoding of captured frames into transport records.
//!
//! Frames are cut at the capture snaplen, so decoding is lax: headers that
//! were captured are used even when the payload was truncated. The payload
//! length is taken from the IP header (total length minus IP, extension and
//! transport headers), which is the on-the-wire size independent of snaplen
//! and ignores Ethernet padding.

use etherparse::{LaxPacketHeaders, NetHeaders, TransportHeader};
use netglobe_core::events::{TransportProtocol, TransportRecord};
use pcap::Linktype;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// BSD loopback pseudo-header: 4-byte address family
const NULL_HEADER_LEN: usize = 4;
/// Linux "cooked" capture header used by the `any` device
const LINUX_SLL_HEADER_LEN: usize = 16;

/// Link layers this crate can strip to reach the IP header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Ethernet,
    RawIp,
    Null,
    LinuxSll,
}

impl LinkKind {
    pub fn from_linktype(linktype: Linktype) -> Option<Self> {
        match linktype {
            Linktype::ETHERNET => Some(Self::Ethernet),
            Linktype::RAW | Linktype::IPV4 | Linktype::IPV6 => Some(Self::RawIp),
            Linktype::NULL | Linktype::LOOP => Some(Self::Null),
            Linktype::LINUX_SLL => Some(Self::LinuxSll),
            _ => None,
        }
    }
}

/// Decodes a raw frame of the given link type into a [`TransportRecord`].
pub fn decode(link: LinkKind, frame: &[u8]) -> Option<TransportRecord> {
    let headers = match link {
        LinkKind::Ethernet => LaxPacketHeaders::from_ethernet(frame).ok()?,
        LinkKind::RawIp => LaxPacketHeaders::from_ip(frame).ok()?,
        LinkKind::Null => LaxPacketHeaders::from_ip(frame.get(NULL_HEADER_LEN..)?).ok()?,
        LinkKind::LinuxSll => LaxPacketHeaders::from_ip(frame.get(LINUX_SLL_HEADER_LEN..)?).ok()?,
    };

    let transport_len = headers
        .transport
        .as_ref()
        .map_or(0, |transport| usize::from(transport.header_len()));

    let (source, destination, ip_payload_len) = match &headers.net {
        Some(NetHeaders::Ipv4(ipv4, extensions)) => (
            IpAddr::V4(Ipv4Addr::from(ipv4.source)),
            IpAddr::V4(Ipv4Addr::from(ipv4.destination)),
            usize::from(ipv4.total_len)
                .saturating_sub(usize::from(ipv4.header_len()))
                .saturating_sub(usize::from(extensions.header_len())),
        ),
        Some(NetHeaders::Ipv6(ipv6, extensions)) => (
            IpAddr::V6(Ipv6Addr::from(ipv6.source)),
            IpAddr::V6(Ipv6Addr::from(ipv6.destination)),
            usize::from(ipv6.payload_length).saturating_sub(usize::from(extensions.header_len())),
        ),
        _ => return None,
    };

    let (protocol, syn) = match &headers.transport {
        Some(TransportHeader::Tcp(tcp)) => (TransportProtocol::Tcp, tcp.syn),
        Some(TransportHeader::Udp(_)) => (TransportProtocol::Udp, false),
        _ => (TransportProtocol::Other, false),
    };

    Some(TransportRecord {
        source,
        destination,
        protocol,
        payload_len: ip_payload_len.saturating_sub(transport_len),
        syn,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use etherparse::PacketBuilder;

    const LOCAL: [u8; 4] = [192, 168, 1, 10];
    const REMOTE: [u8; 4] = [93, 184, 216, 34];

    fn ethernet_tcp(payload: &[u8]) -> Vec<u8> {
        let builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [6, 5, 4, 3, 2, 1])
            .ipv4(LOCAL, REMOTE, 64)
            .tcp(51000, 443, 1, 65535);
        let mut frame = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut frame, payload).unwrap();
        frame
    }

    #[test]
    fn decodes_ethernet_tcp() {
        let record = decode(LinkKind::Ethernet, &ethernet_tcp(&[0xAB; 120])).unwrap();
        assert_eq!(record.source, IpAddr::V4(Ipv4Addr::from(LOCAL)));
        assert_eq!(record.destination, IpAddr::V4(Ipv4Addr::from(REMOTE)));
        assert_eq!(record.protocol, TransportProtocol::Tcp);
        assert_eq!(record.payload_len, 120);
        assert!(!record.syn);
    }

    #[test]
    fn syn_without_payload_is_flagged() {
        let builder = PacketBuilder::ipv4(REMOTE, LOCAL, 64)
            .tcp(443, 51000, 7, 1024)
            .syn();
        let mut frame = Vec::new();
        builder.write(&mut frame, &[]).unwrap();

        let record = decode(LinkKind::RawIp, &frame).unwrap();
        assert!(record.syn);
        assert_eq!(record.payload_len, 0);
    }

    #[test]
    fn strips_loopback_family_header() {
        let builder = PacketBuilder::ipv4(LOCAL, REMOTE, 64).tcp(1, 2, 3, 4);
        let mut frame = vec![2, 0, 0, 0];
        builder.write(&mut frame, b"hello").unwrap();

        let record = decode(LinkKind::Null, &frame).unwrap();
        assert_eq!(record.payload_len, 5);
    }

    #[test]
    fn udp_is_decoded_but_marked() {
        let builder = PacketBuilder::ipv4(LOCAL, REMOTE, 64).udp(53, 53);
        let mut frame = Vec::new();
        builder.write(&mut frame, &[0; 12]).unwrap();

        let record = decode(LinkKind::RawIp, &frame).unwrap();
        assert_eq!(record.protocol, TransportProtocol::Udp);
    }

    #[test]
    fn snaplen_truncated_segment_keeps_wire_payload_length() {
        let mut frame = ethernet_tcp(&[0xCD; 1400]);
        frame.truncate(1024);

        let record = decode(LinkKind::Ethernet, &frame).unwrap();
        assert_eq!(record.protocol, TransportProtocol::Tcp);
        assert_eq!(record.source, IpAddr::V4(Ipv4Addr::from(LOCAL)));
        assert_eq!(record.payload_len, 1400);
    }

    #[test]
    fn ethernet_padding_is_not_payload() {
        let mut frame = ethernet_tcp(&[]);
        frame.extend_from_slice(&[0; 6]);

        let record = decode(LinkKind::Ethernet, &frame).unwrap();
        assert_eq!(record.protocol, TransportProtocol::Tcp);
        assert_eq!(record.payload_len, 0);
    }

    #[test]
    fn truncated_frames_are_skipped() {
        assert!(decode(LinkKind::Ethernet, &[0u8; 10]).is_none());
        assert!(decode(LinkKind::Null, &[2, 0]).is_none());
    }

    #[test]
    fn linktype_mapping() {
        assert_eq!(
            LinkKind::from_linktype(Linktype::ETHERNET),
            Some(LinkKind::Ethernet)
        );
        assert_eq!(LinkKind::from_linktype(Linktype::NULL), Some(LinkKind::Null));
        assert_eq!(LinkKind::from_linktype(Linktype(147)), None);
    }
}
