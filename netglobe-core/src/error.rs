use std::net::IpAddr;

use thiserror::Error;

/// Failures reported by a [`GeoResolver`](crate::geo::GeoResolver).
#[derive(Debug, Error)]
pub enum GeoError {
    #[error("Address {0} not found in geolocation database")]
    NotFound(IpAddr),

    #[error("Geolocation database error: {0}")]
    Database(String),
}

/// Failures reported by a [`PushTransport`](crate::subscribers::PushTransport).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection closed")]
    Closed,

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Send timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Failures reported by an [`ObjectStore`](crate::snapshot::ObjectStore).
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid object name: {0}")]
    InvalidName(String),

    #[error("Upload already committed")]
    Committed,

    #[error("Metadata encoding error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures reported while opening or reading a [`PacketSource`](crate::source::PacketSource).
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("No such device exists: {0}\n\nDetermine your network device:\n\n  netglobe list-devices\n\nThen run with `--interface <device>`")]
    DeviceNotFound(String),

    #[error("Permission denied opening {0}\n\nTo fix run in terminal and restart:\n\n  sudo chmod +r /dev/bpf*\n\nor run as root")]
    PermissionDenied(String),

    #[error("Interface {0} has no IPv4 address")]
    NoIpv4Address(String),

    #[error("Invalid capture filter {filter:?}: {reason}")]
    Filter { filter: String, reason: String },

    #[error("Capture error: {0}")]
    Pcap(String),
}
