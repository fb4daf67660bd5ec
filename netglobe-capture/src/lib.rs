//! netglobe‑capture
//!
//! Live packet capture for netglobe.
//! Frames are read with libpcap and decoded with etherparse into
//! [`TransportRecord`](netglobe_core::events::TransportRecord)s.

pub mod capture;
pub mod devices;
pub mod packet;

pub use capture::{CaptureSettings, LiveSource}; // Re-export for easier use
pub use devices::{interface_ipv4, DeviceInfo};
pub use packet::{decode, LinkKind};
