use crate::packet::{decode, LinkKind};
use netglobe_core::error::CaptureError;
use netglobe_core::events::TransportRecord;
use netglobe_core::source::PacketSource;
use pcap::{Active, Capture, Device};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Settings for opening a live capture.
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub interface: String,
    pub promiscuous: bool,
    pub snaplen: i32,
    pub timeout_ms: i32,
    /// BPF filter expression; empty captures everything
    pub filter: String,
}

/// Live libpcap capture on one interface.
///
/// Reads block for at most `timeout_ms`, after which `terminate` is checked
/// and the read is retried.
pub struct LiveSource {
    capture: Capture<Active>,
    link: LinkKind,
    terminate: Arc<AtomicBool>,
}

impl std::fmt::Debug for LiveSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSource")
            .field("link", &self.link)
            .finish_non_exhaustive()
    }
}

impl LiveSource {
    pub fn open(settings: &CaptureSettings, terminate: Arc<AtomicBool>) -> Result<Self, CaptureError> {
        let device = Device::list()
            .map_err(|e| CaptureError::Pcap(e.to_string()))?
            .into_iter()
            .find(|d| d.name == settings.interface)
            .ok_or_else(|| CaptureError::DeviceNotFound(settings.interface.clone()))?;

        let mut capture = Capture::from_device(device)
            .map_err(|e| open_error(&settings.interface, e))?
            .promisc(settings.promiscuous)
            .snaplen(settings.snaplen)
            .timeout(settings.timeout_ms)
            .open()
            .map_err(|e| open_error(&settings.interface, e))?;

        if !settings.filter.is_empty() {
            capture
                .filter(&settings.filter, true)
                .map_err(|e| CaptureError::Filter {
                    filter: settings.filter.clone(),
                    reason: e.to_string(),
                })?;
        }

        let linktype = capture.get_datalink();
        let link = LinkKind::from_linktype(linktype).ok_or_else(|| {
            CaptureError::Pcap(format!(
                "Unsupported datalink {:?} on {}",
                linktype, settings.interface
            ))
        })?;

        info!(
            interface = %settings.interface,
            filter = %settings.filter,
            ?link,
            "Capture opened"
        );
        Ok(Self {
            capture,
            link,
            terminate,
        })
    }
}

impl PacketSource for LiveSource {
    fn next_record(&mut self) -> Result<Option<TransportRecord>, CaptureError> {
        while !self.terminate.load(Ordering::Relaxed) {
            match self.capture.next_packet() {
                Ok(packet) => {
                    if let Some(record) = decode(self.link, packet.data) {
                        return Ok(Some(record));
                    }
                }
                Err(pcap::Error::TimeoutExpired) => {
                    // No packet received in this timeout window; just continue.
                    continue;
                }
                Err(pcap::Error::NoMorePackets) => {
                    debug!("Capture device closed");
                    return Ok(None);
                }
                Err(e) => {
                    warn!("Error capturing packet: {e}");
                    return Err(CaptureError::Pcap(e.to_string()));
                }
            }
        }
        Ok(None)
    }
}

/// Maps libpcap open failures onto errors carrying a remedy.
fn open_error(interface: &str, error: pcap::Error) -> CaptureError {
    let message = error.to_string();
    if message.contains("Permission denied") || message.contains("don't have permission") {
        CaptureError::PermissionDenied(format!("{interface}: {message}"))
    } else if message.contains("No such device") {
        CaptureError::DeviceNotFound(interface.to_owned())
    } else {
        CaptureError::Pcap(message)
    }
}
