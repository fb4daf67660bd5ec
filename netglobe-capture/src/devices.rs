//! Capture device discovery.

use netglobe_core::error::CaptureError;
use pcap::{Address, Device};
use serde::Serialize;
use std::fmt::Write as _;
use std::net::{IpAddr, Ipv4Addr};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceAddress {
    pub ip: IpAddr,
    pub netmask: Option<IpAddr>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub name: String,
    pub description: Option<String>,
    pub addresses: Vec<DeviceAddress>,
}

impl From<Device> for DeviceInfo {
    fn from(device: Device) -> Self {
        Self {
            name: device.name,
            description: device.desc,
            addresses: device
                .addresses
                .into_iter()
                .map(|a| DeviceAddress {
                    ip: a.addr,
                    netmask: a.netmask,
                })
                .collect(),
        }
    }
}

/// Every device libpcap can open.
pub fn list() -> Result<Vec<DeviceInfo>, CaptureError> {
    Ok(Device::list()
        .map_err(|e| CaptureError::Pcap(e.to_string()))?
        .into_iter()
        .map(DeviceInfo::from)
        .collect())
}

/// Human readable listing.
pub fn render_text(devices: &[DeviceInfo]) -> String {
    let mut out = String::from("Devices found:\n");
    for device in devices {
        let _ = writeln!(out, "\nName: {}", device.name);
        let _ = writeln!(
            out,
            "Description: {}",
            device.description.as_deref().unwrap_or("")
        );
        for address in &device.addresses {
            let _ = writeln!(out, "- IP address: {}", address.ip);
            if let Some(mask) = address.netmask {
                let _ = writeln!(out, "- Subnet mask: {mask}");
            }
        }
    }
    out
}

/// First IPv4 address in `addresses`.
pub fn first_ipv4(addresses: &[Address]) -> Option<Ipv4Addr> {
    addresses.iter().find_map(|a| match a.addr {
        IpAddr::V4(v4) => Some(v4),
        IpAddr::V6(_) => None,
    })
}

/// IPv4 address of `interface`, used to tell uploads from downloads.
pub fn interface_ipv4(interface: &str) -> Result<Ipv4Addr, CaptureError> {
    let device = Device::list()
        .map_err(|e| CaptureError::Pcap(e.to_string()))?
        .into_iter()
        .find(|d| d.name == interface)
        .ok_or_else(|| CaptureError::DeviceNotFound(interface.to_owned()))?;

    first_ipv4(&device.addresses).ok_or_else(|| CaptureError::NoIpv4Address(interface.to_owned()))
}
