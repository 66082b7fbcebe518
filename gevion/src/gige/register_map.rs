/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! `GigE` device register structs.
//!
//! This module abstracts the physical layout of the device's bootstrap and
//! stream channel registers and provides an easy access to them through any
//! [`DeviceControl`] implementation.

pub use gevion_device::gvcp::register_map::ControlChannelPrivilege;

use std::net::Ipv4Addr;

use gevion_device::gvcp::register_map::{bootstrap, stream};

use crate::{ControlError, ControlResult, DeviceControl};

/// Represents the Bootstrap register map of a `GigE` device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bootstrap {}

impl Bootstrap {
    /// Creates an accessor of the bootstrap register map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The first XML URL string, NUL-trimmed.
    pub fn first_url<Ctrl: DeviceControl + ?Sized>(
        self,
        device: &mut Ctrl,
    ) -> ControlResult<String> {
        self.url_string(device, bootstrap::FIRST_URL)
    }

    /// The second XML URL string, NUL-trimmed.
    pub fn second_url<Ctrl: DeviceControl + ?Sized>(
        self,
        device: &mut Ctrl,
    ) -> ControlResult<String> {
        self.url_string(device, bootstrap::SECOND_URL)
    }

    /// Current value of the control channel privilege register.
    pub fn control_channel_privilege<Ctrl: DeviceControl + ?Sized>(
        self,
        device: &mut Ctrl,
    ) -> ControlResult<ControlChannelPrivilege> {
        let raw = device.read_reg(u64::from(bootstrap::CONTROL_CHANNEL_PRIVILEGE.0))?;
        Ok(ControlChannelPrivilege::from_raw(raw))
    }

    /// Writes the control channel privilege register.
    pub fn set_control_channel_privilege<Ctrl: DeviceControl + ?Sized>(
        self,
        device: &mut Ctrl,
        privilege: ControlChannelPrivilege,
    ) -> ControlResult<()> {
        device.write_reg(
            u64::from(bootstrap::CONTROL_CHANNEL_PRIVILEGE.0),
            privilege.as_raw(),
        )
    }

    fn url_string<Ctrl: DeviceControl + ?Sized>(
        self,
        device: &mut Ctrl,
        register: (u32, u16),
    ) -> ControlResult<String> {
        let (address, len) = register;
        let mut buf = vec![0; len as usize];
        device.read(u64::from(address), &mut buf)?;

        // The register content is NUL padded, but an uncooperative device
        // may fill all 512 bytes.
        if let Some(last) = buf.last_mut() {
            *last = 0;
        }
        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
    }
}

/// Register accessors of one of the device's stream channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamRegister {
    base: u32,
}

impl StreamRegister {
    /// Creates an accessor of the stream channel with the given index.
    #[must_use]
    pub fn new(channel_index: u32) -> Self {
        Self {
            base: stream::base_address(channel_index),
        }
    }

    /// Host UDP port the channel currently streams to.
    pub fn channel_port<Ctrl: DeviceControl + ?Sized>(
        self,
        device: &mut Ctrl,
    ) -> ControlResult<u32> {
        device.read_reg(self.address_of(stream::STREAM_CHANNEL_PORT))
    }

    /// Directs the channel to a host UDP port.
    pub fn set_channel_port<Ctrl: DeviceControl + ?Sized>(
        self,
        device: &mut Ctrl,
        port: u32,
    ) -> ControlResult<()> {
        device.write_reg(self.address_of(stream::STREAM_CHANNEL_PORT), port)
    }

    /// Sets the `GVSP` packet size of the channel in bytes.
    pub fn set_packet_size<Ctrl: DeviceControl + ?Sized>(
        self,
        device: &mut Ctrl,
        size: u32,
    ) -> ControlResult<()> {
        device.write_reg(self.address_of(stream::STREAM_CHANNEL_PACKET_SIZE), size)
    }

    /// Directs the channel to a host IPv4 address.
    pub fn set_destination_address<Ctrl: DeviceControl + ?Sized>(
        self,
        device: &mut Ctrl,
        address: Ipv4Addr,
    ) -> ControlResult<()> {
        device.write(
            self.address_of(stream::STREAM_CHANNEL_DESTINATION_ADDRESS),
            &address.octets(),
        )
    }

    fn address_of(self, register: (u32, u16)) -> u64 {
        u64::from(self.base + register.0)
    }
}

/// Location of the `GenICam` XML file named by a bootstrap URL register.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum XmlFileLocation {
    /// The file is stored in the device's register space.
    Device {
        /// Start address of the file.
        address: u32,
        /// File size in bytes.
        size: u32,
    },

    /// The file is stored on the host filesystem.
    Host {
        /// Path of the file, scheme stripped.
        path: String,
    },
}

impl XmlFileLocation {
    /// Parses a URL of the form `scheme path [;address[;size]]` where
    /// `scheme` is `local:` or `file:` (case-insensitive), `path` ends in
    /// `.xml` and the `local:` variant carries hexadecimal address and size
    /// fields.
    pub fn parse(url: &str) -> ControlResult<Self> {
        let url = url.trim_end_matches('\0');
        let mut tokens = url.split(';');

        let locator = match tokens.next() {
            Some(locator) if !locator.is_empty() => locator,
            _ => return Err(ControlError::InvalidData("XML URL is empty".into())),
        };

        if let Some(path) = strip_scheme(locator, "file:") {
            Self::verify_path(path)?;
            Ok(XmlFileLocation::Host {
                path: path.to_string(),
            })
        } else if let Some(path) = strip_scheme(locator, "local:") {
            Self::verify_path(path)?;
            let address = parse_hex_field(tokens.next())?;
            let size = parse_hex_field(tokens.next())?;
            if size == 0 {
                return Err(ControlError::InvalidData(
                    "XML URL names a zero sized file".into(),
                ));
            }
            Ok(XmlFileLocation::Device { address, size })
        } else {
            Err(ControlError::InvalidData(
                format!("unsupported XML URL scheme: {}", locator).into(),
            ))
        }
    }

    fn verify_path(path: &str) -> ControlResult<()> {
        let valid = path.len() > ".xml".len()
            && path
                .get(path.len() - 4..)
                .map_or(false, |ext| ext.eq_ignore_ascii_case(".xml"));
        if valid {
            Ok(())
        } else {
            Err(ControlError::InvalidData(
                format!("XML URL path must name an `.xml` file: {}", path).into(),
            ))
        }
    }
}

fn strip_scheme<'a>(locator: &'a str, scheme: &str) -> Option<&'a str> {
    match (locator.get(..scheme.len()), locator.get(scheme.len()..)) {
        (Some(head), Some(tail)) if head.eq_ignore_ascii_case(scheme) => Some(tail),
        _ => None,
    }
}

fn parse_hex_field(token: Option<&str>) -> ControlResult<u32> {
    let token = match token {
        Some(token) if !token.is_empty() => token,
        _ => {
            return Err(ControlError::InvalidData(
                "XML URL misses an address or size field".into(),
            ))
        }
    };

    u32::from_str_radix(token, 16).map_err(|_| {
        ControlError::InvalidData(format!("invalid hexadecimal field in XML URL: {}", token).into())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_device_location() {
        let location = XmlFileLocation::parse("Local:cam.xml;10000;40").unwrap();
        assert_eq!(
            location,
            XmlFileLocation::Device {
                address: 0x10000,
                size: 0x40
            }
        );
    }

    #[test]
    fn parses_host_location() {
        let location = XmlFileLocation::parse("file:/opt/camera/desc.xml").unwrap();
        assert_eq!(
            location,
            XmlFileLocation::Host {
                path: "/opt/camera/desc.xml".to_string()
            }
        );
    }

    #[test]
    fn scheme_is_case_insensitive() {
        assert!(XmlFileLocation::parse("LOCAL:CAM.XML;0;4").is_ok());
        assert!(XmlFileLocation::parse("File:desc.xml").is_ok());
    }

    #[test]
    fn trims_register_padding() {
        let location = XmlFileLocation::parse("Local:cam.xml;10000;40\0\0\0\0").unwrap();
        assert!(matches!(location, XmlFileLocation::Device { .. }));
    }

    #[test]
    fn rejects_missing_fields() {
        assert!(XmlFileLocation::parse("").is_err());
        assert!(XmlFileLocation::parse("local:cam.xml").is_err());
        assert!(XmlFileLocation::parse("local:cam.xml;10000").is_err());
        assert!(XmlFileLocation::parse("local:cam.xml;;").is_err());
    }

    #[test]
    fn rejects_zero_sized_file() {
        assert!(XmlFileLocation::parse("local:cam.xml;10000;0").is_err());
    }

    #[test]
    fn rejects_bogus_urls() {
        assert!(XmlFileLocation::parse("http://example.com/cam.xml").is_err());
        assert!(XmlFileLocation::parse("local:cam.txt;10000;40").is_err());
        assert!(XmlFileLocation::parse("local:;10000;40").is_err());
        assert!(XmlFileLocation::parse("local:cam.xml;zz;40").is_err());
    }
}
