/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! `GigE` device bootstrap register layout.

/// (Address, Length) of registers of the Bootstrap Register Map.
pub mod bootstrap {
    pub const FIRST_URL: (u32, u16) = (0x0200, 512);
    pub const SECOND_URL: (u32, u16) = (0x0400, 512);
    pub const CONTROL_CHANNEL_PRIVILEGE: (u32, u16) = (0x0A00, 4);
}

/// (Offset, Length) of registers of the Stream Channel Register Map,
/// relative to [`base_address`](stream::base_address) of the channel.
pub mod stream {
    pub const STREAM_CHANNEL_PORT: (u32, u16) = (0x0000, 4);
    pub const STREAM_CHANNEL_PACKET_SIZE: (u32, u16) = (0x0004, 4);
    pub const STREAM_CHANNEL_DESTINATION_ADDRESS: (u32, u16) = (0x0018, 4);

    pub fn base_address(channel_index: u32) -> u32 {
        0x0D00 + 0x0040 * channel_index
    }
}

/// Value of the `CONTROL_CHANNEL_PRIVILEGE` bootstrap register.
///
/// Writing control access (raw value 2) makes the writer the device's
/// controller, writing 0 releases the privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControlChannelPrivilege(u32);

impl ControlChannelPrivilege {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_raw(self) -> u32 {
        self.0
    }

    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn is_exclusive_access_enabled(self) -> bool {
        self.0 & 0b01 != 0
    }

    pub fn enable_exclusive_access(self) -> Self {
        Self(self.0 | 0b01)
    }

    pub fn disable_exclusive_access(self) -> Self {
        Self(self.0 & !0b01)
    }

    pub fn is_control_access_enabled(self) -> bool {
        self.0 & 0b10 != 0
    }

    pub fn enable_control_access(self) -> Self {
        Self(self.0 | 0b10)
    }

    pub fn disable_control_access(self) -> Self {
        Self(self.0 & !0b10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_access_is_raw_two() {
        let ccp = ControlChannelPrivilege::new().enable_control_access();
        assert_eq!(ccp.as_raw(), 2);
        assert!(ccp.is_control_access_enabled());
        assert!(!ccp.is_exclusive_access_enabled());
        assert_eq!(ccp.disable_control_access().as_raw(), 0);
    }

    #[test]
    fn stream_channel_block_addressing() {
        assert_eq!(stream::base_address(0), 0x0D00);
        assert_eq!(stream::base_address(1), 0x0D40);
        assert_eq!(
            stream::base_address(0) + stream::STREAM_CHANNEL_DESTINATION_ADDRESS.0,
            0x0D18
        );
    }
}
