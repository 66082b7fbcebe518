/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::net::Ipv4Addr;

use async_std::{net::UdpSocket, task};

use crate::{ControlError, ControlResult};

/// Receive side of a `GVSP` stream channel.
///
/// The handle owns the UDP socket the device's stream channel is directed
/// to; payload reception itself is up to the caller. The handle is created
/// by [`ControlHandle::create_stream`](super::ControlHandle::create_stream)
/// and owned by the caller afterwards.
#[derive(Debug)]
pub struct StreamHandle {
    sock: UdpSocket,
    port: u16,
}

impl StreamHandle {
    pub(super) fn new(interface_addr: Ipv4Addr) -> ControlResult<Self> {
        let sock = task::block_on(UdpSocket::bind((interface_addr, 0)))
            .map_err(|err| ControlError::Io(err.into()))?;
        let port = sock
            .local_addr()
            .map_err(|err| ControlError::Io(err.into()))?
            .port();
        Ok(Self { sock, port })
    }

    /// Local UDP port the device's stream channel is directed to.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Hands the underlying socket to a stream receiver.
    #[must_use]
    pub fn into_socket(self) -> UdpSocket {
        self.sock
    }
}
