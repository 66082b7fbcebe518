/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! `GigE Vision` device control.

pub mod control_handle;
pub mod register_map;
pub mod stream_handle;

pub use control_handle::{ConnectionConfig, ControlHandle};
pub use stream_handle::StreamHandle;

use gevion_device::gvcp;

use crate::ControlError;

impl From<gvcp::Error> for ControlError {
    fn from(err: gvcp::Error) -> Self {
        match err {
            gvcp::Error::Io(err) => ControlError::Io(err.into()),
            gvcp::Error::InvalidPacket(msg) => ControlError::InvalidData(msg),
        }
    }
}
