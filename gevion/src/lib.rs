/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

#![warn(missing_docs)]
#![allow(
    clippy::module_name_repetitions,
    clippy::similar_names,
    clippy::missing_errors_doc
)]

//! `gevion` is a control-channel client for `GigE Vision` industrial
//! cameras.
//!
//! The crate talks GVCP to a camera on the local network: it reads and
//! writes device registers and memory, keeps the exclusive-control
//! privilege alive with a background heartbeat, retrieves the device's
//! `GenICam` XML description, and registers stream channel receivers.
//!
//! Device discovery and the `GenICam` feature tree are out of scope; the
//! caller provides the interface and device addresses and receives the XML
//! as an opaque buffer.
//!
//! # Examples
//!
//! ```no_run
//! use gevion::{gige::ControlHandle, DeviceControl};
//!
//! let mut device = ControlHandle::new(
//!     "192.168.0.2".parse().unwrap(),
//!     "192.168.0.10".parse().unwrap(),
//! ).unwrap();
//!
//! device.open().unwrap();
//!
//! // Pull 64 bytes out of the device's register space.
//! let mut buffer = vec![0; 64];
//! device.read(0x1f000, &mut buffer).unwrap();
//!
//! device.close().unwrap();
//! ```

pub mod gige;

use auto_impl::auto_impl;

/// The error type for device control.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// IO error.
    #[error("input/output error: {0}")]
    Io(anyhow::Error),

    /// The session is not opened.
    #[error("device is not opened")]
    NotOpened,

    /// The session does not hold the control privilege of the device.
    #[error("control privilege of the device is not held")]
    NotController,

    /// Try to send or receive invalid data.
    #[error("invalid data: {0}")]
    InvalidData(std::borrow::Cow<'static, str>),

    /// The operation is not supported.
    #[error("operation is not supported: {0}")]
    NotSupported(std::borrow::Cow<'static, str>),

    /// The device didn't acknowledge a command in time.
    #[error("operation timed out")]
    Timeout,
}

/// A specialized `Result` type for device control.
pub type ControlResult<T> = std::result::Result<T, ControlError>;

/// What a control-channel transport offers its users: session lifecycle,
/// register and memory access, and the `GenICam` description buffer.
///
/// Addresses index the device's flat register space. Memory transfers of
/// any size are accepted; the transport splits them into protocol-sized
/// transactions internally.
#[auto_impl(&mut, Box)]
pub trait DeviceControl {
    /// Establishes the session: fetches the `GenICam` XML, claims the
    /// control privilege and spawns the heartbeat.
    fn open(&mut self) -> ControlResult<()>;

    /// Ends the session, handing the control privilege back to the device.
    fn close(&mut self) -> ControlResult<()>;

    /// Whether [`open`](DeviceControl::open) has completed on this handle.
    fn is_opened(&self) -> bool;

    /// Fills the whole of `buf` from device memory starting at `address`.
    fn read(&mut self, address: u64, buf: &mut [u8]) -> ControlResult<()>;

    /// Fetches the 32-bit register at `address`.
    fn read_reg(&mut self, address: u64) -> ControlResult<u32>;

    /// Copies `data` into device memory starting at `address`.
    fn write(&mut self, address: u64, data: &[u8]) -> ControlResult<()>;

    /// Stores `value` into the 32-bit register at `address`.
    fn write_reg(&mut self, address: u64, value: u32) -> ControlResult<()>;

    /// The `GenICam` description retrieved while opening, as raw bytes.
    fn genapi(&mut self) -> ControlResult<Vec<u8>>;

    /// Overrides the `GenICam` description handed out by
    /// [`genapi`](DeviceControl::genapi).
    fn set_genapi(&mut self, xml: Vec<u8>);
}
