/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! GVCP packet codec.
//!
//! All multi-byte fields are big-endian on the wire. A command packet is a
//! [`HEADER_LENGTH`]-byte common header followed by opcode specific data, an
//! acknowledge mirrors that layout with a status field in place of the
//! command magic.

pub mod ack;
pub mod cmd;

/// Length in bytes of the common command/acknowledge header.
pub const HEADER_LENGTH: usize = 8;

/// Maximum number of memory payload bytes a single `ReadMem`/`WriteMem`
/// transaction may carry. Transfers above this size must be split into
/// multiple transactions.
pub const DATA_SIZE_MAX: u16 = 536;
