/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

#![allow(
    clippy::module_name_repetitions,
    clippy::similar_names,
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation
)]

//! `gevion-device` provides the wire-level building blocks for `GigE Vision`
//! compatible cameras: the GVCP command/acknowledge codec and the bootstrap
//! register map the control session is built on.

pub mod gvcp;
