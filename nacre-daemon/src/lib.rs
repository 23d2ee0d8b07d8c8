//
// Copyright (c) The Nacre Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! NETCONF configuration backend daemon.
//!
//! The `nacred` binary wires these pieces together: the [`core`] event
//! loop owning the datastores and the commit engine, the [`listener`]
//! accepting client sessions, and the [`config`] surface shared by the
//! configuration file and the command line.

pub mod config;
pub mod core;
pub mod listener;
