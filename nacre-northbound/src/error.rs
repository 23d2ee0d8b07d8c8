//
// Copyright (c) The Nacre Core Contributors
//
// SPDX-License-Identifier: MIT
//

use tracing::warn;

use crate::{QName, TransactionPhase};

// Northbound errors.
#[derive(Debug)]
pub enum Error {
    DuplicateRpc(QName),
    InitCallback(String, String),
    TransactionCallback {
        phase: TransactionPhase,
        plugin: String,
        reason: String,
    },
    UpgradeCallback {
        plugin: String,
        module: String,
        reason: String,
    },
}

// ===== impl Error =====

impl Error {
    pub fn log(&self) {
        match self {
            Error::DuplicateRpc(qname) => {
                warn!(name = %qname.name, namespace = %qname.namespace, "{}", self);
            }
            Error::InitCallback(plugin, reason) => {
                warn!(%plugin, %reason, "{}", self);
            }
            Error::TransactionCallback {
                phase,
                plugin,
                reason,
            } => {
                warn!(?phase, %plugin, %reason, "{}", self);
            }
            Error::UpgradeCallback {
                plugin,
                module,
                reason,
            } => {
                warn!(%plugin, %module, %reason, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::DuplicateRpc(..) => {
                write!(f, "RPC registered by more than one plugin")
            }
            Error::InitCallback(..) => {
                write!(f, "plugin initialization failed")
            }
            Error::TransactionCallback { .. } => {
                write!(f, "transaction callback failed")
            }
            Error::UpgradeCallback { .. } => {
                write!(f, "upgrade callback failed")
            }
        }
    }
}

impl std::error::Error for Error {}
