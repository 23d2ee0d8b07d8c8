//
// Copyright (c) The Nacre Core Contributors
//
// SPDX-License-Identifier: MIT
//

use nacre_datastore::merge::MergeError;
use nacre_datastore::registry;
use nacre_datastore::validate::Diagnostic;
use nacre_datastore::xml::ParseError;
use nacre_northbound as northbound;
use nacre_northbound::netconf::{ErrorType, RpcError};

use crate::core::commit::RollbackFlags;

//
// Type aliases.
//
pub type Result<T> = std::result::Result<T, Error>;

//
// Core errors.
//
#[derive(Debug)]
pub enum Error {
    Datastore(registry::Error),
    Io(std::io::Error),
    Parse(ParseError),
    Merge(MergeError),
    Validation(Vec<Diagnostic>),
    Plugin(northbound::error::Error),
    CommitInProgress,
    RollbackFailed {
        flags: RollbackFlags,
        reason: String,
    },
    NoConfirmedCommit,
    ConfirmedCommitDenied(String),
    SessionNotFound(u32),
}

// ===== impl Error =====

impl Error {
    /// Translates a core failure into the NETCONF error document(s) the
    /// dispatcher puts on the wire.
    pub fn to_rpc_errors(&self) -> Vec<RpcError> {
        match self {
            Error::Datastore(error) => vec![match error {
                registry::Error::LockDenied { holder, .. } => {
                    RpcError::lock_denied(*holder, &error.to_string())
                }
                registry::Error::NotLocked(..) => {
                    RpcError::operation_failed(
                        ErrorType::Protocol,
                        &error.to_string(),
                    )
                }
                registry::Error::NotFound(..) => {
                    RpcError::data_missing(&error.to_string())
                }
                registry::Error::Exists(..) => {
                    RpcError::data_exists(&error.to_string())
                }
                _ => RpcError::operation_failed(
                    ErrorType::Application,
                    &error.to_string(),
                ),
            }],
            Error::Io(error) => vec![RpcError::operation_failed(
                ErrorType::Application,
                &error.to_string(),
            )],
            Error::Parse(error) => {
                vec![RpcError::malformed_message(&error.to_string())]
            }
            Error::Merge(error) => vec![match error {
                MergeError::DataExists(..) => {
                    RpcError::data_exists(&error.to_string())
                }
                MergeError::DataMissing(..) => {
                    RpcError::data_missing(&error.to_string())
                }
                MergeError::BadOperation(operation) => {
                    RpcError::bad_attribute(
                        ErrorType::Protocol,
                        "operation",
                        operation,
                    )
                }
            }],
            Error::Validation(diagnostics) => diagnostics
                .iter()
                .map(RpcError::from_diagnostic)
                .collect(),
            Error::Plugin(error) => vec![RpcError::operation_failed(
                ErrorType::Application,
                &error.to_string(),
            )],
            Error::CommitInProgress => vec![RpcError::in_use(
                ErrorType::Protocol,
                "another commit is in progress",
            )],
            Error::RollbackFailed { reason, .. } => {
                vec![RpcError::rollback_failed(
                    ErrorType::Application,
                    reason,
                )]
            }
            Error::NoConfirmedCommit => vec![RpcError::invalid_value(
                ErrorType::Protocol,
                "no confirmed commit is in progress",
            )],
            Error::ConfirmedCommitDenied(reason) => {
                vec![RpcError::invalid_value(ErrorType::Protocol, reason)]
            }
            Error::SessionNotFound(id) => vec![RpcError::invalid_value(
                ErrorType::Protocol,
                &format!("session {id} does not exist"),
            )],
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Datastore(error) => {
                write!(f, "datastore error: {error}")
            }
            Error::Io(error) => {
                write!(f, "I/O error: {error}")
            }
            Error::Parse(error) => {
                write!(f, "parse error: {error}")
            }
            Error::Merge(error) => {
                write!(f, "merge error: {error}")
            }
            Error::Validation(diagnostics) => {
                write!(f, "validation failed")?;
                if let Some(first) = diagnostics.first() {
                    write!(f, ": {first}")?;
                }
                Ok(())
            }
            Error::Plugin(error) => {
                write!(f, "plugin error: {error}")
            }
            Error::CommitInProgress => {
                write!(f, "another commit is in progress")
            }
            Error::RollbackFailed { flags, reason } => {
                write!(f, "rollback failed ({flags:?}): {reason}")
            }
            Error::NoConfirmedCommit => {
                write!(f, "no confirmed commit is in progress")
            }
            Error::ConfirmedCommitDenied(reason) => {
                write!(f, "confirmed commit request denied: {reason}")
            }
            Error::SessionNotFound(id) => {
                write!(f, "session {id} does not exist")
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<registry::Error> for Error {
    fn from(error: registry::Error) -> Error {
        Error::Datastore(error)
    }
}

impl From<MergeError> for Error {
    fn from(error: MergeError) -> Error {
        Error::Merge(error)
    }
}

impl From<northbound::error::Error> for Error {
    fn from(error: northbound::error::Error) -> Error {
        Error::Plugin(error)
    }
}
