//
// Copyright (c) The Nacre Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! RFC 6241 reply and error documents.
//!
//! Constructors for every Appendix A error tag plus the `rpc-reply`
//! builders used by the dispatcher. Error messages are emitted as XML
//! chardata (escaping is handled by the serializer).

use nacre_datastore::validate::Diagnostic;
use nacre_datastore::{ConfigTree, NodeId};

/// NETCONF base namespace.
pub const NETCONF_NS: &str = "urn:ietf:params:xml:ns:netconf:base:1.0";

/// NETCONF notification namespace.
pub const NOTIFICATION_NS: &str =
    "urn:ietf:params:xml:ns:netconf:notification:1.0";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorType {
    Transport,
    Rpc,
    Application,
    Protocol,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorTag {
    InUse,
    InvalidValue,
    TooBig,
    MissingAttribute,
    BadAttribute,
    UnknownAttribute,
    MissingElement,
    BadElement,
    UnknownElement,
    UnknownNamespace,
    AccessDenied,
    LockDenied,
    ResourceDenied,
    RollbackFailed,
    DataExists,
    DataMissing,
    OperationNotSupported,
    OperationFailed,
    MalformedMessage,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorSeverity {
    Error,
    Warning,
}

/// A single `rpc-error` document.
#[derive(Clone, Debug)]
pub struct RpcError {
    pub error_type: ErrorType,
    pub tag: ErrorTag,
    pub severity: ErrorSeverity,
    pub app_tag: Option<String>,
    pub path: Option<String>,
    pub message: Option<String>,
    pub info: Vec<(String, String)>,
}

// ===== impl ErrorType =====

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::Transport => "transport",
            ErrorType::Rpc => "rpc",
            ErrorType::Application => "application",
            ErrorType::Protocol => "protocol",
        }
    }
}

// ===== impl ErrorTag =====

impl ErrorTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorTag::InUse => "in-use",
            ErrorTag::InvalidValue => "invalid-value",
            ErrorTag::TooBig => "too-big",
            ErrorTag::MissingAttribute => "missing-attribute",
            ErrorTag::BadAttribute => "bad-attribute",
            ErrorTag::UnknownAttribute => "unknown-attribute",
            ErrorTag::MissingElement => "missing-element",
            ErrorTag::BadElement => "bad-element",
            ErrorTag::UnknownElement => "unknown-element",
            ErrorTag::UnknownNamespace => "unknown-namespace",
            ErrorTag::AccessDenied => "access-denied",
            ErrorTag::LockDenied => "lock-denied",
            ErrorTag::ResourceDenied => "resource-denied",
            ErrorTag::RollbackFailed => "rollback-failed",
            ErrorTag::DataExists => "data-exists",
            ErrorTag::DataMissing => "data-missing",
            ErrorTag::OperationNotSupported => "operation-not-supported",
            ErrorTag::OperationFailed => "operation-failed",
            ErrorTag::MalformedMessage => "malformed-message",
        }
    }
}

impl std::str::FromStr for ErrorTag {
    type Err = ();

    fn from_str(s: &str) -> Result<ErrorTag, ()> {
        match s {
            "in-use" => Ok(ErrorTag::InUse),
            "invalid-value" => Ok(ErrorTag::InvalidValue),
            "too-big" => Ok(ErrorTag::TooBig),
            "missing-attribute" => Ok(ErrorTag::MissingAttribute),
            "bad-attribute" => Ok(ErrorTag::BadAttribute),
            "unknown-attribute" => Ok(ErrorTag::UnknownAttribute),
            "missing-element" => Ok(ErrorTag::MissingElement),
            "bad-element" => Ok(ErrorTag::BadElement),
            "unknown-element" => Ok(ErrorTag::UnknownElement),
            "unknown-namespace" => Ok(ErrorTag::UnknownNamespace),
            "access-denied" => Ok(ErrorTag::AccessDenied),
            "lock-denied" => Ok(ErrorTag::LockDenied),
            "resource-denied" => Ok(ErrorTag::ResourceDenied),
            "rollback-failed" => Ok(ErrorTag::RollbackFailed),
            "data-exists" => Ok(ErrorTag::DataExists),
            "data-missing" => Ok(ErrorTag::DataMissing),
            "operation-not-supported" => Ok(ErrorTag::OperationNotSupported),
            "operation-failed" => Ok(ErrorTag::OperationFailed),
            "malformed-message" => Ok(ErrorTag::MalformedMessage),
            _ => Err(()),
        }
    }
}

// ===== impl ErrorSeverity =====

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Error => "error",
            ErrorSeverity::Warning => "warning",
        }
    }
}

// ===== impl RpcError =====

impl RpcError {
    pub fn new(error_type: ErrorType, tag: ErrorTag) -> RpcError {
        RpcError {
            error_type,
            tag,
            severity: ErrorSeverity::Error,
            app_tag: None,
            path: None,
            message: None,
            info: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: &str) -> RpcError {
        self.message = Some(message.to_owned());
        self
    }

    #[must_use]
    pub fn with_app_tag(mut self, app_tag: &str) -> RpcError {
        self.app_tag = Some(app_tag.to_owned());
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: &str) -> RpcError {
        self.path = Some(path.to_owned());
        self
    }

    #[must_use]
    pub fn with_info(mut self, name: &str, value: &str) -> RpcError {
        self.info.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn in_use(error_type: ErrorType, message: &str) -> RpcError {
        RpcError::new(error_type, ErrorTag::InUse).with_message(message)
    }

    pub fn invalid_value(error_type: ErrorType, message: &str) -> RpcError {
        RpcError::new(error_type, ErrorTag::InvalidValue)
            .with_message(message)
    }

    pub fn too_big(error_type: ErrorType, message: &str) -> RpcError {
        RpcError::new(error_type, ErrorTag::TooBig).with_message(message)
    }

    pub fn missing_attribute(
        error_type: ErrorType,
        attribute: &str,
        element: &str,
    ) -> RpcError {
        RpcError::new(error_type, ErrorTag::MissingAttribute)
            .with_info("bad-attribute", attribute)
            .with_info("bad-element", element)
    }

    pub fn bad_attribute(
        error_type: ErrorType,
        attribute: &str,
        element: &str,
    ) -> RpcError {
        RpcError::new(error_type, ErrorTag::BadAttribute)
            .with_info("bad-attribute", attribute)
            .with_info("bad-element", element)
    }

    pub fn missing_element(error_type: ErrorType, element: &str) -> RpcError {
        RpcError::new(error_type, ErrorTag::MissingElement)
            .with_info("bad-element", element)
    }

    pub fn bad_element(error_type: ErrorType, element: &str) -> RpcError {
        RpcError::new(error_type, ErrorTag::BadElement)
            .with_info("bad-element", element)
    }

    pub fn unknown_element(error_type: ErrorType, element: &str) -> RpcError {
        RpcError::new(error_type, ErrorTag::UnknownElement)
            .with_info("bad-element", element)
    }

    pub fn unknown_namespace(
        error_type: ErrorType,
        element: &str,
        namespace: &str,
    ) -> RpcError {
        RpcError::new(error_type, ErrorTag::UnknownNamespace)
            .with_info("bad-element", element)
            .with_info("bad-namespace", namespace)
    }

    pub fn access_denied(error_type: ErrorType, message: &str) -> RpcError {
        RpcError::new(error_type, ErrorTag::AccessDenied)
            .with_message(message)
    }

    /// `lock-denied` carries the holder's session id in the error-info
    /// (RFC 6241 §7.5). A holder of zero means a non-session entity.
    pub fn lock_denied(holder: u32, message: &str) -> RpcError {
        RpcError::new(ErrorType::Protocol, ErrorTag::LockDenied)
            .with_message(message)
            .with_info("session-id", &holder.to_string())
    }

    pub fn resource_denied(error_type: ErrorType, message: &str) -> RpcError {
        RpcError::new(error_type, ErrorTag::ResourceDenied)
            .with_message(message)
    }

    pub fn rollback_failed(error_type: ErrorType, message: &str) -> RpcError {
        RpcError::new(error_type, ErrorTag::RollbackFailed)
            .with_message(message)
    }

    pub fn data_exists(message: &str) -> RpcError {
        RpcError::new(ErrorType::Application, ErrorTag::DataExists)
            .with_message(message)
    }

    pub fn data_missing(message: &str) -> RpcError {
        RpcError::new(ErrorType::Application, ErrorTag::DataMissing)
            .with_message(message)
    }

    pub fn operation_not_supported(
        error_type: ErrorType,
        message: &str,
    ) -> RpcError {
        RpcError::new(error_type, ErrorTag::OperationNotSupported)
            .with_message(message)
    }

    pub fn operation_failed(error_type: ErrorType, message: &str) -> RpcError {
        RpcError::new(error_type, ErrorTag::OperationFailed)
            .with_message(message)
    }

    pub fn malformed_message(message: &str) -> RpcError {
        RpcError::new(ErrorType::Rpc, ErrorTag::MalformedMessage)
            .with_message(message)
    }

    /// Maps a validation diagnostic onto an application-layer error.
    pub fn from_diagnostic(diagnostic: &Diagnostic) -> RpcError {
        let tag = diagnostic
            .tag
            .parse::<ErrorTag>()
            .unwrap_or(ErrorTag::OperationFailed);
        let mut error = RpcError::new(ErrorType::Application, tag)
            .with_message(&diagnostic.message)
            .with_path(&diagnostic.path);
        if let Some(app_tag) = &diagnostic.app_tag {
            error = error.with_app_tag(app_tag);
        }
        for (name, value) in &diagnostic.info {
            error = error.with_info(name, value);
        }
        error
    }

    /// Appends this error as an `rpc-error` element under `parent`.
    pub fn to_xml(&self, tree: &mut ConfigTree, parent: NodeId) {
        let error = tree.add(Some(parent), "rpc-error");
        tree.add_leaf(Some(error), "error-type", self.error_type.as_str());
        tree.add_leaf(Some(error), "error-tag", self.tag.as_str());
        tree.add_leaf(
            Some(error),
            "error-severity",
            self.severity.as_str(),
        );
        if let Some(app_tag) = &self.app_tag {
            tree.add_leaf(Some(error), "error-app-tag", app_tag);
        }
        if let Some(path) = &self.path {
            tree.add_leaf(Some(error), "error-path", path);
        }
        if let Some(message) = &self.message {
            tree.add_leaf(Some(error), "error-message", message);
        }
        if !self.info.is_empty() {
            let info = tree.add(Some(error), "error-info");
            for (name, value) in &self.info {
                tree.add_leaf(Some(info), name, value);
            }
        }
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag.as_str())?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

impl std::error::Error for RpcError {}

// ===== global functions =====

/// Builds an `<rpc-reply><ok/></rpc-reply>` document.
pub fn rpc_reply_ok(message_id: Option<&str>) -> ConfigTree {
    let mut reply = ConfigTree::new();
    let root = reply_root(&mut reply, message_id);
    reply.add(Some(root), "ok");
    reply
}

/// Builds an `<rpc-reply><data>…</data></rpc-reply>` document carrying the
/// given configuration content.
pub fn rpc_reply_data(
    message_id: Option<&str>,
    data: &ConfigTree,
) -> ConfigTree {
    let mut reply = ConfigTree::new();
    let root = reply_root(&mut reply, message_id);
    let data_node = reply.add(Some(root), "data");
    for data_root in data.root_ids() {
        reply.import(Some(data_node), data, *data_root);
    }
    reply
}

/// Builds an `rpc-reply` carrying one or more `rpc-error` documents.
pub fn rpc_reply_error(
    message_id: Option<&str>,
    errors: &[RpcError],
) -> ConfigTree {
    let mut reply = ConfigTree::new();
    let root = reply_root(&mut reply, message_id);
    for error in errors {
        error.to_xml(&mut reply, root);
    }
    reply
}

// ===== helper functions =====

fn reply_root(reply: &mut ConfigTree, message_id: Option<&str>) -> NodeId {
    let root = reply.add(None, "rpc-reply");
    reply.set_namespace(root, NETCONF_NS);
    if let Some(message_id) = message_id {
        reply.set_attr(root, "message-id", message_id);
    }
    root
}
