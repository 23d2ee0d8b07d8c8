//
// Copyright (c) The Nacre Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! NETCONF event notifications (RFC 5277 framing, RFC 6470 content).

use chrono::Utc;
use nacre_datastore::{ConfigTree, NodeId};

use crate::netconf::NOTIFICATION_NS;

/// Confirm events of the `netconf-confirmed-commit` notification.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConfirmEvent {
    Start,
    Confirm,
    Extend,
    Cancel,
    Timeout,
}

// ===== impl ConfirmEvent =====

impl ConfirmEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfirmEvent::Start => "start",
            ConfirmEvent::Confirm => "confirm",
            ConfirmEvent::Extend => "extend",
            ConfirmEvent::Cancel => "cancel",
            ConfirmEvent::Timeout => "timeout",
        }
    }
}

// ===== global functions =====

/// Builds a `netconf-config-change` notification for a committed
/// transaction.
pub fn config_change(session_id: u32, datastore: &str) -> ConfigTree {
    let mut notification = ConfigTree::new();
    let root = envelope(&mut notification);
    let change = notification.add(Some(root), "netconf-config-change");
    let changed_by = notification.add(Some(change), "changed-by");
    notification.add_leaf(
        Some(changed_by),
        "session-id",
        &session_id.to_string(),
    );
    notification.add_leaf(Some(change), "datastore", datastore);
    notification
}

/// Builds a `netconf-confirmed-commit` notification.
pub fn confirmed_commit(
    session_id: u32,
    event: ConfirmEvent,
) -> ConfigTree {
    let mut notification = ConfigTree::new();
    let root = envelope(&mut notification);
    let commit = notification.add(Some(root), "netconf-confirmed-commit");
    notification.add_leaf(
        Some(commit),
        "session-id",
        &session_id.to_string(),
    );
    notification.add_leaf(Some(commit), "confirm-event", event.as_str());
    notification
}

// ===== helper functions =====

fn envelope(notification: &mut ConfigTree) -> NodeId {
    let root = notification.add(None, "notification");
    notification.set_namespace(root, NOTIFICATION_NS);
    notification.add_leaf(
        Some(root),
        "eventTime",
        &Utc::now().to_rfc3339(),
    );
    root
}
