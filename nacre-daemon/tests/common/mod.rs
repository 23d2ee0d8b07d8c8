//
// Copyright (c) The Nacre Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use nacre_daemon::config::CompatMode;
use nacre_daemon::core::Context;
use nacre_daemon::core::dispatch::PermitAll;
use nacre_daemon::core::session::SessionMsg;
use nacre_datastore::registry::{DatastoreRegistry, XmlFileStore};
use nacre_datastore::validate::AlwaysTrue;
use nacre_datastore::{ConfigTree, DatastoreName, xml};
use nacre_northbound::netconf::NETCONF_NS;
use nacre_northbound::{Plugin, QName, TransactionCtx, TransactionPhase};
use nacre_yang::{
    LeafType, ModuleUpgrade, NodeSpec, SchemaContext,
};
use tokio::sync::mpsc::UnboundedReceiver;

pub type Trace = Arc<Mutex<Vec<String>>>;

// Test plugin recording every callback; optionally failing configured
// phases.
pub struct Recorder {
    pub name: String,
    pub trace: Trace,
    pub fail_phase: Option<TransactionPhase>,
    pub fail_revert: bool,
    pub rpcs: Vec<QName>,
}

impl Recorder {
    pub fn new(name: &str, trace: Trace) -> Recorder {
        Recorder {
            name: name.to_owned(),
            trace,
            fail_phase: None,
            fail_revert: false,
            rpcs: Vec::new(),
        }
    }

    fn record(&self, phase: &str) {
        self.trace
            .lock()
            .unwrap()
            .push(format!("{}:{}", self.name, phase));
    }

    fn outcome(&self, phase: TransactionPhase) -> Result<(), String> {
        if self.fail_phase == Some(phase) {
            Err(format!("{} failed", self.name))
        } else {
            Ok(())
        }
    }
}

impl Plugin for Recorder {
    fn name(&self) -> &str {
        &self.name
    }

    fn begin(&mut self, _tx: &TransactionCtx<'_>) -> Result<(), String> {
        self.record("begin");
        self.outcome(TransactionPhase::Begin)
    }

    fn validate(&mut self, _tx: &TransactionCtx<'_>) -> Result<(), String> {
        self.record("validate");
        self.outcome(TransactionPhase::Validate)
    }

    fn complete(&mut self, _tx: &TransactionCtx<'_>) -> Result<(), String> {
        self.record("complete");
        self.outcome(TransactionPhase::Complete)
    }

    fn commit(&mut self, _tx: &TransactionCtx<'_>) -> Result<(), String> {
        self.record("commit");
        self.outcome(TransactionPhase::Commit)
    }

    fn commit_done(
        &mut self,
        _tx: &TransactionCtx<'_>,
    ) -> Result<(), String> {
        self.record("commit_done");
        self.outcome(TransactionPhase::CommitDone)
    }

    fn revert(&mut self, _tx: &TransactionCtx<'_>) -> Result<(), String> {
        self.record("revert");
        if self.fail_revert {
            Err(format!("{} revert failed", self.name))
        } else {
            Ok(())
        }
    }

    fn end(&mut self, _tx: &TransactionCtx<'_>) {
        self.record("end");
    }

    fn abort(&mut self, _tx: &TransactionCtx<'_>) {
        self.record("abort");
    }

    fn rpcs(&self) -> Vec<QName> {
        self.rpcs.clone()
    }

    fn upgrade(
        &mut self,
        upgrade: &ModuleUpgrade,
        _tree: &mut ConfigTree,
    ) -> Result<bool, String> {
        self.trace.lock().unwrap().push(format!(
            "{}:upgrade:{}:{}→{}",
            self.name,
            upgrade.name,
            upgrade.from.as_deref().unwrap_or("-"),
            upgrade.to.as_deref().unwrap_or("-"),
        ));
        Ok(false)
    }
}

// Test schema: container `cfg` with a uint8 leaf, a keyed server list
// with a mandatory port, and a DNS leaf-list.
pub fn schema() -> SchemaContext {
    let mut ctx = SchemaContext::new();
    let module = ctx
        .add_module("cfg", "urn:example:cfg", Some("2024-01-10"))
        .unwrap();
    let root = ctx.insert(module, None, NodeSpec::container("cfg")).unwrap();
    ctx.insert(module, Some(root), NodeSpec::leaf("x", LeafType::uint8()))
        .unwrap();
    let server = ctx
        .insert(module, Some(root), NodeSpec::list("server", &["name"]))
        .unwrap();
    ctx.insert(
        module,
        Some(server),
        NodeSpec::leaf("name", LeafType::string()),
    )
    .unwrap();
    ctx.insert(
        module,
        Some(server),
        NodeSpec::leaf("port", LeafType::uint16()).mandatory(),
    )
    .unwrap();
    ctx.insert(
        module,
        Some(root),
        NodeSpec::leaf_list("dns", LeafType::string()),
    )
    .unwrap();
    ctx
}

pub fn context(dir: &Path) -> Context {
    let registry = DatastoreRegistry::new(Box::new(XmlFileStore::new(
        dir.to_path_buf(),
        true,
    )));
    let mut ctx = Context::new(
        Arc::new(schema()),
        registry,
        Box::new(AlwaysTrue),
        Box::new(PermitAll),
        CompatMode::Candidate,
        dir.join("modules-state.json"),
    );
    ctx.datastores
        .create_if_missing(&DatastoreName::Running)
        .unwrap();
    ctx.datastores
        .create_if_missing(&DatastoreName::Candidate)
        .unwrap();
    ctx
}

pub fn parse(data: &str) -> ConfigTree {
    xml::parse(data.as_bytes()).unwrap()
}

pub fn put(ctx: &mut Context, name: DatastoreName, data: &str) {
    ctx.datastores.put(&name, parse(data)).unwrap();
}

/// Value of /cfg/x in the given datastore.
pub fn leaf_x(ctx: &mut Context, name: DatastoreName) -> Option<String> {
    let tree = ctx.datastores.get(&name).unwrap();
    tree.find_one("/cfg/x")
        .and_then(|id| tree.node(id).body().map(str::to_owned))
}

/// Builds an `<rpc>` request document around the given operation.
pub fn rpc_doc(inner: &str) -> ConfigTree {
    parse(&format!(
        "<rpc message-id=\"101\" xmlns=\"{NETCONF_NS}\">{inner}</rpc>"
    ))
}

pub fn reply_is_ok(reply: &ConfigTree) -> bool {
    reply
        .roots()
        .next()
        .is_some_and(|root| root.child("ok").is_some())
}

/// First rpc-error field of a reply, e.g. `error-tag`.
pub fn error_field(reply: &ConfigTree, field: &str) -> Option<String> {
    let root = reply.roots().next()?;
    let error = root.child("rpc-error")?;
    error.child_body(field).map(str::to_owned)
}

/// Body of a field inside error-info.
pub fn error_info_field(
    reply: &ConfigTree,
    field: &str,
) -> Option<String> {
    let root = reply.roots().next()?;
    let error = root.child("rpc-error")?;
    let info = error.child("error-info")?;
    info.child_body(field).map(str::to_owned)
}

/// Registers a subscribed session and returns its id plus the channel the
/// core writes notifications to.
pub fn subscriber(
    ctx: &mut Context,
) -> (u32, UnboundedReceiver<SessionMsg>) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let id = ctx.sessions.register(None, tx);
    ctx.sessions.get_mut(id).unwrap().subscribed = true;
    (id, rx)
}

/// Registers a plain (unsubscribed) session.
pub fn session(ctx: &mut Context) -> (u32, UnboundedReceiver<SessionMsg>) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let id = ctx.sessions.register(None, tx);
    (id, rx)
}

/// Drains the pending notifications of a session channel into a list of
/// (notification-name, confirm-event) tuples.
pub fn drain_notifications(
    rx: &mut UnboundedReceiver<SessionMsg>,
) -> Vec<ConfigTree> {
    let mut notifications = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        if let SessionMsg::Notification(notification) = msg {
            notifications.push(notification);
        }
    }
    notifications
}

pub fn notification_body(
    notification: &ConfigTree,
    path: &str,
) -> Option<String> {
    notification
        .find_one(path)
        .and_then(|id| notification.node(id).body().map(str::to_owned))
}
