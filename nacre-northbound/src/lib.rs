//
// Copyright (c) The Nacre Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Plugin bus.
//!
//! Backend plugins register a capability record of transaction callbacks
//! (all defaulting to no-ops), RPC handlers and upgrade callbacks. The bus
//! invokes transaction callbacks in registration order for forward phases
//! and in reverse order for cleanup phases, so that every plugin that
//! observed a phase also observes its reverse during rollback.

pub mod error;
pub mod netconf;
pub mod notification;

use std::collections::{HashMap, HashSet};

use derive_new::new;
use nacre_datastore::tree::NodeRef;
use nacre_datastore::{ChangeSet, ConfigTree};
use nacre_yang::ModuleUpgrade;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Error;
use crate::netconf::RpcError;

/// Qualified name of an RPC: (namespace, local name).
#[derive(Clone, Debug, Eq, Hash, new, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct QName {
    pub namespace: String,
    pub name: String,
}

/// Transaction phases: synchronization points between the commit engine
/// and the registered plugins.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum TransactionPhase {
    Begin,
    Validate,
    Complete,
    Commit,
    CommitDone,
    Revert,
    End,
    Abort,
}

/// Borrowed view of an in-flight transaction, handed to plugin callbacks.
/// `source` is the prospective new configuration, `target` the current
/// content of the datastore being replaced. Plugins must not retain these
/// references past the callback return.
#[derive(Clone, Copy, Debug)]
pub struct TransactionCtx<'a> {
    pub id: u64,
    pub session_id: u32,
    pub source: &'a ConfigTree,
    pub target: &'a ConfigTree,
    pub changes: &'a ChangeSet,
}

/// Backend plugin contract. Every callback defaults to a no-op.
#[allow(unused_variables)]
pub trait Plugin: Send {
    fn name(&self) -> &str;

    /// Plugins with a lower priority observe forward phases first.
    fn priority(&self) -> u32 {
        0
    }

    fn init(&mut self) -> Result<(), String> {
        Ok(())
    }

    /// Invoked once during graceful shutdown.
    fn exit(&mut self) {}

    fn begin(&mut self, tx: &TransactionCtx<'_>) -> Result<(), String> {
        Ok(())
    }

    fn validate(&mut self, tx: &TransactionCtx<'_>) -> Result<(), String> {
        Ok(())
    }

    fn complete(&mut self, tx: &TransactionCtx<'_>) -> Result<(), String> {
        Ok(())
    }

    /// The apply step: makes changes observable outside the process. Each
    /// plugin is responsible for undoing its own effects in `revert`.
    fn commit(&mut self, tx: &TransactionCtx<'_>) -> Result<(), String> {
        Ok(())
    }

    fn commit_done(&mut self, tx: &TransactionCtx<'_>) -> Result<(), String> {
        Ok(())
    }

    fn revert(&mut self, tx: &TransactionCtx<'_>) -> Result<(), String> {
        Ok(())
    }

    fn end(&mut self, tx: &TransactionCtx<'_>) {}

    fn abort(&mut self, tx: &TransactionCtx<'_>) {}

    /// Qualified names of the RPCs this plugin handles.
    fn rpcs(&self) -> Vec<QName> {
        Vec::new()
    }

    /// Handles a delegated RPC. The returned tree becomes the content of
    /// the `rpc-reply`.
    fn rpc(&mut self, input: NodeRef<'_>) -> Result<ConfigTree, RpcError> {
        Err(RpcError::operation_not_supported(
            netconf::ErrorType::Application,
            "RPC not implemented",
        ))
    }

    /// Invoked during startup when a module's persisted revision state does
    /// not match the backend's. Returns whether the tree was modified.
    fn upgrade(
        &mut self,
        upgrade: &ModuleUpgrade,
        tree: &mut ConfigTree,
    ) -> Result<bool, String> {
        Ok(false)
    }
}

/// Ordered plugin registry.
#[derive(Default)]
pub struct PluginBus {
    plugins: Vec<Box<dyn Plugin>>,
    rpc_handlers: HashMap<QName, usize>,
}

// ===== impl PluginBus =====

impl PluginBus {
    pub fn new() -> PluginBus {
        Default::default()
    }

    /// Registers a plugin. Plugins are ordered by (priority, registration
    /// order); duplicate RPC registrations are a startup error.
    pub fn register(&mut self, plugin: Box<dyn Plugin>) -> Result<(), Error> {
        let mut known: HashSet<QName> =
            self.rpc_handlers.keys().cloned().collect();
        for qname in plugin.rpcs() {
            if !known.insert(qname.clone()) {
                return Err(Error::DuplicateRpc(qname));
            }
        }

        debug!(name = %plugin.name(), priority = %plugin.priority(),
            "registering plugin");
        self.plugins.push(plugin);
        self.plugins.sort_by_key(|plugin| plugin.priority());

        self.rpc_handlers.clear();
        for (index, plugin) in self.plugins.iter().enumerate() {
            for qname in plugin.rpcs() {
                self.rpc_handlers.insert(qname, index);
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Runs every plugin's `init` callback in registration order.
    pub fn init_all(&mut self) -> Result<(), Error> {
        for plugin in &mut self.plugins {
            plugin.init().map_err(|reason| {
                Error::InitCallback(plugin.name().to_owned(), reason)
            })?;
        }
        Ok(())
    }

    /// Runs every plugin's `exit` callback in reverse order.
    pub fn exit_all(&mut self) {
        for plugin in self.plugins.iter_mut().rev() {
            plugin.exit();
        }
    }

    /// Invokes a forward phase on every plugin in registration order. On
    /// failure, returns how many plugins observed the phase (including the
    /// failing one) together with the failure.
    pub fn invoke_forward(
        &mut self,
        phase: TransactionPhase,
        tx: &TransactionCtx<'_>,
    ) -> Result<(), (usize, Error)> {
        for (index, plugin) in self.plugins.iter_mut().enumerate() {
            debug!(phase = ?phase, plugin = %plugin.name(), "transaction callback");
            if let Err(reason) = call(plugin.as_mut(), phase, tx) {
                return Err((
                    index + 1,
                    Error::TransactionCallback {
                        phase,
                        plugin: plugin.name().to_owned(),
                        reason,
                    },
                ));
            }
        }
        Ok(())
    }

    /// Invokes a cleanup phase in reverse order on the first `observed`
    /// plugins. Failures are collected, not propagated: cleanup always runs
    /// to completion.
    pub fn invoke_reverse(
        &mut self,
        phase: TransactionPhase,
        tx: &TransactionCtx<'_>,
        observed: usize,
    ) -> Vec<Error> {
        let mut failures = Vec::new();
        for plugin in self.plugins[..observed].iter_mut().rev() {
            debug!(phase = ?phase, plugin = %plugin.name(), "transaction callback");
            if let Err(reason) = call(plugin.as_mut(), phase, tx) {
                failures.push(Error::TransactionCallback {
                    phase,
                    plugin: plugin.name().to_owned(),
                    reason,
                });
            }
        }
        failures
    }

    /// Looks up the plugin handling a qualified RPC name.
    pub fn rpc_handler(
        &mut self,
        qname: &QName,
    ) -> Option<&mut Box<dyn Plugin>> {
        let index = *self.rpc_handlers.get(qname)?;
        Some(&mut self.plugins[index])
    }

    /// Runs upgrade callbacks for a changed module on every plugin, in
    /// registration order. Returns whether any plugin modified the tree.
    pub fn upgrade(
        &mut self,
        upgrade: &ModuleUpgrade,
        tree: &mut ConfigTree,
    ) -> Result<bool, Error> {
        let mut changed = false;
        for plugin in &mut self.plugins {
            changed |= plugin.upgrade(upgrade, tree).map_err(|reason| {
                Error::UpgradeCallback {
                    plugin: plugin.name().to_owned(),
                    module: upgrade.name.clone(),
                    reason,
                }
            })?;
        }
        Ok(changed)
    }
}

// ===== helper functions =====

// Invokes a single transaction callback.
fn call(
    plugin: &mut dyn Plugin,
    phase: TransactionPhase,
    tx: &TransactionCtx<'_>,
) -> Result<(), String> {
    match phase {
        TransactionPhase::Begin => plugin.begin(tx),
        TransactionPhase::Validate => plugin.validate(tx),
        TransactionPhase::Complete => plugin.complete(tx),
        TransactionPhase::Commit => plugin.commit(tx),
        TransactionPhase::CommitDone => plugin.commit_done(tx),
        TransactionPhase::Revert => plugin.revert(tx),
        TransactionPhase::End => {
            plugin.end(tx);
            Ok(())
        }
        TransactionPhase::Abort => {
            plugin.abort(tx);
            Ok(())
        }
    }
}
