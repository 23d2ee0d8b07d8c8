//
// Copyright (c) The Nacre Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Daemon core.
//!
//! All datastore and commit-engine operations are serialized through one
//! executor task: the [`Core`] event loop. Transport tasks, the
//! confirmed-commit timer and the signal handler only ever talk to the
//! core through channels, so there is no concurrent access to the shared
//! state held by the [`Context`].

pub mod commit;
pub mod confirmed;
pub mod dispatch;
pub mod error;
pub mod session;
pub mod startup;
pub mod validate;

use std::path::PathBuf;
use std::sync::Arc;

use nacre_datastore::registry::DatastoreRegistry;
use nacre_datastore::validate::XPathEvaluator;
use nacre_datastore::{ConfigTree, DatastoreName};
use nacre_northbound::PluginBus;
use nacre_northbound::notification::ConfirmEvent;
use nacre_yang::SchemaContext;
use tokio::sync::mpsc::Receiver;
use tracing::{debug, info, instrument};

use crate::config::CompatMode;
use crate::core::commit::RollbackFlags;
use crate::core::confirmed::{ConfirmedCommit, ConfirmedCommitState};
use crate::core::dispatch::AccessOracle;
use crate::core::session::{
    CoreRequest, SessionMsg, SessionRegistry,
};
use crate::core::startup::StartupReport;

/// Explicit process context threaded through every core operation. The
/// confirmed-commit controller is the only true singleton and it is owned
/// here.
pub struct Context {
    pub schema: Arc<SchemaContext>,
    pub datastores: DatastoreRegistry,
    pub plugins: PluginBus,
    pub sessions: SessionRegistry,
    pub confirmed: ConfirmedCommit,
    pub xpath: Box<dyn XPathEvaluator>,
    pub nacm: Box<dyn AccessOracle>,
    pub compat: CompatMode,
    pub module_state_path: PathBuf,
    pub next_transaction_id: u64,
    pub commit_in_progress: bool,
    pub last_rollback_flags: RollbackFlags,
    pub startup: Option<StartupReport>,
}

/// The core event loop task.
pub struct Core {
    pub context: Context,
    rx_requests: Receiver<CoreRequest>,
}

// ===== impl Context =====

impl Context {
    pub fn new(
        schema: Arc<SchemaContext>,
        datastores: DatastoreRegistry,
        xpath: Box<dyn XPathEvaluator>,
        nacm: Box<dyn AccessOracle>,
        compat: CompatMode,
        module_state_path: PathBuf,
    ) -> Context {
        Context {
            schema,
            datastores,
            plugins: PluginBus::new(),
            sessions: SessionRegistry::default(),
            confirmed: ConfirmedCommit::default(),
            xpath,
            nacm,
            compat,
            module_state_path,
            next_transaction_id: 0,
            commit_in_progress: false,
            last_rollback_flags: RollbackFlags::empty(),
            startup: None,
        }
    }
}

// ===== impl Core =====

impl Core {
    pub fn new(context: Context, rx_requests: Receiver<CoreRequest>) -> Core {
        Core {
            context,
            rx_requests,
        }
    }

    // Main event loop.
    #[instrument(skip_all, name = "core")]
    pub async fn run(mut self, mut shutdown_rx: Receiver<()>) {
        loop {
            tokio::select! {
                Some(request) = self.rx_requests.recv() => {
                    self.process_request(request);
                }
                Some(_) = self.context.confirmed.rx.recv() => {
                    confirmed::process_timeout(&mut self.context);
                }
                _ = shutdown_rx.recv() => {
                    break;
                }
                else => break,
            }
        }
        self.shutdown();
    }

    // Processes a message received from a transport task.
    pub fn process_request(&mut self, request: CoreRequest) {
        match request {
            CoreRequest::Attach(request) => {
                let id = self
                    .context
                    .sessions
                    .register(request.username, request.tx);
                info!(session_id = %id, "session attached");
                if let Some(responder) = request.responder {
                    let _ = responder.send(id);
                }
            }
            CoreRequest::Rpc(request) => {
                let outcome = dispatch::process_rpc(
                    &mut self.context,
                    request.session_id,
                    &request.document,
                );
                if let Some(responder) = request.responder {
                    let _ = responder.send(outcome.reply);
                }
                if outcome.close_requester {
                    close_session(&mut self.context, request.session_id);
                }
            }
            CoreRequest::Detach(request) => {
                close_session(&mut self.context, request.session_id);
            }
        }
    }

    fn shutdown(&mut self) {
        info!("shutting down");
        self.context.plugins.exit_all();
    }
}

// ===== global functions =====

/// Tears down a session: releases its datastore locks, rolls back an
/// attached ephemeral confirmed commit, and destroys the session record.
/// The rollback runs synchronously before the record is removed.
pub fn close_session(ctx: &mut Context, session_id: u32) {
    debug!(%session_id, "closing session");

    if ctx.confirmed.state() == ConfirmedCommitState::Ephemeral
        && ctx.confirmed.session_id() == Some(session_id)
    {
        info!(%session_id,
            "session held an unconfirmed commit, rolling back");
        confirmed::rollback(ctx, ConfirmEvent::Cancel);
    }

    ctx.datastores.release_session_locks(session_id);
    let _ = ctx
        .datastores
        .delete(&DatastoreName::Session(session_id));

    if let Some(session) = ctx.sessions.remove(session_id) {
        let _ = session.tx.send(SessionMsg::Close);
    }
}

/// Fans a notification document out to every subscribed session.
pub(crate) fn notify_subscribers(ctx: &Context, notification: ConfigTree) {
    for session in ctx.sessions.subscribers() {
        let _ = session
            .tx
            .send(SessionMsg::Notification(notification.clone()));
    }
}
