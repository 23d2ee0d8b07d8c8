//
// Copyright (c) The Nacre Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! RPC dispatcher.
//!
//! Maps NETCONF RPCs onto core operations and renders RFC 6241 reply and
//! error documents. Unknown qualified names are delegated to plugin RPC
//! handlers. Every RPC first passes the authorization oracle; denials
//! yield `access-denied`.

use std::sync::Arc;
use std::time::Duration;

use nacre_datastore::merge::{self, Operation};
use nacre_datastore::tree::NodeRef;
use nacre_datastore::{ConfigTree, DatastoreName, NodeId, diff};
use nacre_northbound::netconf::{
    self, ErrorType, NETCONF_NS, NOTIFICATION_NS, RpcError,
};
use nacre_northbound::notification::{self, ConfirmEvent};
use nacre_northbound::{QName, TransactionCtx};
use tracing::{debug, warn};

use crate::config::CompatMode;
use crate::core::commit::{self, CommitOutcome};
use crate::core::confirmed::{self, ConfirmedCommitState};
use crate::core::error::Error;
use crate::core::{Context, close_session, notify_subscribers, validate};

// Default confirm-timeout, in seconds (RFC 6241 §8.4).
const DFLT_CONFIRM_TIMEOUT: u64 = 600;

/// Authorization oracle consulted before every RPC dispatch. The actual
/// NACM rule evaluation is an external collaborator.
pub trait AccessOracle: Send {
    fn check_rpc(
        &self,
        session_id: u32,
        username: Option<&str>,
        rpc: &QName,
    ) -> Result<(), String>;
}

/// Oracle that permits everything.
#[derive(Debug, Default)]
pub struct PermitAll;

/// Result of dispatching one RPC.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub reply: ConfigTree,
    /// The requesting session asked to be closed; teardown happens after
    /// the reply is written.
    pub close_requester: bool,
}

type HandlerResult = Result<ConfigTree, Vec<RpcError>>;

// ===== impl AccessOracle =====

impl AccessOracle for PermitAll {
    fn check_rpc(
        &self,
        _session_id: u32,
        _username: Option<&str>,
        _rpc: &QName,
    ) -> Result<(), String> {
        Ok(())
    }
}

// ===== global functions =====

/// Dispatches a parsed `<rpc>` document from a session and produces the
/// `rpc-reply` document.
pub fn process_rpc(
    ctx: &mut Context,
    session_id: u32,
    document: &ConfigTree,
) -> DispatchOutcome {
    let Some(rpc) = document.roots().find(|root| root.name() == "rpc")
    else {
        return DispatchOutcome {
            reply: netconf::rpc_reply_error(
                None,
                &[RpcError::malformed_message("expected an <rpc> element")],
            ),
            close_requester: false,
        };
    };
    let message_id = rpc.attr("message-id").map(str::to_owned);
    let message_id = message_id.as_deref();

    let Some(operation) = rpc.children().next() else {
        return DispatchOutcome {
            reply: netconf::rpc_reply_error(
                message_id,
                &[RpcError::missing_element(ErrorType::Rpc, "rpc")
                    .with_message("rpc carries no operation element")],
            ),
            close_requester: false,
        };
    };

    let qname = QName::new(
        operation.namespace().unwrap_or(NETCONF_NS).to_owned(),
        operation.name().to_owned(),
    );
    debug!(%session_id, rpc = %qname.name, "received rpc");

    // Authorization hook (NACM oracle).
    let username = ctx
        .sessions
        .get(session_id)
        .and_then(|session| session.username.clone());
    if let Err(reason) =
        ctx.nacm.check_rpc(session_id, username.as_deref(), &qname)
    {
        return DispatchOutcome {
            reply: netconf::rpc_reply_error(
                message_id,
                &[RpcError::access_denied(ErrorType::Application, &reason)],
            ),
            close_requester: false,
        };
    }

    let mut close_requester = false;
    let builtin_ns = matches!(
        operation.namespace(),
        None | Some(NETCONF_NS) | Some(NOTIFICATION_NS)
    );
    let result = if builtin_ns {
        match operation.name() {
            "get" => process_get(ctx, operation),
            "get-config" => process_get_config(ctx, operation),
            "edit-config" => process_edit_config(ctx, session_id, operation),
            "copy-config" => process_copy_config(ctx, session_id, operation),
            "delete-config" => {
                process_delete_config(ctx, session_id, operation)
            }
            "lock" => process_lock(ctx, session_id, operation),
            "unlock" => process_unlock(ctx, session_id, operation),
            "close-session" => {
                close_requester = true;
                Ok(netconf::rpc_reply_ok(message_id))
            }
            "kill-session" => process_kill_session(ctx, session_id, operation),
            "commit" => process_commit(ctx, session_id, operation),
            "cancel-commit" => {
                process_cancel_commit(ctx, session_id, operation)
            }
            "discard-changes" => process_discard_changes(ctx, session_id),
            "validate" => process_validate(ctx, session_id, operation),
            "create-subscription" => {
                process_create_subscription(ctx, session_id, operation)
            }
            _ => process_plugin_rpc(ctx, &qname, operation),
        }
    } else {
        process_plugin_rpc(ctx, &qname, operation)
    };

    let reply = match result {
        Ok(mut reply) => {
            set_message_id(&mut reply, message_id);
            reply
        }
        Err(errors) => {
            for error in &errors {
                warn!(%session_id, rpc = %qname.name, %error, "rpc failed");
            }
            netconf::rpc_reply_error(message_id, &errors)
        }
    };

    DispatchOutcome {
        reply,
        close_requester,
    }
}

// ===== helper functions =====

fn process_get(ctx: &mut Context, operation: NodeRef<'_>) -> HandlerResult {
    let running = ctx
        .datastores
        .get(&DatastoreName::Running)
        .map_err(|error| Error::Datastore(error).to_rpc_errors())?;
    let data = filtered(&running, operation);
    Ok(netconf::rpc_reply_data(None, &data))
}

fn process_get_config(
    ctx: &mut Context,
    operation: NodeRef<'_>,
) -> HandlerResult {
    let source = datastore_arg(operation, "source")?;
    let tree = ctx
        .datastores
        .get(&source)
        .map_err(|error| Error::Datastore(error).to_rpc_errors())?;
    let data = filtered(&tree, operation);
    Ok(netconf::rpc_reply_data(None, &data))
}

fn process_edit_config(
    ctx: &mut Context,
    session_id: u32,
    operation: NodeRef<'_>,
) -> HandlerResult {
    let target = datastore_arg(operation, "target")?;
    let default_op = match operation.child_body("default-operation") {
        None => Operation::Merge,
        Some(value) => match value {
            "merge" => Operation::Merge,
            "replace" => Operation::Replace,
            "none" => Operation::None,
            _ => {
                return Err(vec![RpcError::invalid_value(
                    ErrorType::Protocol,
                    &format!("unknown default-operation '{value}'"),
                )]);
            }
        },
    };
    let Some(config) = operation.child("config") else {
        return Err(vec![RpcError::missing_element(
            ErrorType::Protocol,
            "config",
        )]);
    };
    let mut edits = ConfigTree::new();
    for child in config.children() {
        edits.import(None, operation.tree(), child.id());
    }

    match target {
        DatastoreName::Candidate => {
            ensure_unlocked(ctx, &DatastoreName::Candidate, session_id)?;
            let mut tree = ctx
                .datastores
                .get(&DatastoreName::Candidate)
                .map_err(|error| Error::Datastore(error).to_rpc_errors())?
                .as_ref()
                .clone();
            merge::merge_with_default(
                &mut tree,
                &edits,
                &ctx.schema,
                default_op,
            )
            .map_err(|error| Error::Merge(error).to_rpc_errors())?;
            ctx.datastores
                .put(&DatastoreName::Candidate, tree)
                .map_err(|error| Error::Datastore(error).to_rpc_errors())?;
            Ok(netconf::rpc_reply_ok(None))
        }
        DatastoreName::Running => {
            // Immediate commit: only valid in `set` compatibility mode.
            if ctx.compat != CompatMode::Set {
                return Err(vec![RpcError::operation_not_supported(
                    ErrorType::Protocol,
                    "direct writes to running are not enabled",
                )]);
            }
            ensure_unlocked(ctx, &DatastoreName::Running, session_id)?;
            let mut tree = ctx
                .datastores
                .get(&DatastoreName::Running)
                .map_err(|error| Error::Datastore(error).to_rpc_errors())?
                .as_ref()
                .clone();
            merge::merge_with_default(
                &mut tree,
                &edits,
                &ctx.schema,
                default_op,
            )
            .map_err(|error| Error::Merge(error).to_rpc_errors())?;
            commit_and_notify(ctx, tree, session_id)?;
            Ok(netconf::rpc_reply_ok(None))
        }
        _ => Err(vec![RpcError::operation_not_supported(
            ErrorType::Protocol,
            &format!("cannot edit the '{target}' datastore"),
        )]),
    }
}

fn process_copy_config(
    ctx: &mut Context,
    session_id: u32,
    operation: NodeRef<'_>,
) -> HandlerResult {
    let target = datastore_arg(operation, "target")?;
    let source = config_arg(ctx, operation, "source")?;

    match target {
        DatastoreName::Running => {
            ensure_unlocked(ctx, &DatastoreName::Running, session_id)?;
            commit_and_notify(ctx, source, session_id)?;
        }
        _ => {
            ensure_unlocked(ctx, &target, session_id)?;
            ctx.datastores
                .put(&target, source)
                .map_err(|error| Error::Datastore(error).to_rpc_errors())?;
        }
    }
    Ok(netconf::rpc_reply_ok(None))
}

fn process_delete_config(
    ctx: &mut Context,
    session_id: u32,
    operation: NodeRef<'_>,
) -> HandlerResult {
    let target = datastore_arg(operation, "target")?;
    if target == DatastoreName::Running {
        return Err(vec![RpcError::invalid_value(
            ErrorType::Protocol,
            "the running configuration cannot be deleted",
        )]);
    }
    ensure_unlocked(ctx, &target, session_id)?;
    ctx.datastores
        .delete(&target)
        .map_err(|error| Error::Datastore(error).to_rpc_errors())?;
    Ok(netconf::rpc_reply_ok(None))
}

fn process_lock(
    ctx: &mut Context,
    session_id: u32,
    operation: NodeRef<'_>,
) -> HandlerResult {
    let target = datastore_arg(operation, "target")?;
    ctx.datastores
        .lock(&target, session_id)
        .map_err(|error| Error::Datastore(error).to_rpc_errors())?;
    Ok(netconf::rpc_reply_ok(None))
}

fn process_unlock(
    ctx: &mut Context,
    session_id: u32,
    operation: NodeRef<'_>,
) -> HandlerResult {
    let target = datastore_arg(operation, "target")?;
    ctx.datastores
        .unlock(&target, session_id)
        .map_err(|error| Error::Datastore(error).to_rpc_errors())?;
    Ok(netconf::rpc_reply_ok(None))
}

fn process_kill_session(
    ctx: &mut Context,
    session_id: u32,
    operation: NodeRef<'_>,
) -> HandlerResult {
    let target = operation
        .child_body("session-id")
        .and_then(|value| value.parse::<u32>().ok())
        .ok_or_else(|| {
            vec![RpcError::invalid_value(
                ErrorType::Protocol,
                "missing or malformed session-id",
            )]
        })?;
    if target == session_id {
        return Err(vec![RpcError::invalid_value(
            ErrorType::Protocol,
            "cannot kill the current session",
        )]);
    }
    if ctx.sessions.get(target).is_none() {
        return Err(Error::SessionNotFound(target).to_rpc_errors());
    }
    close_session(ctx, target);
    Ok(netconf::rpc_reply_ok(None))
}

fn process_commit(
    ctx: &mut Context,
    session_id: u32,
    operation: NodeRef<'_>,
) -> HandlerResult {
    let confirmed = operation.child("confirmed").is_some();
    let timeout = match operation.child_body("confirm-timeout") {
        None => DFLT_CONFIRM_TIMEOUT,
        Some(value) => value.parse::<u64>().map_err(|_| {
            vec![RpcError::invalid_value(
                ErrorType::Protocol,
                &format!("malformed confirm-timeout '{value}'"),
            )]
        })?,
    };
    let persist = operation.child_body("persist").map(str::to_owned);
    let persist_id = operation.child_body("persist-id").map(str::to_owned);

    if confirmed {
        process_commit_confirmed(
            ctx,
            session_id,
            Duration::from_secs(timeout),
            persist,
            persist_id,
        )
    } else {
        process_commit_plain(ctx, session_id, persist_id)
    }
}

// <commit> without <confirmed/>: either a regular commit or the
// confirmation of a pending confirmed commit.
fn process_commit_plain(
    ctx: &mut Context,
    session_id: u32,
    persist_id: Option<String>,
) -> HandlerResult {
    match ctx.confirmed.state() {
        ConfirmedCommitState::Inactive => {
            if persist_id.is_some() {
                return Err(Error::NoConfirmedCommit.to_rpc_errors());
            }
            commit_candidate(ctx, session_id, None)?;
            Ok(netconf::rpc_reply_ok(None))
        }
        ConfirmedCommitState::Persistent | ConfirmedCommitState::Ephemeral => {
            if !ctx.confirmed.may_control(session_id, persist_id.as_deref())
            {
                return Err(Error::ConfirmedCommitDenied(
                    "the confirmed commit is owned by another session"
                        .to_owned(),
                )
                .to_rpc_errors());
            }
            // Confirming commit: cancel the timer, drop the snapshot and
            // apply whatever else is staged in the candidate.
            let owner = ctx.confirmed.take().map(|(owner, _)| owner);
            debug!("commit confirmation accepted");
            commit_candidate(ctx, session_id, None)?;
            notify_subscribers(
                ctx,
                notification::confirmed_commit(
                    owner.unwrap_or(session_id),
                    ConfirmEvent::Confirm,
                ),
            );
            Ok(netconf::rpc_reply_ok(None))
        }
        ConfirmedCommitState::Rollback => {
            Err(Error::CommitInProgress.to_rpc_errors())
        }
    }
}

// <commit> with <confirmed/>: start or extend a confirmed commit.
fn process_commit_confirmed(
    ctx: &mut Context,
    session_id: u32,
    timeout: Duration,
    persist: Option<String>,
    persist_id: Option<String>,
) -> HandlerResult {
    match ctx.confirmed.state() {
        ConfirmedCommitState::Inactive => {
            // Snapshot running immediately before the commit is applied.
            let snapshot = ctx
                .datastores
                .get(&DatastoreName::Running)
                .map_err(|error| Error::Datastore(error).to_rpc_errors())?;
            commit_candidate(ctx, session_id, Some(snapshot.clone()))?;
            ctx.confirmed.start(
                session_id,
                persist,
                timeout,
                snapshot,
            );
            notify_subscribers(
                ctx,
                notification::confirmed_commit(
                    session_id,
                    ConfirmEvent::Start,
                ),
            );
            Ok(netconf::rpc_reply_ok(None))
        }
        ConfirmedCommitState::Persistent | ConfirmedCommitState::Ephemeral => {
            if !ctx.confirmed.may_control(session_id, persist_id.as_deref())
            {
                return Err(Error::ConfirmedCommitDenied(
                    "the confirmed commit is owned by another session"
                        .to_owned(),
                )
                .to_rpc_errors());
            }
            commit_candidate(ctx, session_id, None)?;
            ctx.confirmed.extend(timeout, persist);
            notify_subscribers(
                ctx,
                notification::confirmed_commit(
                    session_id,
                    ConfirmEvent::Extend,
                ),
            );
            Ok(netconf::rpc_reply_ok(None))
        }
        ConfirmedCommitState::Rollback => {
            Err(Error::CommitInProgress.to_rpc_errors())
        }
    }
}

fn process_cancel_commit(
    ctx: &mut Context,
    session_id: u32,
    operation: NodeRef<'_>,
) -> HandlerResult {
    let persist_id = operation.child_body("persist-id");

    match ctx.confirmed.state() {
        ConfirmedCommitState::Inactive | ConfirmedCommitState::Rollback => {
            Err(Error::NoConfirmedCommit.to_rpc_errors())
        }
        ConfirmedCommitState::Persistent | ConfirmedCommitState::Ephemeral => {
            if !ctx.confirmed.may_control(session_id, persist_id) {
                return Err(Error::ConfirmedCommitDenied(
                    "the confirmed commit is owned by another session"
                        .to_owned(),
                )
                .to_rpc_errors());
            }
            confirmed::rollback(ctx, ConfirmEvent::Cancel);
            Ok(netconf::rpc_reply_ok(None))
        }
    }
}

fn process_discard_changes(
    ctx: &mut Context,
    session_id: u32,
) -> HandlerResult {
    ensure_unlocked(ctx, &DatastoreName::Candidate, session_id)?;
    ctx.datastores
        .copy(&DatastoreName::Running, &DatastoreName::Candidate)
        .map_err(|error| Error::Datastore(error).to_rpc_errors())?;
    Ok(netconf::rpc_reply_ok(None))
}

fn process_validate(
    ctx: &mut Context,
    session_id: u32,
    operation: NodeRef<'_>,
) -> HandlerResult {
    let mut source = config_arg(ctx, operation, "source")?;
    source.bind_schema(&ctx.schema);

    let running = ctx
        .datastores
        .get(&DatastoreName::Running)
        .map_err(|error| Error::Datastore(error).to_rpc_errors())?;
    let changes = diff::diff(&running, &source, &ctx.schema);
    let tx = TransactionCtx {
        id: 0,
        session_id,
        source: &source,
        target: &running,
        changes: &changes,
    };

    validate::validate_tree(
        &mut ctx.plugins,
        &ctx.schema,
        ctx.xpath.as_ref(),
        &tx,
    )
    .map_err(|failure| match failure {
        validate::ValidateFailure::Schema(diagnostics) => {
            Error::Validation(diagnostics).to_rpc_errors()
        }
        validate::ValidateFailure::Plugin { error, .. } => {
            Error::Plugin(error).to_rpc_errors()
        }
    })?;
    Ok(netconf::rpc_reply_ok(None))
}

fn process_create_subscription(
    ctx: &mut Context,
    session_id: u32,
    operation: NodeRef<'_>,
) -> HandlerResult {
    if let Some(stream) = operation.child_body("stream")
        && stream != "NETCONF"
    {
        return Err(vec![RpcError::invalid_value(
            ErrorType::Protocol,
            &format!("unknown notification stream '{stream}'"),
        )]);
    }
    match ctx.sessions.get_mut(session_id) {
        Some(session) => {
            session.subscribed = true;
            Ok(netconf::rpc_reply_ok(None))
        }
        None => Err(Error::SessionNotFound(session_id).to_rpc_errors()),
    }
}

fn process_plugin_rpc(
    ctx: &mut Context,
    qname: &QName,
    operation: NodeRef<'_>,
) -> HandlerResult {
    match ctx.plugins.rpc_handler(qname) {
        Some(plugin) => match plugin.rpc(operation) {
            Ok(content) if content.is_empty() => {
                Ok(netconf::rpc_reply_ok(None))
            }
            Ok(content) => Ok(netconf::rpc_reply_data(None, &content)),
            Err(error) => Err(vec![error]),
        },
        None => Err(vec![RpcError::operation_not_supported(
            ErrorType::Application,
            &format!("unknown operation '{}'", qname.name),
        )]),
    }
}

// Commits a tree into running and notifies subscribers of the change.
fn commit_and_notify(
    ctx: &mut Context,
    tree: ConfigTree,
    session_id: u32,
) -> Result<CommitOutcome, Vec<RpcError>> {
    let outcome = commit::commit_tree(ctx, tree, session_id, None)
        .map_err(|error| error.to_rpc_errors())?;
    if let CommitOutcome::Committed { .. } = outcome {
        notify_subscribers(
            ctx,
            notification::config_change(session_id, "running"),
        );
    }
    Ok(outcome)
}

// Commits the candidate datastore into running.
fn commit_candidate(
    ctx: &mut Context,
    session_id: u32,
    restore: Option<Arc<ConfigTree>>,
) -> Result<CommitOutcome, Vec<RpcError>> {
    let outcome = commit::candidate_commit(
        ctx,
        &DatastoreName::Candidate,
        session_id,
        restore,
    )
    .map_err(|error| error.to_rpc_errors())?;
    if let CommitOutcome::Committed { .. } = outcome {
        notify_subscribers(
            ctx,
            notification::config_change(session_id, "running"),
        );
    }
    Ok(outcome)
}

// Resolves a <source>/<target> element naming a datastore.
fn datastore_arg(
    operation: NodeRef<'_>,
    element: &str,
) -> Result<DatastoreName, Vec<RpcError>> {
    let Some(container) = operation.child(element) else {
        return Err(vec![RpcError::missing_element(
            ErrorType::Protocol,
            element,
        )]);
    };
    let Some(name) = container.children().next() else {
        return Err(vec![RpcError::missing_element(
            ErrorType::Protocol,
            element,
        )]);
    };
    name.name().parse::<DatastoreName>().map_err(|_| {
        vec![RpcError::bad_element(ErrorType::Protocol, name.name())]
    })
}

// Resolves a <source> element that may name a datastore or carry inline
// <config> content.
fn config_arg(
    ctx: &mut Context,
    operation: NodeRef<'_>,
    element: &str,
) -> Result<ConfigTree, Vec<RpcError>> {
    let Some(container) = operation.child(element) else {
        return Err(vec![RpcError::missing_element(
            ErrorType::Protocol,
            element,
        )]);
    };
    let Some(arg) = container.children().next() else {
        return Err(vec![RpcError::missing_element(
            ErrorType::Protocol,
            element,
        )]);
    };
    if arg.name() == "config" {
        let mut tree = ConfigTree::new();
        for child in arg.children() {
            tree.import(None, operation.tree(), child.id());
        }
        return Ok(tree);
    }
    let name = arg.name().parse::<DatastoreName>().map_err(|_| {
        vec![RpcError::bad_element(ErrorType::Protocol, arg.name())]
    })?;
    let tree = ctx
        .datastores
        .get(&name)
        .map_err(|error| Error::Datastore(error).to_rpc_errors())?;
    Ok((*tree).clone())
}

// Operations on a datastore locked by another session fail with `in-use`.
fn ensure_unlocked(
    ctx: &Context,
    name: &DatastoreName,
    session_id: u32,
) -> Result<(), Vec<RpcError>> {
    match ctx.datastores.lock_holder(name) {
        Some(holder) if holder != session_id => {
            Err(vec![RpcError::in_use(
                ErrorType::Protocol,
                &format!("the {name} datastore is locked by session {holder}"),
            )])
        }
        _ => Ok(()),
    }
}

// Applies the optional subtree filter of a get/get-config request.
fn filtered(data: &ConfigTree, operation: NodeRef<'_>) -> ConfigTree {
    match operation.child("filter") {
        Some(filter) => apply_filter(data, filter),
        None => data.clone(),
    }
}

// RFC 6241 §6 subtree filtering: containment nodes select subtrees,
// content-match leaves constrain sibling selection.
fn apply_filter(data: &ConfigTree, filter: NodeRef<'_>) -> ConfigTree {
    let mut result = ConfigTree::new();
    for selector in filter.children() {
        for root in data.roots() {
            if root.name() == selector.name() {
                filter_subtree(&mut result, None, data, root, selector);
            }
        }
    }
    result
}

fn filter_subtree(
    result: &mut ConfigTree,
    parent: Option<NodeId>,
    data: &ConfigTree,
    node: NodeRef<'_>,
    selector: NodeRef<'_>,
) -> bool {
    // A selector without children selects the entire subtree.
    if !selector.has_children() {
        result.import(parent, data, node.id());
        return true;
    }

    // Content-match leaves must all match.
    let content: Vec<NodeRef<'_>> = selector
        .children()
        .filter(|child| child.body().is_some())
        .collect();
    for matcher in &content {
        if node.child_body(matcher.name()) != matcher.body() {
            return false;
        }
    }

    let id = result.add(parent, node.name());
    if let Some(namespace) = node.namespace() {
        let namespace = namespace.to_owned();
        result.set_namespace(id, &namespace);
    }

    // Include the matched content leaves in the output.
    for matcher in &content {
        if let Some(leaf) = node.child(matcher.name()) {
            result.import(Some(id), data, leaf.id());
        }
    }

    // Recurse into selection nodes.
    let selections: Vec<NodeRef<'_>> = selector
        .children()
        .filter(|child| child.body().is_none())
        .collect();
    if selections.is_empty() {
        // Content matches only: select the whole entry.
        result.remove(id);
        result.import(parent, data, node.id());
        return true;
    }

    let mut matched = false;
    for selection in &selections {
        for child in node.children() {
            if child.name() == selection.name() {
                matched |= filter_subtree(
                    result,
                    Some(id),
                    data,
                    child,
                    *selection,
                );
            }
        }
    }
    if !matched {
        result.remove(id);
    }
    matched
}

fn set_message_id(reply: &mut ConfigTree, message_id: Option<&str>) {
    if let Some(message_id) = message_id
        && let Some(root) = reply.root_ids().first().copied()
    {
        reply.set_attr(root, "message-id", message_id);
    }
}
