//
// Copyright (c) The Nacre Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Commit engine.
//!
//! Drives the two-phase transaction against the running datastore:
//!
//! ```text
//! phase          callback order   on failure
//! begin          forward          abort (reverse), stop
//! validate       forward          abort, return invalid
//! complete       forward          revert, end, stop
//! commit (apply) forward          revert, end, stop
//! commit_done    forward          logged, not fatal
//! end            forward          always runs
//! ```
//!
//! A failure inside `commit` triggers `revert` in reverse registration
//! order; a failed `revert` records `NOT_APPLIED` and the transaction
//! surfaces `rollback-failed`. When the caller supplied a prior snapshot
//! (the confirmed-commit path), running is additionally restored to it.

use std::sync::Arc;

use bitflags::bitflags;
use chrono::{DateTime, Utc};
use nacre_datastore::{ChangeSet, ConfigTree, DatastoreName, diff};
use nacre_northbound::{TransactionCtx, TransactionPhase};
use tracing::{debug, error, warn};

use crate::core::error::{Error, Result};
use crate::core::{Context, validate};

bitflags! {
    // Rollback failure state of a transaction.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct RollbackFlags: u8 {
        // A plugin's revert callback failed.
        const NOT_APPLIED = 0x01;
        // Running could not be restored to the prior snapshot.
        const DB_NOT_DELETED = 0x02;
        // The failsafe configuration was applied during rollback.
        const FAILSAFE_APPLIED = 0x04;
    }
}

/// A configuration transaction. Owns the source and target trees
/// exclusively until the commit terminates; plugins only ever see borrowed
/// references.
#[derive(Debug)]
pub struct Transaction {
    pub id: u64,
    pub session_id: u32,
    pub date: DateTime<Utc>,
    pub source: ConfigTree,
    pub target: ConfigTree,
    pub changes: ChangeSet,
}

#[derive(Debug, Eq, PartialEq)]
pub enum CommitOutcome {
    /// Source and running were already equal.
    Unchanged,
    Committed {
        transaction_id: u64,
    },
}

// ===== impl Transaction =====

impl Transaction {
    fn ctx(&self) -> TransactionCtx<'_> {
        TransactionCtx {
            id: self.id,
            session_id: self.session_id,
            source: &self.source,
            target: &self.target,
            changes: &self.changes,
        }
    }
}

// ===== global functions =====

/// Commits the content of a source datastore into running.
pub fn candidate_commit(
    ctx: &mut Context,
    source: &DatastoreName,
    session_id: u32,
    restore: Option<Arc<ConfigTree>>,
) -> Result<CommitOutcome> {
    let tree = (*ctx.datastores.get(source)?).clone();
    commit_tree(ctx, tree, session_id, restore)
}

/// Commits an in-memory tree into running. This is the single entry point
/// for candidate commits, `set`-mode edits, startup recovery and
/// confirmed-commit rollbacks, so all commits are totally ordered by the
/// process-wide transaction counter.
pub fn commit_tree(
    ctx: &mut Context,
    source: ConfigTree,
    session_id: u32,
    restore: Option<Arc<ConfigTree>>,
) -> Result<CommitOutcome> {
    if ctx.commit_in_progress {
        return Err(Error::CommitInProgress);
    }
    for name in [DatastoreName::Candidate, DatastoreName::Running] {
        if let Some(holder) = ctx.datastores.lock_holder(&name)
            && holder != session_id
        {
            return Err(Error::Datastore(
                nacre_datastore::registry::Error::LockDenied {
                    name,
                    holder,
                },
            ));
        }
    }

    ctx.commit_in_progress = true;
    let result = run_transaction(ctx, source, session_id, restore);
    ctx.commit_in_progress = false;
    result
}

// ===== helper functions =====

fn run_transaction(
    ctx: &mut Context,
    mut source: ConfigTree,
    session_id: u32,
    restore: Option<Arc<ConfigTree>>,
) -> Result<CommitOutcome> {
    source.bind_schema(&ctx.schema);

    let running = ctx.datastores.get(&DatastoreName::Running)?;
    let changes = diff::diff(&running, &source, &ctx.schema);
    if changes.is_empty() {
        return Ok(CommitOutcome::Unchanged);
    }

    ctx.next_transaction_id += 1;
    let transaction = Transaction {
        id: ctx.next_transaction_id,
        session_id,
        date: Utc::now(),
        source,
        target: (*running).clone(),
        changes,
    };
    drop(running);
    let tx = transaction.ctx();

    debug!(
        id = %transaction.id, %session_id,
        changes = %serde_json::to_string(&transaction.changes).unwrap_or_default(),
        "configuration transaction"
    );

    let total = ctx.plugins.len();
    let mut flags = RollbackFlags::empty();

    // Phase: begin.
    if let Err((observed, error)) =
        ctx.plugins.invoke_forward(TransactionPhase::Begin, &tx)
    {
        ctx.plugins
            .invoke_reverse(TransactionPhase::Abort, &tx, observed);
        ctx.last_rollback_flags = flags;
        return Err(Error::Plugin(error));
    }

    // Phase: validate (schema checks + plugin callbacks).
    if let Err(failure) = validate::validate_tree(
        &mut ctx.plugins,
        &ctx.schema,
        ctx.xpath.as_ref(),
        &tx,
    ) {
        ctx.plugins
            .invoke_reverse(TransactionPhase::Abort, &tx, total);
        ctx.last_rollback_flags = flags;
        return Err(match failure {
            validate::ValidateFailure::Schema(diagnostics) => {
                Error::Validation(diagnostics)
            }
            validate::ValidateFailure::Plugin { error, .. } => {
                Error::Plugin(error)
            }
        });
    }

    // Phase: complete.
    if let Err((observed, error)) =
        ctx.plugins.invoke_forward(TransactionPhase::Complete, &tx)
    {
        ctx.plugins
            .invoke_reverse(TransactionPhase::Revert, &tx, observed);
        ctx.plugins
            .invoke_reverse(TransactionPhase::End, &tx, observed);
        ctx.last_rollback_flags = flags;
        return Err(Error::Plugin(error));
    }

    // Phase: commit (apply). This step makes changes observable outside
    // the process; failures roll back everything the earlier plugins did.
    if let Err((observed, error)) =
        ctx.plugins.invoke_forward(TransactionPhase::Commit, &tx)
    {
        let failures = ctx
            .plugins
            .invoke_reverse(TransactionPhase::Revert, &tx, observed);
        if !failures.is_empty() {
            for failure in &failures {
                failure.log();
            }
            flags |= RollbackFlags::NOT_APPLIED;
        }
        if let Some(restore) = &restore
            && let Err(restore_error) = ctx
                .datastores
                .put(&DatastoreName::Running, (**restore).clone())
        {
            error!(error = %restore_error,
                "failed to restore running to the prior snapshot");
            flags |= RollbackFlags::DB_NOT_DELETED;
        }
        ctx.plugins
            .invoke_reverse(TransactionPhase::End, &tx, observed);
        ctx.last_rollback_flags = flags;
        if !flags.is_empty() {
            return Err(Error::RollbackFailed {
                flags,
                reason: error.to_string(),
            });
        }
        return Err(Error::Plugin(error));
    }

    // Phase: commit_done. Failures are logged, never fatal.
    if let Err((_, error)) = ctx
        .plugins
        .invoke_forward(TransactionPhase::CommitDone, &tx)
    {
        warn!(error = %error, "commit_done callback failed");
    }

    // Install the committed tree as the new running content.
    if let Err(error) = ctx
        .datastores
        .put(&DatastoreName::Running, transaction.source.clone())
    {
        let failures = ctx
            .plugins
            .invoke_reverse(TransactionPhase::Revert, &tx, total);
        if !failures.is_empty() {
            flags |= RollbackFlags::NOT_APPLIED;
        }
        ctx.plugins
            .invoke_reverse(TransactionPhase::End, &tx, total);
        ctx.last_rollback_flags = flags;
        return Err(Error::Datastore(error));
    }

    // Phase: end. Always runs, in registration order.
    let _ = ctx.plugins.invoke_forward(TransactionPhase::End, &tx);

    ctx.last_rollback_flags = RollbackFlags::empty();
    Ok(CommitOutcome::Committed {
        transaction_id: transaction.id,
    })
}
