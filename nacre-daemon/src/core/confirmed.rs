//
// Copyright (c) The Nacre Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Confirmed-commit controller.
//!
//! Singleton state machine over `{INACTIVE, PERSISTENT, EPHEMERAL,
//! ROLLBACK}`. A confirmed commit snapshots running before it is applied
//! and arms a timeout; unless a confirming commit (or a matching
//! persist-id) arrives in time, the snapshot is committed back. An
//! ephemeral confirmed commit is also rolled back when its owning session
//! closes.

use std::sync::Arc;
use std::time::Duration;

use nacre_datastore::{ConfigTree, DatastoreName};
use nacre_northbound::notification::{self, ConfirmEvent};
use nacre_utils::task::TimeoutTask;
use tokio::sync::mpsc;
use tokio::sync::mpsc::{Receiver, Sender};
use tracing::{debug, error, info};

use crate::core::commit::{self, RollbackFlags};
use crate::core::{Context, notify_subscribers};

// Log entry emitted when the timeout fires.
const COMMIT_NOT_CONFIRMED: &str =
    "Commit was not confirmed; automatic rollback complete.";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConfirmedCommitState {
    Inactive,
    Persistent,
    Ephemeral,
    Rollback,
}

/// The confirmed-commit singleton, owned by the [`Context`].
#[derive(Debug)]
pub struct ConfirmedCommit {
    // Channels used to deliver timeout events to the core loop.
    tx: Sender<()>,
    pub rx: Receiver<()>,

    // Confirmed commit in progress.
    active: Option<Active>,
    rolling_back: bool,
}

#[derive(Debug)]
struct Active {
    session_id: u32,
    persist_id: Option<String>,
    snapshot: Arc<ConfigTree>,
    timer: TimeoutTask,
}

// ===== impl ConfirmedCommit =====

impl ConfirmedCommit {
    pub fn state(&self) -> ConfirmedCommitState {
        if self.rolling_back {
            return ConfirmedCommitState::Rollback;
        }
        match &self.active {
            None => ConfirmedCommitState::Inactive,
            Some(active) if active.persist_id.is_some() => {
                ConfirmedCommitState::Persistent
            }
            Some(_) => ConfirmedCommitState::Ephemeral,
        }
    }

    pub fn session_id(&self) -> Option<u32> {
        self.active.as_ref().map(|active| active.session_id)
    }

    pub fn persist_id(&self) -> Option<&str> {
        self.active
            .as_ref()
            .and_then(|active| active.persist_id.as_deref())
    }

    pub fn snapshot(&self) -> Option<Arc<ConfigTree>> {
        self.active.as_ref().map(|active| active.snapshot.clone())
    }

    /// Whether a session presenting the given persist-id may confirm or
    /// cancel the commit in progress.
    pub fn may_control(
        &self,
        session_id: u32,
        persist_id: Option<&str>,
    ) -> bool {
        match &self.active {
            None => false,
            Some(active) => match &active.persist_id {
                Some(expected) => persist_id == Some(expected.as_str()),
                None => active.session_id == session_id,
            },
        }
    }

    /// Arms the controller after a confirmed commit was applied.
    pub fn start(
        &mut self,
        session_id: u32,
        persist_id: Option<String>,
        timeout: Duration,
        snapshot: Arc<ConfigTree>,
    ) {
        debug!(%session_id, timeout = %timeout.as_secs(),
            persistent = %persist_id.is_some(),
            "starting confirmed commit timeout");

        let timer = self.timer_task(timeout);
        self.active = Some(Active {
            session_id,
            persist_id,
            snapshot,
            timer,
        });
    }

    /// Re-arms the timer for a follow-up confirmed commit, optionally
    /// rotating the persist-id.
    pub fn extend(
        &mut self,
        timeout: Duration,
        persist_id: Option<String>,
    ) {
        if let Some(active) = &mut self.active {
            debug!(timeout = %timeout.as_secs(),
                "extending confirmed commit timeout");
            active.timer.reset(Some(timeout));
            if persist_id.is_some() {
                active.persist_id = persist_id;
            }
        }
    }

    /// Deactivates the controller, cancelling the timer. Returns the owning
    /// session and the rollback snapshot.
    pub fn take(&mut self) -> Option<(u32, Arc<ConfigTree>)> {
        self.active
            .take()
            .map(|active| (active.session_id, active.snapshot))
    }

    fn timer_task(&self, timeout: Duration) -> TimeoutTask {
        let tx = self.tx.clone();
        TimeoutTask::new(timeout, move || async move {
            let _ = tx.send(()).await;
        })
    }
}

impl Default for ConfirmedCommit {
    fn default() -> ConfirmedCommit {
        let (tx, rx) = mpsc::channel(4);

        ConfirmedCommit {
            tx,
            rx,
            active: None,
            rolling_back: false,
        }
    }
}

// ===== global functions =====

/// Handles a confirmed-commit timeout event from the core loop.
pub fn process_timeout(ctx: &mut Context) {
    if ctx.confirmed.active.is_none() {
        return;
    }
    info!("{}", COMMIT_NOT_CONFIRMED);
    rollback(ctx, ConfirmEvent::Timeout);
}

/// Restores running to the pre-commit snapshot. Invoked on timeout, on
/// `cancel-commit` and when an ephemeral owner session closes.
pub fn rollback(ctx: &mut Context, event: ConfirmEvent) {
    let Some((session_id, snapshot)) = ctx.confirmed.take() else {
        return;
    };

    ctx.confirmed.rolling_back = true;
    if let Err(rollback_error) =
        commit::commit_tree(ctx, (*snapshot).clone(), session_id, None)
    {
        error!(error = %rollback_error,
            "failed to roll back to the pre-commit configuration");

        // Fall back to the failsafe configuration, if one is provisioned.
        if ctx.datastores.exists(&DatastoreName::Failsafe) {
            match ctx.datastores.get(&DatastoreName::Failsafe) {
                Ok(failsafe) => {
                    if commit::commit_tree(
                        ctx,
                        (*failsafe).clone(),
                        session_id,
                        None,
                    )
                    .is_ok()
                    {
                        ctx.last_rollback_flags |=
                            RollbackFlags::FAILSAFE_APPLIED;
                        info!("applied failsafe configuration");
                    }
                }
                Err(error) => {
                    error!(%error, "failed to load failsafe configuration");
                }
            }
        }
    }
    ctx.confirmed.rolling_back = false;

    // Keep the shared candidate aligned with the restored running.
    if let Err(error) = ctx
        .datastores
        .copy(&DatastoreName::Running, &DatastoreName::Candidate)
    {
        error!(%error, "failed to refresh candidate after rollback");
    }

    notify_subscribers(
        ctx,
        notification::confirmed_commit(session_id, event),
    );
}
