//
// Copyright (c) The Nacre Core Contributors
//
// SPDX-License-Identifier: MIT
//

mod common;

use nacre_daemon::core::confirmed::{self, ConfirmedCommitState};
use nacre_daemon::core::{close_session, dispatch};
use nacre_datastore::DatastoreName;

use crate::common::{
    context, drain_notifications, error_field, leaf_x, notification_body,
    put, reply_is_ok, rpc_doc, subscriber,
};

#[tokio::test(start_paused = true)]
async fn test_confirmed_commit_timeout_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(dir.path());
    let (session_a, mut rx_a) = subscriber(&mut ctx);

    put(&mut ctx, DatastoreName::Running, "<cfg><x>1</x></cfg>");
    put(&mut ctx, DatastoreName::Candidate, "<cfg><x>2</x></cfg>");

    // <commit><confirmed/><confirm-timeout>1</confirm-timeout></commit>
    let reply = dispatch::process_rpc(
        &mut ctx,
        session_a,
        &rpc_doc(
            "<commit><confirmed/>\
             <confirm-timeout>1</confirm-timeout></commit>",
        ),
    )
    .reply;
    assert!(reply_is_ok(&reply), "{reply:?}");
    assert_eq!(leaf_x(&mut ctx, DatastoreName::Running).as_deref(), Some("2"));
    assert_eq!(ctx.confirmed.state(), ConfirmedCommitState::Ephemeral);
    drain_notifications(&mut rx_a);

    // No confirmation arrives within the timeout: the timer fires and the
    // rollback event runs like any other handler.
    ctx.confirmed.rx.recv().await.unwrap();
    confirmed::process_timeout(&mut ctx);

    assert_eq!(leaf_x(&mut ctx, DatastoreName::Running).as_deref(), Some("1"));
    assert_eq!(ctx.confirmed.state(), ConfirmedCommitState::Inactive);

    // A confirmed-commit notification with confirm-event=timeout was
    // emitted.
    let notifications = drain_notifications(&mut rx_a);
    assert!(notifications.iter().any(|notification| {
        notification_body(
            notification,
            "/notification/netconf-confirmed-commit/confirm-event",
        )
        .as_deref()
            == Some("timeout")
    }));
}

#[tokio::test]
async fn test_confirming_commit_cancels_timer() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(dir.path());
    let (session_a, _rx_a) = subscriber(&mut ctx);

    put(&mut ctx, DatastoreName::Running, "<cfg><x>1</x></cfg>");
    put(&mut ctx, DatastoreName::Candidate, "<cfg><x>2</x></cfg>");

    let reply = dispatch::process_rpc(
        &mut ctx,
        session_a,
        &rpc_doc("<commit><confirmed/></commit>"),
    )
    .reply;
    assert!(reply_is_ok(&reply));

    // The confirming commit deactivates the controller and retains the
    // new configuration.
    let reply = dispatch::process_rpc(
        &mut ctx,
        session_a,
        &rpc_doc("<commit/>"),
    )
    .reply;
    assert!(reply_is_ok(&reply));
    assert_eq!(ctx.confirmed.state(), ConfirmedCommitState::Inactive);
    assert_eq!(leaf_x(&mut ctx, DatastoreName::Running).as_deref(), Some("2"));
}

#[tokio::test]
async fn test_ephemeral_session_close_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(dir.path());
    let (session_a, _rx_a) = subscriber(&mut ctx);

    put(&mut ctx, DatastoreName::Running, "<cfg><x>1</x></cfg>");
    put(&mut ctx, DatastoreName::Candidate, "<cfg><x>2</x></cfg>");

    let reply = dispatch::process_rpc(
        &mut ctx,
        session_a,
        &rpc_doc("<commit><confirmed/></commit>"),
    )
    .reply;
    assert!(reply_is_ok(&reply));
    assert_eq!(leaf_x(&mut ctx, DatastoreName::Running).as_deref(), Some("2"));

    // Closing the owning session restores running before the session
    // record is destroyed.
    close_session(&mut ctx, session_a);
    assert_eq!(leaf_x(&mut ctx, DatastoreName::Running).as_deref(), Some("1"));
    assert!(ctx.sessions.get(session_a).is_none());
}

#[tokio::test]
async fn test_persistent_commit_survives_disconnect() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(dir.path());
    let (session_a, _rx_a) = subscriber(&mut ctx);
    let (session_b, _rx_b) = subscriber(&mut ctx);

    put(&mut ctx, DatastoreName::Running, "<cfg><x>1</x></cfg>");
    put(&mut ctx, DatastoreName::Candidate, "<cfg><x>2</x></cfg>");

    let reply = dispatch::process_rpc(
        &mut ctx,
        session_a,
        &rpc_doc(
            "<commit><confirmed/><persist>abc</persist>\
             <confirm-timeout>60</confirm-timeout></commit>",
        ),
    )
    .reply;
    assert!(reply_is_ok(&reply));
    assert_eq!(ctx.confirmed.state(), ConfirmedCommitState::Persistent);

    // The owner disconnecting does not roll a persistent commit back.
    close_session(&mut ctx, session_a);
    assert_eq!(leaf_x(&mut ctx, DatastoreName::Running).as_deref(), Some("2"));
    assert_eq!(ctx.confirmed.state(), ConfirmedCommitState::Persistent);

    // Any session presenting the persist-id may confirm.
    let reply = dispatch::process_rpc(
        &mut ctx,
        session_b,
        &rpc_doc("<commit><persist-id>abc</persist-id></commit>"),
    )
    .reply;
    assert!(reply_is_ok(&reply));
    assert_eq!(ctx.confirmed.state(), ConfirmedCommitState::Inactive);
    assert_eq!(leaf_x(&mut ctx, DatastoreName::Running).as_deref(), Some("2"));
}

#[tokio::test]
async fn test_persist_id_mismatch_is_invalid_value() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(dir.path());
    let (session_a, _rx_a) = subscriber(&mut ctx);
    let (session_b, _rx_b) = subscriber(&mut ctx);

    put(&mut ctx, DatastoreName::Running, "<cfg><x>1</x></cfg>");
    put(&mut ctx, DatastoreName::Candidate, "<cfg><x>2</x></cfg>");

    let reply = dispatch::process_rpc(
        &mut ctx,
        session_a,
        &rpc_doc("<commit><confirmed/><persist>abc</persist></commit>"),
    )
    .reply;
    assert!(reply_is_ok(&reply));

    let reply = dispatch::process_rpc(
        &mut ctx,
        session_b,
        &rpc_doc("<commit><persist-id>wrong</persist-id></commit>"),
    )
    .reply;
    assert_eq!(
        error_field(&reply, "error-tag").as_deref(),
        Some("invalid-value")
    );
    assert_eq!(ctx.confirmed.state(), ConfirmedCommitState::Persistent);
}

#[tokio::test]
async fn test_cancel_commit_from_non_owner_is_invalid_value() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(dir.path());
    let (session_a, _rx_a) = subscriber(&mut ctx);
    let (session_b, _rx_b) = subscriber(&mut ctx);

    put(&mut ctx, DatastoreName::Running, "<cfg><x>1</x></cfg>");
    put(&mut ctx, DatastoreName::Candidate, "<cfg><x>2</x></cfg>");

    let reply = dispatch::process_rpc(
        &mut ctx,
        session_a,
        &rpc_doc("<commit><confirmed/></commit>"),
    )
    .reply;
    assert!(reply_is_ok(&reply));

    // Ephemeral confirmed commits may only be cancelled by their owner.
    let reply = dispatch::process_rpc(
        &mut ctx,
        session_b,
        &rpc_doc("<cancel-commit/>"),
    )
    .reply;
    assert_eq!(
        error_field(&reply, "error-tag").as_deref(),
        Some("invalid-value")
    );
    assert_eq!(leaf_x(&mut ctx, DatastoreName::Running).as_deref(), Some("2"));

    // The owner may.
    let reply = dispatch::process_rpc(
        &mut ctx,
        session_a,
        &rpc_doc("<cancel-commit/>"),
    )
    .reply;
    assert!(reply_is_ok(&reply));
    assert_eq!(leaf_x(&mut ctx, DatastoreName::Running).as_deref(), Some("1"));
    assert_eq!(ctx.confirmed.state(), ConfirmedCommitState::Inactive);
}

#[tokio::test]
async fn test_cancel_commit_without_confirmed_commit() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(dir.path());
    let (session_a, _rx_a) = subscriber(&mut ctx);

    let reply = dispatch::process_rpc(
        &mut ctx,
        session_a,
        &rpc_doc("<cancel-commit/>"),
    )
    .reply;
    assert_eq!(
        error_field(&reply, "error-tag").as_deref(),
        Some("invalid-value")
    );
}

#[tokio::test]
async fn test_follow_up_confirmed_commit_extends() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(dir.path());
    let (session_a, _rx_a) = subscriber(&mut ctx);

    put(&mut ctx, DatastoreName::Running, "<cfg><x>1</x></cfg>");
    put(&mut ctx, DatastoreName::Candidate, "<cfg><x>2</x></cfg>");

    let reply = dispatch::process_rpc(
        &mut ctx,
        session_a,
        &rpc_doc("<commit><confirmed/></commit>"),
    )
    .reply;
    assert!(reply_is_ok(&reply));

    // A follow-up confirmed commit from the same session re-arms the
    // timer and stays ephemeral.
    put(&mut ctx, DatastoreName::Candidate, "<cfg><x>3</x></cfg>");
    let reply = dispatch::process_rpc(
        &mut ctx,
        session_a,
        &rpc_doc(
            "<commit><confirmed/>\
             <confirm-timeout>120</confirm-timeout></commit>",
        ),
    )
    .reply;
    assert!(reply_is_ok(&reply));
    assert_eq!(ctx.confirmed.state(), ConfirmedCommitState::Ephemeral);
    assert_eq!(leaf_x(&mut ctx, DatastoreName::Running).as_deref(), Some("3"));
}
