//
// Copyright (c) The Nacre Core Contributors
//
// SPDX-License-Identifier: MIT
//

mod common;

use nacre_daemon::core::dispatch;
use nacre_daemon::core::session::SessionMsg;
use nacre_datastore::DatastoreName;

use crate::common::{
    context, drain_notifications, error_field, error_info_field, leaf_x,
    put, reply_is_ok, rpc_doc, session, subscriber,
};

#[tokio::test]
async fn test_lock_denied_carries_holder_session() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(dir.path());
    let (session_a, _rx_a) = session(&mut ctx);
    let (session_b, _rx_b) = session(&mut ctx);

    // Session A takes the candidate lock.
    let reply = dispatch::process_rpc(
        &mut ctx,
        session_a,
        &rpc_doc("<lock><target><candidate/></target></lock>"),
    )
    .reply;
    assert!(reply_is_ok(&reply));

    // Session B is denied, with A's session id in the error-info.
    let reply = dispatch::process_rpc(
        &mut ctx,
        session_b,
        &rpc_doc("<lock><target><candidate/></target></lock>"),
    )
    .reply;
    assert_eq!(
        error_field(&reply, "error-tag").as_deref(),
        Some("lock-denied")
    );
    assert_eq!(
        error_info_field(&reply, "session-id").as_deref(),
        Some(session_a.to_string().as_str())
    );

    // After unlock, B succeeds.
    let reply = dispatch::process_rpc(
        &mut ctx,
        session_a,
        &rpc_doc("<unlock><target><candidate/></target></unlock>"),
    )
    .reply;
    assert!(reply_is_ok(&reply));
    let reply = dispatch::process_rpc(
        &mut ctx,
        session_b,
        &rpc_doc("<lock><target><candidate/></target></lock>"),
    )
    .reply;
    assert!(reply_is_ok(&reply));
}

#[tokio::test]
async fn test_commit_validation_failure_error_document() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(dir.path());
    let (session_a, _rx_a) = session(&mut ctx);

    put(&mut ctx, DatastoreName::Running, "<cfg><x>1</x></cfg>");
    // Candidate misses the mandatory port leaf.
    put(
        &mut ctx,
        DatastoreName::Candidate,
        "<cfg><server><name>a</name></server></cfg>",
    );

    let reply =
        dispatch::process_rpc(&mut ctx, session_a, &rpc_doc("<commit/>"))
            .reply;
    assert_eq!(
        error_field(&reply, "error-tag").as_deref(),
        Some("operation-failed")
    );
    assert_eq!(
        error_field(&reply, "error-app-tag").as_deref(),
        Some("missing-element")
    );
    assert_eq!(
        error_field(&reply, "error-path").as_deref(),
        Some("/cfg/server[name='a']/port")
    );
    assert_eq!(
        error_field(&reply, "error-severity").as_deref(),
        Some("error")
    );

    // Running is unchanged.
    assert_eq!(leaf_x(&mut ctx, DatastoreName::Running).as_deref(), Some("1"));
}

#[tokio::test]
async fn test_edit_config_stages_into_candidate() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(dir.path());
    let (session_a, mut rx_a) = subscriber(&mut ctx);

    put(&mut ctx, DatastoreName::Running, "<cfg><x>1</x></cfg>");
    put(&mut ctx, DatastoreName::Candidate, "<cfg><x>1</x></cfg>");

    let reply = dispatch::process_rpc(
        &mut ctx,
        session_a,
        &rpc_doc(
            "<edit-config><target><candidate/></target>\
             <config><cfg xmlns=\"\"><x>2</x></cfg></config>\
             </edit-config>",
        ),
    )
    .reply;
    assert!(reply_is_ok(&reply), "{reply:?}");

    // Edits stage into candidate without touching running.
    assert_eq!(
        leaf_x(&mut ctx, DatastoreName::Candidate).as_deref(),
        Some("2")
    );
    assert_eq!(leaf_x(&mut ctx, DatastoreName::Running).as_deref(), Some("1"));
    assert!(drain_notifications(&mut rx_a).is_empty());

    // Commit promotes candidate into running and emits a config-change
    // notification.
    let reply =
        dispatch::process_rpc(&mut ctx, session_a, &rpc_doc("<commit/>"))
            .reply;
    assert!(reply_is_ok(&reply));
    assert_eq!(leaf_x(&mut ctx, DatastoreName::Running).as_deref(), Some("2"));
    let notifications = drain_notifications(&mut rx_a);
    assert!(notifications.iter().any(|notification| {
        notification
            .find_one("/notification/netconf-config-change")
            .is_some()
    }));
}

#[tokio::test]
async fn test_edit_config_operation_attributes() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(dir.path());
    let (session_a, _rx_a) = session(&mut ctx);

    put(
        &mut ctx,
        DatastoreName::Candidate,
        "<cfg><x>1</x><dns>one</dns></cfg>",
    );

    let reply = dispatch::process_rpc(
        &mut ctx,
        session_a,
        &rpc_doc(
            "<edit-config><target><candidate/></target>\
             <config><cfg xmlns=\"\">\
             <x operation=\"delete\">1</x>\
             <dns>two</dns></cfg></config>\
             </edit-config>",
        ),
    )
    .reply;
    assert!(reply_is_ok(&reply), "{reply:?}");

    assert_eq!(leaf_x(&mut ctx, DatastoreName::Candidate), None);
    let candidate = ctx.datastores.get(&DatastoreName::Candidate).unwrap();
    assert_eq!(candidate.find("/cfg/dns").len(), 2);
}

#[tokio::test]
async fn test_edit_config_create_existing_data() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(dir.path());
    let (session_a, _rx_a) = session(&mut ctx);

    put(&mut ctx, DatastoreName::Candidate, "<cfg><x>1</x></cfg>");

    let reply = dispatch::process_rpc(
        &mut ctx,
        session_a,
        &rpc_doc(
            "<edit-config><target><candidate/></target>\
             <config><cfg xmlns=\"\">\
             <x operation=\"create\">2</x></cfg></config>\
             </edit-config>",
        ),
    )
    .reply;
    assert_eq!(
        error_field(&reply, "error-tag").as_deref(),
        Some("data-exists")
    );
}

#[tokio::test]
async fn test_edit_config_running_rejected_in_candidate_mode() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(dir.path());
    let (session_a, _rx_a) = session(&mut ctx);

    let reply = dispatch::process_rpc(
        &mut ctx,
        session_a,
        &rpc_doc(
            "<edit-config><target><running/></target>\
             <config><cfg xmlns=\"\"><x>2</x></cfg></config>\
             </edit-config>",
        ),
    )
    .reply;
    assert_eq!(
        error_field(&reply, "error-tag").as_deref(),
        Some("operation-not-supported")
    );
}

#[tokio::test]
async fn test_edit_config_locked_candidate_in_use() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(dir.path());
    let (session_a, _rx_a) = session(&mut ctx);
    let (session_b, _rx_b) = session(&mut ctx);

    ctx.datastores
        .lock(&DatastoreName::Candidate, session_a)
        .unwrap();

    let reply = dispatch::process_rpc(
        &mut ctx,
        session_b,
        &rpc_doc(
            "<edit-config><target><candidate/></target>\
             <config><cfg xmlns=\"\"><x>2</x></cfg></config>\
             </edit-config>",
        ),
    )
    .reply;
    assert_eq!(error_field(&reply, "error-tag").as_deref(), Some("in-use"));
}

#[tokio::test]
async fn test_get_config_with_subtree_filter() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(dir.path());
    let (session_a, _rx_a) = session(&mut ctx);

    put(
        &mut ctx,
        DatastoreName::Running,
        "<cfg><x>1</x>\
         <server><name>a</name><port>80</port></server>\
         <server><name>b</name><port>443</port></server></cfg>",
    );

    let reply = dispatch::process_rpc(
        &mut ctx,
        session_a,
        &rpc_doc(
            "<get-config><source><running/></source>\
             <filter type=\"subtree\"><cfg xmlns=\"\">\
             <server><name>b</name></server></cfg></filter>\
             </get-config>",
        ),
    )
    .reply;

    let data = reply
        .roots()
        .next()
        .unwrap()
        .child("data")
        .expect("reply carries a data element");
    let servers: Vec<_> = data
        .child("cfg")
        .expect("cfg subtree selected")
        .children()
        .filter(|child| child.name() == "server")
        .collect();
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].child_body("name"), Some("b"));
    assert_eq!(servers[0].child_body("port"), Some("443"));
}

#[tokio::test]
async fn test_get_returns_running() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(dir.path());
    let (session_a, _rx_a) = session(&mut ctx);

    put(&mut ctx, DatastoreName::Running, "<cfg><x>7</x></cfg>");

    let reply =
        dispatch::process_rpc(&mut ctx, session_a, &rpc_doc("<get/>"))
            .reply;
    let data = reply.roots().next().unwrap().child("data").unwrap();
    assert_eq!(
        data.child("cfg").and_then(|cfg| cfg.child_body("x")),
        Some("7")
    );
}

#[tokio::test]
async fn test_discard_changes() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(dir.path());
    let (session_a, _rx_a) = session(&mut ctx);

    put(&mut ctx, DatastoreName::Running, "<cfg><x>1</x></cfg>");
    put(&mut ctx, DatastoreName::Candidate, "<cfg><x>9</x></cfg>");

    let reply = dispatch::process_rpc(
        &mut ctx,
        session_a,
        &rpc_doc("<discard-changes/>"),
    )
    .reply;
    assert!(reply_is_ok(&reply));
    assert_eq!(
        leaf_x(&mut ctx, DatastoreName::Candidate).as_deref(),
        Some("1")
    );
}

#[tokio::test]
async fn test_delete_config_running_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(dir.path());
    let (session_a, _rx_a) = session(&mut ctx);

    let reply = dispatch::process_rpc(
        &mut ctx,
        session_a,
        &rpc_doc("<delete-config><target><running/></target></delete-config>"),
    )
    .reply;
    assert_eq!(
        error_field(&reply, "error-tag").as_deref(),
        Some("invalid-value")
    );
}

#[tokio::test]
async fn test_copy_config_to_startup() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(dir.path());
    let (session_a, _rx_a) = session(&mut ctx);

    put(&mut ctx, DatastoreName::Running, "<cfg><x>4</x></cfg>");

    let reply = dispatch::process_rpc(
        &mut ctx,
        session_a,
        &rpc_doc(
            "<copy-config><target><startup/></target>\
             <source><running/></source></copy-config>",
        ),
    )
    .reply;
    assert!(reply_is_ok(&reply));
    assert_eq!(
        leaf_x(&mut ctx, DatastoreName::Startup).as_deref(),
        Some("4")
    );
}

#[tokio::test]
async fn test_kill_session_releases_locks() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(dir.path());
    let (session_a, _rx_a) = session(&mut ctx);
    let (session_b, mut rx_b) = session(&mut ctx);

    ctx.datastores
        .lock(&DatastoreName::Candidate, session_b)
        .unwrap();

    let reply = dispatch::process_rpc(
        &mut ctx,
        session_a,
        &rpc_doc(&format!(
            "<kill-session><session-id>{session_b}</session-id></kill-session>"
        )),
    )
    .reply;
    assert!(reply_is_ok(&reply));
    assert_eq!(
        ctx.datastores.lock_holder(&DatastoreName::Candidate),
        None
    );
    assert!(ctx.sessions.get(session_b).is_none());
    assert!(matches!(rx_b.try_recv(), Ok(SessionMsg::Close)));
}

#[tokio::test]
async fn test_kill_own_session_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(dir.path());
    let (session_a, _rx_a) = session(&mut ctx);

    let reply = dispatch::process_rpc(
        &mut ctx,
        session_a,
        &rpc_doc(&format!(
            "<kill-session><session-id>{session_a}</session-id></kill-session>"
        )),
    )
    .reply;
    assert_eq!(
        error_field(&reply, "error-tag").as_deref(),
        Some("invalid-value")
    );
}

#[tokio::test]
async fn test_close_session_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(dir.path());
    let (session_a, _rx_a) = session(&mut ctx);

    let outcome = dispatch::process_rpc(
        &mut ctx,
        session_a,
        &rpc_doc("<close-session/>"),
    );
    assert!(reply_is_ok(&outcome.reply));
    assert!(outcome.close_requester);
}

#[tokio::test]
async fn test_validate_rpc() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(dir.path());
    let (session_a, _rx_a) = session(&mut ctx);

    put(
        &mut ctx,
        DatastoreName::Candidate,
        "<cfg><server><name>a</name></server></cfg>",
    );
    let reply = dispatch::process_rpc(
        &mut ctx,
        session_a,
        &rpc_doc("<validate><source><candidate/></source></validate>"),
    )
    .reply;
    assert_eq!(
        error_field(&reply, "error-app-tag").as_deref(),
        Some("missing-element")
    );

    put(&mut ctx, DatastoreName::Candidate, "<cfg><x>1</x></cfg>");
    let reply = dispatch::process_rpc(
        &mut ctx,
        session_a,
        &rpc_doc("<validate><source><candidate/></source></validate>"),
    )
    .reply;
    assert!(reply_is_ok(&reply));
}

#[tokio::test]
async fn test_unknown_rpc_not_supported() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(dir.path());
    let (session_a, _rx_a) = session(&mut ctx);

    let reply = dispatch::process_rpc(
        &mut ctx,
        session_a,
        &rpc_doc("<frobnicate/>"),
    )
    .reply;
    assert_eq!(
        error_field(&reply, "error-tag").as_deref(),
        Some("operation-not-supported")
    );
}

#[tokio::test]
async fn test_plugin_rpc_delegation() {
    use crate::common::{Recorder, Trace};
    use nacre_northbound::QName;

    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(dir.path());
    let (session_a, _rx_a) = session(&mut ctx);

    let trace: Trace = Default::default();
    let mut plugin = Recorder::new("ops", trace.clone());
    plugin.rpcs = vec![QName::new(
        "urn:example:ops".to_owned(),
        "ping".to_owned(),
    )];
    ctx.plugins.register(Box::new(plugin)).unwrap();

    let document = crate::common::parse(
        "<rpc message-id=\"7\" \
         xmlns=\"urn:ietf:params:xml:ns:netconf:base:1.0\">\
         <ping xmlns=\"urn:example:ops\"/></rpc>",
    );
    let reply =
        dispatch::process_rpc(&mut ctx, session_a, &document).reply;
    // The RPC is routed to the registered plugin; the Recorder keeps the
    // trait's default handler, which reports operation-not-supported.
    assert_eq!(
        error_field(&reply, "error-tag").as_deref(),
        Some("operation-not-supported")
    );
}

#[tokio::test]
async fn test_create_subscription() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(dir.path());
    let (session_a, _rx_a) = session(&mut ctx);

    let reply = dispatch::process_rpc(
        &mut ctx,
        session_a,
        &rpc_doc("<create-subscription/>"),
    )
    .reply;
    assert!(reply_is_ok(&reply));
    assert!(ctx.sessions.get(session_a).unwrap().subscribed);

    let reply = dispatch::process_rpc(
        &mut ctx,
        session_a,
        &rpc_doc("<create-subscription><stream>OPER</stream></create-subscription>"),
    )
    .reply;
    assert_eq!(
        error_field(&reply, "error-tag").as_deref(),
        Some("invalid-value")
    );
}

#[tokio::test]
async fn test_reply_carries_message_id() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(dir.path());
    let (session_a, _rx_a) = session(&mut ctx);

    let reply =
        dispatch::process_rpc(&mut ctx, session_a, &rpc_doc("<get/>"))
            .reply;
    let root = reply.roots().next().unwrap();
    assert_eq!(root.attr("message-id"), Some("101"));
}
