//
// Copyright (c) The Nacre Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Client sessions.
//!
//! Transport tasks communicate with the core task through request structs
//! carrying oneshot responders. The session registry tracks the per-session
//! state the core needs: the notification channel, the subscription flag
//! and the authenticated identity.

use std::collections::BTreeMap;

use nacre_datastore::ConfigTree;
use nacre_utils::Responder;
use tokio::sync::mpsc::UnboundedSender;

// Transport -> core requests.
#[derive(Debug)]
pub enum CoreRequest {
    // A new authenticated session arrived.
    Attach(AttachRequest),
    // A parsed <rpc> document from an attached session.
    Rpc(RpcRequest),
    // The session's connection went away.
    Detach(DetachRequest),
}

#[derive(Debug)]
pub struct AttachRequest {
    pub username: Option<String>,
    pub tx: UnboundedSender<SessionMsg>,
    pub responder: Option<Responder<u32>>,
}

#[derive(Debug)]
pub struct RpcRequest {
    pub session_id: u32,
    pub document: ConfigTree,
    pub responder: Option<Responder<ConfigTree>>,
}

#[derive(Debug)]
pub struct DetachRequest {
    pub session_id: u32,
}

// Core -> transport messages.
#[derive(Debug)]
pub enum SessionMsg {
    // An event notification to be framed and written out.
    Notification(ConfigTree),
    // The session was closed or killed by the core.
    Close,
}

/// Core-side record of an attached session.
#[derive(Debug)]
pub struct Session {
    pub id: u32,
    pub username: Option<String>,
    pub subscribed: bool,
    pub tx: UnboundedSender<SessionMsg>,
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: BTreeMap<u32, Session>,
    next_id: u32,
}

// ===== impl SessionRegistry =====

impl SessionRegistry {
    pub fn register(
        &mut self,
        username: Option<String>,
        tx: UnboundedSender<SessionMsg>,
    ) -> u32 {
        self.next_id += 1;
        let id = self.next_id;
        self.sessions.insert(
            id,
            Session {
                id,
                username,
                subscribed: false,
                tx,
            },
        );
        id
    }

    pub fn get(&self, id: u32) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    pub fn remove(&mut self, id: u32) -> Option<Session> {
        self.sessions.remove(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    /// Sessions that issued `create-subscription`.
    pub fn subscribers(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values().filter(|session| session.subscribed)
    }
}
