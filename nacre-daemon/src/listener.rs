//
// Copyright (c) The Nacre Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Server socket and session transport.
//!
//! One listening endpoint of family UNIX, IPv4 or IPv6. Each accepted
//! connection becomes a session task that frames NETCONF messages
//! (RFC 6242 end-of-message delimited), parses them with the XML codec
//! and relays the documents to the core loop. UNIX clients authenticate
//! by group ownership of the socket path.

use std::net::{IpAddr, SocketAddr};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use nacre_datastore::{ConfigTree, xml};
use nacre_northbound::netconf::{self, NETCONF_NS, RpcError};
use nacre_utils::task::Task;
use nix::unistd::Group;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::mpsc::{Sender, UnboundedReceiver, error::TryRecvError};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::{Config, SocketFamily};
use crate::core::session::{
    AttachRequest, CoreRequest, DetachRequest, RpcRequest, SessionMsg,
};

// RFC 6242 end-of-message delimiter.
const EOM: &[u8] = b"]]>]]>";

// Default NETCONF-over-TCP port.
const DFLT_PORT: u16 = 830;

// Capabilities advertised in the server hello.
const CAPABILITIES: &[&str] = &[
    "urn:ietf:params:netconf:base:1.0",
    "urn:ietf:params:netconf:capability:candidate:1.0",
    "urn:ietf:params:netconf:capability:confirmed-commit:1.1",
    "urn:ietf:params:netconf:capability:validate:1.1",
    "urn:ietf:params:netconf:capability:startup:1.0",
    "urn:ietf:params:netconf:capability:notification:1.0",
];

// ===== global functions =====

/// Binds the server socket and spawns the accept loop.
pub async fn start(
    config: &Config,
    request_tx: Sender<CoreRequest>,
) -> std::io::Result<Task<()>> {
    match config.socket_family {
        SocketFamily::Unix => {
            let path = PathBuf::from(&config.socket_address);
            // A previous instance may have left the socket behind.
            let _ = std::fs::remove_file(&path);
            let listener = UnixListener::bind(&path)?;
            restrict_socket(&path, &config.socket_group);
            info!(path = %path.display(), "listening on UNIX socket");
            Ok(Task::spawn(accept_unix(listener, request_tx)))
        }
        SocketFamily::Ipv4 | SocketFamily::Ipv6 => {
            let address = parse_address(&config.socket_address)?;
            let listener = TcpListener::bind(address).await?;
            info!(%address, "listening on TCP socket");
            Ok(Task::spawn(accept_tcp(listener, request_tx)))
        }
    }
}

// ===== helper functions =====

// UNIX clients authenticate by group membership: the socket is owned by
// the configured group and closed to everyone else.
fn restrict_socket(path: &Path, group: &str) {
    match Group::from_name(group) {
        Ok(Some(group)) => {
            if let Err(error) =
                nix::unistd::chown(path, None, Some(group.gid))
            {
                warn!(%error, "failed to change socket group ownership");
            }
            let permissions = std::fs::Permissions::from_mode(0o770);
            if let Err(error) = std::fs::set_permissions(path, permissions)
            {
                warn!(%error, "failed to restrict socket permissions");
            }
        }
        Ok(None) => {
            warn!(%group, "socket group does not exist");
        }
        Err(error) => {
            warn!(%error, %group, "failed to look up socket group");
        }
    }
}

fn parse_address(address: &str) -> std::io::Result<SocketAddr> {
    if let Ok(address) = address.parse::<SocketAddr>() {
        return Ok(address);
    }
    address
        .parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, DFLT_PORT))
        .map_err(|error| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, error)
        })
}

async fn accept_unix(
    listener: UnixListener,
    request_tx: Sender<CoreRequest>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                tokio::spawn(session_task(stream, request_tx.clone()));
            }
            Err(error) => {
                warn!(%error, "failed to accept connection");
            }
        }
    }
}

async fn accept_tcp(listener: TcpListener, request_tx: Sender<CoreRequest>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!(%peer, "accepted connection");
                tokio::spawn(session_task(stream, request_tx.clone()));
            }
            Err(error) => {
                warn!(%error, "failed to accept connection");
            }
        }
    }
}

// Per-connection session task: attaches to the core, exchanges hellos and
// relays framed documents until the peer goes away or the core closes the
// session.
async fn session_task<S>(stream: S, request_tx: Sender<CoreRequest>)
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(stream);

    // Attach to the core loop.
    let (msg_tx, mut msg_rx) = mpsc::unbounded_channel();
    let (responder_tx, responder_rx) = oneshot::channel();
    if request_tx
        .send(CoreRequest::Attach(AttachRequest {
            username: None,
            tx: msg_tx,
            responder: Some(responder_tx),
        }))
        .await
        .is_err()
    {
        return;
    }
    let Ok(session_id) = responder_rx.await else {
        return;
    };

    // Server hello.
    if write_frame(&mut writer, &hello_document(session_id))
        .await
        .is_err()
    {
        return;
    }

    let mut buffer = Vec::new();
    loop {
        tokio::select! {
            frame = read_frame(&mut reader, &mut buffer) => {
                match frame {
                    Ok(Some(data)) => {
                        if !process_frame(
                            &data,
                            session_id,
                            &request_tx,
                            &mut msg_rx,
                            &mut writer,
                        )
                        .await
                        {
                            break;
                        }
                    }
                    Ok(None) | Err(_) => break,
                }
            }
            Some(msg) = msg_rx.recv() => {
                match msg {
                    SessionMsg::Notification(notification) => {
                        if write_frame(&mut writer, &notification)
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    SessionMsg::Close => break,
                }
            }
        }
    }

    let _ = request_tx
        .send(CoreRequest::Detach(DetachRequest { session_id }))
        .await;
}

// Handles one inbound frame. Returns false when the session should end.
async fn process_frame<W>(
    data: &[u8],
    session_id: u32,
    request_tx: &Sender<CoreRequest>,
    msg_rx: &mut UnboundedReceiver<SessionMsg>,
    writer: &mut W,
) -> bool
where
    W: AsyncWrite + Unpin,
{
    let document = match xml::parse(data) {
        Ok(document) => document,
        Err(error) => {
            let reply = netconf::rpc_reply_error(
                None,
                &[RpcError::malformed_message(&error.to_string())],
            );
            return write_frame(writer, &reply).await.is_ok();
        }
    };

    // The client hello needs no reply.
    if document
        .roots()
        .next()
        .is_some_and(|root| root.name() == "hello")
    {
        return true;
    }

    let (responder_tx, responder_rx) = oneshot::channel();
    if request_tx
        .send(CoreRequest::Rpc(RpcRequest {
            session_id,
            document,
            responder: Some(responder_tx),
        }))
        .await
        .is_err()
    {
        return false;
    }
    let Ok(reply) = responder_rx.await else {
        return false;
    };

    // Notifications emitted while the request was processed are written
    // before the rpc-reply.
    let mut closed = false;
    loop {
        match msg_rx.try_recv() {
            Ok(SessionMsg::Notification(notification)) => {
                if write_frame(writer, &notification).await.is_err() {
                    return false;
                }
            }
            Ok(SessionMsg::Close) => {
                closed = true;
                break;
            }
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
        }
    }

    if write_frame(writer, &reply).await.is_err() {
        return false;
    }
    !closed
}

async fn read_frame<R>(
    reader: &mut R,
    buffer: &mut Vec<u8>,
) -> std::io::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    loop {
        if let Some(pos) = find_delimiter(buffer) {
            let frame = buffer[..pos].to_vec();
            buffer.drain(..pos + EOM.len());
            return Ok(Some(frame));
        }

        let mut chunk = [0u8; 4096];
        let count = reader.read(&mut chunk).await?;
        if count == 0 {
            return Ok(None);
        }
        buffer.extend_from_slice(&chunk[..count]);
    }
}

async fn write_frame<W>(
    writer: &mut W,
    document: &ConfigTree,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let data = xml::serialize(document, false).map_err(|error| {
        std::io::Error::other(error.to_string())
    })?;
    writer.write_all(&data).await?;
    writer.write_all(b"\n").await?;
    writer.write_all(EOM).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

fn find_delimiter(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(EOM.len())
        .position(|window| window == EOM)
}

fn hello_document(session_id: u32) -> ConfigTree {
    let mut hello = ConfigTree::new();
    let root = hello.add(None, "hello");
    hello.set_namespace(root, NETCONF_NS);
    let capabilities = hello.add(Some(root), "capabilities");
    for capability in CAPABILITIES {
        hello.add_leaf(Some(capabilities), "capability", capability);
    }
    hello.add_leaf(Some(root), "session-id", &session_id.to_string());
    hello
}
