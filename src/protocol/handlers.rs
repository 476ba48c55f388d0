//! Message handlers module for the RAX TAK server.
//!
//! Routes each classified message: authentication, identity adoption,
//! heartbeat replies, targeted (Marti) delivery and broadcast.

use chrono::Utc;
use futures::future::join_all;
use log::{debug, error, info, warn};
use std::sync::Arc;

use crate::auth;
use crate::client::{Client, ClientRegistry};
use crate::error::DisconnectReason;
use crate::protocol::builder::MessageBuilder;
use crate::protocol::message::{Credentials, EventInfo, Message, MessageKind};

/// Represents the outcome of handling one message.
#[derive(Debug, PartialEq, Eq)]
pub enum MessageStatus {
    Continue,
    CloseConnection(DisconnectReason),
}

/// Dispatches a received message to its corresponding handler.
///
/// # Arguments
///
/// * `client` - The connection the message arrived on.
/// * `message` - The parsed and classified message.
/// * `registry` - Shared registry used for lookups and fan-out.
///
/// # Returns
///
/// * `MessageStatus` - Whether the sender's connection should stay open.
pub async fn handle_message(
    client: &Arc<Client>,
    message: &Message,
    registry: &ClientRegistry,
) -> MessageStatus {
    match message.kind() {
        MessageKind::Auth(credentials) => handle_auth(client, credentials).await,
        MessageKind::Event(event) => {
            handle_event(client, message, event, registry).await;
            MessageStatus::Continue
        }
    }
}

/// Checks credentials; a mismatch closes the connection without a reply.
async fn handle_auth(client: &Arc<Client>, credentials: &Credentials) -> MessageStatus {
    match auth::validate_credentials(&credentials.username, &credentials.password) {
        Ok(()) => {
            client
                .authenticate(&credentials.uid, &credentials.username)
                .await;
            info!(
                "AUTH: client {} logged in as {} (uid {})",
                client,
                credentials.username,
                client.id().await
            );
            MessageStatus::Continue
        }
        Err(e) => {
            warn!("AUTH: client {} rejected: {}", client, e);
            MessageStatus::CloseConnection(DisconnectReason::AuthFailed)
        }
    }
}

async fn handle_event(
    client: &Arc<Client>,
    message: &Message,
    event: &EventInfo,
    registry: &ClientRegistry,
) {
    if let Some(announcement) = &event.announcement {
        client
            .adopt_identity(
                announcement.uid.as_deref(),
                announcement.callsign.as_deref(),
                announcement.group.as_deref(),
            )
            .await;
        info!(
            "IDENT: client {} is {} (callsign {:?}, group {:?})",
            client,
            client.id().await,
            announcement.callsign,
            announcement.group
        );
    }

    if event.is_ping {
        handle_ping(client, registry).await;
    } else if !event.targets.is_empty() {
        send_to_targets(client, message, &event.targets, registry).await;
    } else {
        broadcast(client, message, registry).await;
    }
}

/// Answers a heartbeat on the same connection. Pings are never forwarded.
async fn handle_ping(client: &Arc<Client>, registry: &ClientRegistry) {
    debug!("PING: from {}", client);

    let pong = match MessageBuilder::pong(Utc::now()).to_xml() {
        Ok(xml) => xml,
        Err(e) => {
            error!("Failed to build heartbeat reply: {}", e);
            return;
        }
    };

    if deliver(registry, client, pong.as_bytes()).await {
        debug!("PONG: to {}", client);
    }
}

/// Delivers to each named uid that is currently registered. Unknown uids
/// are skipped without falling back to broadcast.
async fn send_to_targets(
    sender: &Arc<Client>,
    message: &Message,
    targets: &[String],
    registry: &ClientRegistry,
) {
    let data = message.to_xml().as_bytes();

    for uid in targets {
        match registry.find_by_id(uid).await {
            Some(target) => {
                info!("SEND: MARTI {} ({}) <- message from {}", target, uid, sender);
                deliver(registry, &target, data).await;
            }
            None => debug!("SEND: MARTI no client with uid {}, skipping", uid),
        }
    }
}

/// Sends to every registered client except the sender.
async fn broadcast(sender: &Arc<Client>, message: &Message, registry: &ClientRegistry) {
    let data = message.to_xml().as_bytes();
    let recipients: Vec<Arc<Client>> = registry
        .snapshot()
        .await
        .into_iter()
        .filter(|member| !Arc::ptr_eq(member, sender))
        .collect();

    debug!(
        "BROADCAST: from {} to {} clients",
        sender,
        recipients.len()
    );

    join_all(
        recipients
            .iter()
            .map(|recipient| deliver(registry, recipient, data)),
    )
    .await;
}

/// Writes to `target`; a failed or timed-out write disconnects the target only.
async fn deliver(registry: &ClientRegistry, target: &Arc<Client>, data: &[u8]) -> bool {
    match target.send(data).await {
        Ok(()) => true,
        Err(e) => {
            warn!("Write to client {} failed: {}", target, e);
            registry
                .disconnect(target, &DisconnectReason::WriteFailed(e.to_string()))
                .await;
            false
        }
    }
}
