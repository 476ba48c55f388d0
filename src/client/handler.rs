use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

use crate::client::{Client, ClientRegistry};
use crate::config::ServerConfig;
use crate::error::{DisconnectReason, ParseError};
use crate::protocol::{Message, MessageFramer, MessageStatus, handle_message};

/// Handles one TAK client connection for its whole lifetime.
///
/// - Admits the client into `registry`, or drops the stream if full.
/// - Reads chunks, frames them into messages and dispatches each in order.
/// - Tears down (registry removal and transport close) on every exit path.
pub async fn handle_client<S>(
    stream: S,
    remote_addr: SocketAddr,
    registry: Arc<ClientRegistry>,
    config: Arc<ServerConfig>,
) where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (mut reader, writer) = tokio::io::split(stream);
    let write_timeout = config.write_timeout();

    let client = match registry
        .insert_with(|| Client::new(remote_addr, Box::new(writer), write_timeout))
        .await
    {
        Ok(client) => client,
        Err(e) => {
            warn!("Rejecting connection from {}: {}", remote_addr, e);
            return;
        }
    };

    info!(
        "Client {} connected as {} ({}/{} clients)",
        remote_addr,
        client.id().await,
        registry.len().await,
        registry.max_clients()
    );

    let guard = SessionGuard::new(Arc::clone(&client), Arc::clone(&registry));
    let mut framer = MessageFramer::new(config.max_frame_bytes);
    let mut buf = vec![0u8; config.read_buffer_size];

    let reason = 'session: loop {
        if client.is_closed() {
            break DisconnectReason::Closed;
        }

        let n = tokio::select! {
            result = reader.read(&mut buf) => match result {
                Ok(0) => break DisconnectReason::EndOfStream,
                Ok(n) => n,
                Err(e) => break DisconnectReason::ReadFailed(e.to_string()),
            },
            _ = client.closed() => break DisconnectReason::Closed,
        };

        client.touch().await;

        let frames = match framer.feed(&buf[..n]) {
            Ok(frames) => frames,
            Err(e) => {
                warn!("Client {}: {}", remote_addr, e);
                break DisconnectReason::FrameOverflow;
            }
        };

        for frame in frames {
            // A write failure or eviction during this batch tears the client down.
            if client.is_closed() {
                break 'session DisconnectReason::Closed;
            }
            if let Some(reason) = handle_frame(&client, &frame, &registry).await {
                break 'session reason;
            }
        }
    };

    guard.release(reason).await;
}

/// Parses and routes one framed message. `Some(reason)` ends the session.
///
/// Malformed XML is discarded; an unknown root tag is a protocol violation.
async fn handle_frame(
    client: &Arc<Client>,
    frame: &str,
    registry: &ClientRegistry,
) -> Option<DisconnectReason> {
    let message = match Message::parse(frame) {
        Ok(message) => message,
        Err(ParseError::UnknownMessageType(tag)) => {
            error!("Client {} sent unknown message type <{}>", client, tag);
            return Some(DisconnectReason::ProtocolViolation(format!(
                "unknown message type <{tag}>"
            )));
        }
        Err(e) => {
            warn!("Discarding message from {}: {}", client, e);
            return None;
        }
    };

    debug!("RECV: {} -> <{}>", client, message.name());

    match handle_message(client, &message, registry).await {
        MessageStatus::Continue => None,
        MessageStatus::CloseConnection(reason) => Some(reason),
    }
}

/// Scoped ownership of a registered client.
///
/// `release` tears the session down with a reason. If the guard is dropped
/// without release (panic, task cancellation), the same teardown is spawned.
struct SessionGuard {
    client: Arc<Client>,
    registry: Arc<ClientRegistry>,
    released: bool,
}

impl SessionGuard {
    fn new(client: Arc<Client>, registry: Arc<ClientRegistry>) -> Self {
        Self {
            client,
            registry,
            released: false,
        }
    }

    async fn release(mut self, reason: DisconnectReason) {
        self.released = true;
        self.registry.disconnect(&self.client, &reason).await;
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let client = Arc::clone(&self.client);
        let registry = Arc::clone(&self.registry);
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                registry.disconnect(&client, &DisconnectReason::Closed).await;
            });
        }
    }
}
