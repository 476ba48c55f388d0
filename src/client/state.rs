//! Module `client`
//!
//! Defines the `Client` struct: one connected device, its identity, its
//! activity clock and the write half of its transport.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::time::{Instant, timeout};

use crate::error::ClientError;

/// Write half of any transport a client can be served over.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Who a connection claims to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub username: Option<String>,
    pub callsign: Option<String>,
    pub group: Option<String>,
}

/// Represents a connected TAK client.
///
/// Identity fields are only changed by the connection's own worker. The
/// transport may be closed from anywhere; closing is idempotent.
pub struct Client {
    remote_addr: SocketAddr,
    identity: RwLock<Identity>,
    last_activity: Mutex<Instant>,
    writer: Mutex<Option<BoxedWriter>>,
    write_timeout: Duration,
    closed: AtomicBool,
    close_signal: Notify,
}

impl Client {
    /// Creates a client with a generated anonymous id.
    pub fn new(remote_addr: SocketAddr, writer: BoxedWriter, write_timeout: Duration) -> Self {
        Self {
            remote_addr,
            identity: RwLock::new(Identity {
                id: anonymous_id(&remote_addr),
                username: None,
                callsign: None,
                group: None,
            }),
            last_activity: Mutex::new(Instant::now()),
            writer: Mutex::new(Some(writer)),
            write_timeout,
            closed: AtomicBool::new(false),
            close_signal: Notify::new(),
        }
    }

    // --------------------
    // Identity
    // --------------------

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub async fn id(&self) -> String {
        self.identity.read().await.id.clone()
    }

    pub async fn identity(&self) -> Identity {
        self.identity.read().await.clone()
    }

    /// Records a successful login. An empty uid keeps the current id.
    pub async fn authenticate(&self, uid: &str, username: &str) {
        let mut identity = self.identity.write().await;
        if !uid.is_empty() {
            identity.id = uid.to_string();
        }
        identity.username = Some(username.to_string());
    }

    /// Binds callsign, group and uid from an identity announcement.
    pub async fn adopt_identity(
        &self,
        uid: Option<&str>,
        callsign: Option<&str>,
        group: Option<&str>,
    ) {
        let mut identity = self.identity.write().await;
        identity.callsign = callsign.map(str::to_string);
        identity.group = group.map(str::to_string);
        if let Some(uid) = uid {
            identity.id = uid.to_string();
        }
    }

    #[cfg(test)]
    pub(crate) async fn set_id(&self, id: &str) {
        self.identity.write().await.id = id.to_string();
    }

    // --------------------
    // Activity
    // --------------------

    /// Marks the client active now.
    pub async fn touch(&self) {
        *self.last_activity.lock().await = Instant::now();
    }

    /// Time since the last successful read, as of `now`.
    pub async fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(*self.last_activity.lock().await)
    }

    // --------------------
    // Transport
    // --------------------

    /// Writes one whole message, bounded by the write timeout.
    ///
    /// Writes to the same client are serialized, so concurrent senders never
    /// interleave bytes.
    pub async fn send(&self, data: &[u8]) -> Result<(), ClientError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(ClientError::Closed)?;

        let write = async {
            writer.write_all(data).await?;
            writer.flush().await?;
            Ok::<(), std::io::Error>(())
        };

        match timeout(self.write_timeout, write).await {
            Ok(result) => result.map_err(ClientError::from),
            Err(_) => Err(ClientError::WriteTimeout(self.write_timeout)),
        }
    }

    /// Closes the transport. Safe to call any number of times from any task.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.close_signal.notify_one();

        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            // Peer may already be gone; shutdown errors carry no information.
            let _ = timeout(self.write_timeout, writer.shutdown()).await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Resolves once `close` has been called.
    pub async fn closed(&self) {
        if self.is_closed() {
            return;
        }
        self.close_signal.notified().await;
    }
}

impl fmt::Display for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.remote_addr)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("remote_addr", &self.remote_addr)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// `__ANONYMOUS-<12 hex chars>-<peer ip>`
fn anonymous_id(remote_addr: &SocketAddr) -> String {
    let bytes: [u8; 6] = rand::random();
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!("__ANONYMOUS-{}-{}", hex, remote_addr.ip())
}
