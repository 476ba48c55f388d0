//! Client registry
//!
//! The one piece of state shared by every connection worker and the
//! watchdog. All access goes through a single mutex; callers only ever see
//! clones of the member handles.

use log::info;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::client::Client;
use crate::error::{DisconnectReason, RegistryError};

/// Registry for tracking connected clients
///
/// Ids are not required to be unique. Lookups return the earliest
/// registered match.
pub struct ClientRegistry {
    clients: Mutex<Vec<Arc<Client>>>,
    max_clients: usize,
}

impl ClientRegistry {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: Mutex::new(Vec::new()),
            max_clients,
        }
    }

    pub fn max_clients(&self) -> usize {
        self.max_clients
    }

    /// Admits a new client if there is room. `make` only runs when the
    /// capacity check passes, under the same lock as the insert.
    pub async fn insert_with<F>(&self, make: F) -> Result<Arc<Client>, RegistryError>
    where
        F: FnOnce() -> Client,
    {
        let mut clients = self.clients.lock().await;
        if clients.len() >= self.max_clients {
            return Err(RegistryError::AtCapacity {
                max: self.max_clients,
            });
        }

        let client = Arc::new(make());
        clients.push(Arc::clone(&client));
        Ok(client)
    }

    /// Removes this exact client. Returns false if it was already gone.
    pub async fn remove(&self, client: &Arc<Client>) -> bool {
        let mut clients = self.clients.lock().await;
        let before = clients.len();
        clients.retain(|member| !Arc::ptr_eq(member, client));
        clients.len() != before
    }

    /// First registered client whose id equals `id`.
    pub async fn find_by_id(&self, id: &str) -> Option<Arc<Client>> {
        let clients = self.clients.lock().await;
        for client in clients.iter() {
            if client.id().await == id {
                return Some(Arc::clone(client));
            }
        }
        None
    }

    /// Point-in-time copy of the membership.
    pub async fn snapshot(&self) -> Vec<Arc<Client>> {
        self.clients.lock().await.clone()
    }

    pub async fn contains(&self, client: &Arc<Client>) -> bool {
        self.clients
            .lock()
            .await
            .iter()
            .any(|member| Arc::ptr_eq(member, client))
    }

    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn is_full(&self) -> bool {
        self.len().await >= self.max_clients
    }

    /// Removes `client` and closes its transport.
    pub async fn disconnect(&self, client: &Arc<Client>, reason: &DisconnectReason) {
        let removed = self.remove(client).await;
        client.close().await;
        if removed {
            info!(
                "Client {} ({}) disconnected: {} ({}/{} clients)",
                client,
                client.id().await,
                reason,
                self.len().await,
                self.max_clients
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::io::duplex;

    fn make_client(port: u16) -> Client {
        let (server, _peer) = duplex(64);
        let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
        Client::new(addr, Box::new(server), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn capacity_is_never_exceeded() {
        let registry = ClientRegistry::new(2);
        registry.insert_with(|| make_client(1)).await.unwrap();
        registry.insert_with(|| make_client(2)).await.unwrap();

        let mut constructed = false;
        let result = registry
            .insert_with(|| {
                constructed = true;
                make_client(3)
            })
            .await;

        assert!(matches!(result, Err(RegistryError::AtCapacity { max: 2 })));
        assert!(!constructed);
        assert_eq!(registry.len().await, 2);
        assert!(registry.is_full().await);
    }

    #[tokio::test]
    async fn remove_is_by_identity_of_handle() {
        let registry = ClientRegistry::new(4);
        let a = registry.insert_with(|| make_client(1)).await.unwrap();
        let b = registry.insert_with(|| make_client(2)).await.unwrap();

        assert!(registry.remove(&a).await);
        assert!(!registry.remove(&a).await);
        assert!(!registry.contains(&a).await);
        assert!(registry.contains(&b).await);

        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert!(Arc::ptr_eq(&snapshot[0], &b));
    }

    #[tokio::test]
    async fn find_by_id_returns_first_match() {
        let registry = ClientRegistry::new(4);
        let first = registry.insert_with(|| make_client(1)).await.unwrap();
        let second = registry.insert_with(|| make_client(2)).await.unwrap();
        first.set_id("SHARED").await;
        second.set_id("SHARED").await;

        let found = registry.find_by_id("SHARED").await.unwrap();
        assert!(Arc::ptr_eq(&found, &first));
        assert!(registry.find_by_id("MISSING").await.is_none());
    }

    #[tokio::test]
    async fn snapshot_is_detached_from_later_changes() {
        let registry = ClientRegistry::new(4);
        let a = registry.insert_with(|| make_client(1)).await.unwrap();
        let snapshot = registry.snapshot().await;

        registry.remove(&a).await;
        assert_eq!(snapshot.len(), 1);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn disconnect_removes_and_closes() {
        let registry = ClientRegistry::new(4);
        let a = registry.insert_with(|| make_client(1)).await.unwrap();

        registry.disconnect(&a, &DisconnectReason::EndOfStream).await;
        registry.disconnect(&a, &DisconnectReason::Closed).await;

        assert!(a.is_closed());
        assert!(registry.is_empty().await);
    }
}
