use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;

use crate::client::{ClientRegistry, handle_client};
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::server::tls::build_acceptor;
use crate::server::watchdog::IdleWatchdog;

pub struct Server {
    listener: TcpListener,
    tls_acceptor: Option<TlsAcceptor>,
    client_registry: Arc<ClientRegistry>,
    config: Arc<ServerConfig>,
}

impl Server {
    /// Binds the listen socket and loads TLS material. Either failure is
    /// fatal for the whole process.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let socket = config.listen_socket();

        let tls_acceptor = if config.tls.enabled {
            Some(build_acceptor(&config.tls)?)
        } else {
            warn!("TLS disabled: serving plain TCP");
            None
        };

        let listener = TcpListener::bind(socket.as_str())
            .await
            .map_err(|source| ServerError::Bind {
                addr: socket.clone(),
                source,
            })?;
        info!("Server bound to {}", listener.local_addr()?);

        Ok(Self {
            listener,
            tls_acceptor,
            client_registry: Arc::new(ClientRegistry::new(config.max_clients)),
            config: Arc::new(config),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> Arc<ClientRegistry> {
        Arc::clone(&self.client_registry)
    }

    /// Runs the idle watchdog and the accept loop until the process exits.
    pub async fn start(self) {
        info!(
            "Starting RAX TAK server on {} (max {} clients)",
            self.config.listen_socket(),
            self.config.max_clients
        );

        let watchdog = IdleWatchdog::new(
            Arc::clone(&self.client_registry),
            self.config.watchdog_interval(),
            self.config.idle_timeout(),
        );
        tokio::spawn(watchdog.run());

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => self.handle_accept(stream, addr).await,
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                }
            }
        }
    }

    async fn handle_accept(&self, stream: TcpStream, addr: SocketAddr) {
        if self.client_registry.is_full().await {
            warn!(
                "Rejecting connection from {}: server at capacity ({} clients)",
                addr, self.config.max_clients
            );
            drop(stream);
            return;
        }

        let client_registry = Arc::clone(&self.client_registry);
        let config = Arc::clone(&self.config);
        let tls_acceptor = self.tls_acceptor.clone();

        // Spawn a task for each client so accept loop doesn't block
        tokio::spawn(async move {
            match tls_acceptor {
                Some(acceptor) => {
                    match timeout(config.handshake_timeout(), acceptor.accept(stream)).await {
                        Ok(Ok(tls_stream)) => {
                            handle_client(tls_stream, addr, client_registry, config).await;
                        }
                        Ok(Err(e)) => warn!("TLS handshake with {} failed: {}", addr, e),
                        Err(_) => warn!("TLS handshake with {} timed out", addr),
                    }
                }
                None => handle_client(stream, addr, client_registry, config).await,
            }
        });
    }
}
