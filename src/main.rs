//! RAX TAK Server - Entry Point
//!
//! A Rust Cursor-on-Target relay for TAK field clients.

use log::{error, info};

use rax_tak_server::utils::logging::setup_logging;
use rax_tak_server::{Server, ServerConfig};

#[tokio::main]
async fn main() {
    setup_logging();

    info!("Launching TAK server...");

    let config = match ServerConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let server = match Server::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            error!("Server startup failed: {}", e);
            std::process::exit(1);
        }
    };

    server.start().await;
}
