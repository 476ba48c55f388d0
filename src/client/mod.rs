//! Client management system
//!
//! Handles client connections, the shared registry, and session lifecycle.

pub mod handler;
pub mod registry;
pub mod state;

pub use handler::handle_client;
pub use registry::ClientRegistry;
pub use state::{BoxedWriter, Client, Identity};
