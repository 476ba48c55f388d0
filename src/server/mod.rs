//! Server core functionality
//!
//! This module contains the accept loop, the idle watchdog, and TLS
//! transport setup.

pub mod core;
pub mod tls;
pub mod watchdog;

pub use core::Server;
pub use watchdog::IdleWatchdog;
