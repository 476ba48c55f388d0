//! Error handling
//!
//! Defines error types and disconnect reasons for the relay.

pub mod types;

pub use types::*;
