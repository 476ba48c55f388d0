//! Cursor-on-Target protocol implementation
//!
//! Handles stream framing, message parsing and classification, message
//! construction, and routing.

pub mod builder;
pub mod framer;
pub mod handlers;
pub mod message;
pub mod xml;

pub use builder::{MessageBuilder, Point};
pub use framer::MessageFramer;
pub use handlers::{MessageStatus, handle_message};
pub use message::{Message, MessageKind};
