//! Error types
//!
//! Defines domain-specific error types for each module of the TAK relay.

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

/// Failures turning a framed message into a classified `Message`.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Broken XML: unbalanced tags, bad attributes, bad escapes.
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// Well-formed XML whose root is neither `event` nor `auth`.
    #[error("Unknown message type: <{0}>")]
    UnknownMessageType(String),

    #[error("Empty message")]
    Empty,
}

impl From<quick_xml::Error> for ParseError {
    fn from(error: quick_xml::Error) -> Self {
        ParseError::Malformed(error.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for ParseError {
    fn from(error: quick_xml::events::attributes::AttrError) -> Self {
        ParseError::Malformed(error.to_string())
    }
}

/// Authentication module errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Invalid password for user: {0}")]
    InvalidPassword(String),

    #[error("Malformed input: {0}")]
    MalformedInput(String),
}

/// Errors raised while writing to a connected client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Client transport already closed")]
    Closed,

    #[error("Write timed out after {0:?}")]
    WriteTimeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Client registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Registry at capacity ({max} clients)")]
    AtCapacity { max: usize },
}

/// Stream framing errors
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Pending frame exceeds {limit} bytes without a closing tag")]
    Overflow { limit: usize },
}

/// Failures serializing an outgoing message.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("XML write failed: {0}")]
    Io(#[from] io::Error),

    #[error("Serialized message is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Process-level failures that stop the whole server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Why a connection was torn down. Carried into every teardown and logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    EndOfStream,
    ReadFailed(String),
    AuthFailed,
    ProtocolViolation(String),
    WriteFailed(String),
    IdleTimeout,
    FrameOverflow,
    /// Transport closed by another component (watchdog, failed delivery).
    Closed,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::EndOfStream => write!(f, "end of stream"),
            DisconnectReason::ReadFailed(e) => write!(f, "read failed: {}", e),
            DisconnectReason::AuthFailed => write!(f, "authentication failed"),
            DisconnectReason::ProtocolViolation(e) => write!(f, "protocol violation: {}", e),
            DisconnectReason::WriteFailed(e) => write!(f, "write failed: {}", e),
            DisconnectReason::IdleTimeout => write!(f, "idle timeout"),
            DisconnectReason::FrameOverflow => write!(f, "frame overflow"),
            DisconnectReason::Closed => write!(f, "transport closed"),
        }
    }
}

