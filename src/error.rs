//! Error types for the cache node
//!
//! Provides unified error handling using thiserror. Each layer has its own
//! enum so the server can decide what becomes a response status, what closes
//! a connection, and what is only logged.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::protocol::Status;

// == Cache Error Enum ==
/// Errors returned by the cache store.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key not found in cache
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Key has expired
    #[error("Key expired: {0}")]
    Expired(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl CacheError {
    /// Wire status reported to the client for this error.
    pub fn status(&self) -> Status {
        match self {
            CacheError::NotFound(_) | CacheError::Expired(_) => Status::NotFound,
            CacheError::InvalidRequest(_) => Status::Error,
        }
    }
}

// == Protocol Error Enum ==
/// Framing failures. Any of these closes the connection it occurred on.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// First byte of a frame is not a known tag
    #[error("Invalid frame tag: {0:#04x}")]
    InvalidTag(u8),

    /// Declared frame length exceeds the configured maximum
    #[error("Frame of {len} bytes exceeds maximum of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },

    /// A field does not fit its length prefix
    #[error("Field `{field}` of {len} bytes does not fit its length prefix")]
    FieldTooLong { field: &'static str, len: usize },

    /// Response body is not a valid record
    #[error("Malformed response record: {0}")]
    MalformedResponse(#[from] serde_json::Error),
}

// == Forward Error Enum ==
/// Failures delivering a forwarded Set to a member.
#[derive(Error, Debug)]
pub enum ForwardError {
    /// The member's connection is gone
    #[error("Peer link closed")]
    LinkClosed,

    /// The member did not acknowledge in time
    #[error("Peer did not respond within {0:?}")]
    Timeout(Duration),

    /// The member answered with a non-OK status
    #[error("Peer rejected forwarded write with status {0:?}")]
    Rejected(Status),
}

// == Server Error Enum ==
/// Errors surfaced to whoever starts the server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Listener cannot be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Joining a seed node failed
    #[error("Failed to join {addr}: {reason}")]
    Join { addr: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

// == Client Error Enum ==
/// Errors returned by [`crate::client::Client`].
#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Server closed the connection before answering
    #[error("Connection closed by server")]
    ConnectionClosed,

    /// Server sent a frame that is not valid at this point
    #[error("Unexpected frame: {0}")]
    UnexpectedFrame(String),

    /// Server did not answer in time
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Server answered with an error status
    #[error("Server returned status {0:?}")]
    Status(Status),
}

// == Result Type Alias ==
/// Convenience Result type for store operations.
pub type Result<T> = std::result::Result<T, CacheError>;
