//! Wire frame types
//!
//! Every frame starts with one tag byte. Commands flow from a client (or a
//! node forwarding a write) to a server; responses flow back. Tag `0` is
//! reserved and never valid.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

// == Tag ==
/// First byte of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Tag {
    Set = 1,
    Get = 2,
    Join = 3,
    Delete = 4,
    Response = 0x80,
}

impl TryFrom<u8> for Tag {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            1 => Ok(Tag::Set),
            2 => Ok(Tag::Get),
            3 => Ok(Tag::Join),
            4 => Ok(Tag::Delete),
            0x80 => Ok(Tag::Response),
            other => Err(ProtocolError::InvalidTag(other)),
        }
    }
}

// == Command ==
/// A request decoded from the wire.
///
/// TTLs travel as whole milliseconds; `Duration::ZERO` means no expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Set { key: Bytes, value: Bytes, ttl: Duration },
    Get { key: Bytes },
    Join,
    Delete { key: Bytes },
}

impl Command {
    pub fn tag(&self) -> Tag {
        match self {
            Command::Set { .. } => Tag::Set,
            Command::Get { .. } => Tag::Get,
            Command::Join => Tag::Join,
            Command::Delete { .. } => Tag::Delete,
        }
    }

    /// Short uppercase name used in log events.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Set { .. } => "SET",
            Command::Get { .. } => "GET",
            Command::Join => "JOIN",
            Command::Delete { .. } => "DEL",
        }
    }
}

// == Status ==
/// Outcome carried by every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ok,
    NotFound,
    Error,
}

// == Response ==
/// Self-describing reply record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<Bytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Bytes>,
    pub status: Status,
}

impl Response {
    /// Bare acknowledgement.
    pub fn ok() -> Self {
        Self {
            key: None,
            value: None,
            status: Status::Ok,
        }
    }

    /// Successful lookup.
    pub fn found(key: Bytes, value: Bytes) -> Self {
        Self {
            key: Some(key),
            value: Some(value),
            status: Status::Ok,
        }
    }

    /// Lookup miss; never carries a value.
    pub fn not_found(key: Bytes) -> Self {
        Self {
            key: Some(key),
            value: None,
            status: Status::NotFound,
        }
    }

    pub fn error() -> Self {
        Self {
            key: None,
            value: None,
            status: Status::Error,
        }
    }

    pub fn with_key(mut self, key: Bytes) -> Self {
        self.key = Some(key);
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }
}

// == Frame ==
/// Anything that can appear on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Command(Command),
    Response(Response),
}

impl From<Command> for Frame {
    fn from(command: Command) -> Self {
        Frame::Command(command)
    }
}

impl From<Response> for Frame {
    fn from(response: Response) -> Self {
        Frame::Response(response)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Command(command) => f.write_str(command.name()),
            Frame::Response(response) => write!(f, "RESPONSE({:?})", response.status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_values() {
        assert_eq!(Tag::Set as u8, 1);
        assert_eq!(Tag::Get as u8, 2);
        assert_eq!(Tag::Join as u8, 3);
        assert_eq!(Tag::Delete as u8, 4);
    }

    #[test]
    fn test_reserved_tag_rejected() {
        assert!(matches!(Tag::try_from(0), Err(ProtocolError::InvalidTag(0))));
        assert!(matches!(Tag::try_from(5), Err(ProtocolError::InvalidTag(5))));
        assert_eq!(Tag::try_from(0x80).unwrap(), Tag::Response);
    }

    #[test]
    fn test_response_serialize_omits_missing_fields() {
        let json = serde_json::to_string(&Response::ok()).unwrap();
        assert_eq!(json, r#"{"status":"ok"}"#);
    }

    #[test]
    fn test_response_not_found_has_no_value() {
        let resp = Response::not_found(Bytes::from_static(b"missing"));
        assert_eq!(resp.status, Status::NotFound);
        assert!(resp.value.is_none());
        assert!(!resp.is_ok());
    }
}
