//! Peer Client
//!
//! Delivers one forwarded Set to one member and checks its acknowledgement.

use std::time::Duration;

use bytes::Bytes;

use crate::cluster::Member;
use crate::error::ForwardError;
use crate::protocol::Command;
use crate::server::ConnectionLink;

#[derive(Debug, Clone)]
pub struct PeerClient {
    link: ConnectionLink,
    timeout: Duration,
}

impl PeerClient {
    /// # Arguments
    /// * `member` - Target peer
    /// * `timeout` - Upper bound for sending and awaiting the acknowledgement
    pub fn new(member: &Member, timeout: Duration) -> Self {
        Self {
            link: member.link().clone(),
            timeout,
        }
    }

    /// Writes a Set to the peer and waits for exactly one Response.
    ///
    /// A non-OK status, a closed link or a timeout are all errors.
    pub async fn set(&self, key: Bytes, value: Bytes, ttl: Duration) -> Result<(), ForwardError> {
        let response = self
            .link
            .request(Command::Set { key, value, ttl }, self.timeout)
            .await?;

        if !response.is_ok() {
            return Err(ForwardError::Rejected(response.status));
        }
        Ok(())
    }
}
