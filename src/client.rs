//! Client
//!
//! A small async client for one cache node, speaking the binary frame
//! protocol over a single TCP connection. Requests are answered in order.
//!
//! A client that sends Join also receives forwarded Sets on the same
//! connection. Those are buffered while a request waits for its Response and
//! handed out by [`Client::recv_forwarded`]; each must be answered with
//! [`Client::acknowledge`] before the node's forward timeout, or the node
//! drops the client from its membership.
//!
//! A request that times out or hits a transport error leaves the stream in an
//! unknown position, so the connection is dropped and every later call fails
//! with [`ClientError::ConnectionClosed`].

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::Framed;

use crate::error::{ClientError, ProtocolError};
use crate::protocol::{Command, Frame, FrameCodec, Response, Status};

/// Default bound on one request/response exchange.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct Client {
    /// `None` once the connection can no longer be trusted
    framed: Option<Framed<TcpStream, FrameCodec>>,
    forwarded: VecDeque<Command>,
    timeout: Duration,
}

impl Client {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await.map_err(ProtocolError::from)?;
        stream.set_nodelay(true).map_err(ProtocolError::from)?;
        Ok(Self {
            framed: Some(Framed::new(stream, FrameCodec::default())),
            forwarded: VecDeque::new(),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether the connection is still usable.
    pub fn is_connected(&self) -> bool {
        self.framed.is_some()
    }

    /// Sends `command` and returns the node's Response, whatever its status.
    ///
    /// On timeout the answer may still arrive later; the connection is
    /// dropped rather than risk pairing it with the next request.
    pub async fn request(&mut self, command: Command) -> Result<Response, ClientError> {
        let timeout = self.timeout;
        let result = match tokio::time::timeout(timeout, self.exchange(command)).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout(timeout)),
        };
        if result.is_err() {
            self.framed = None;
        }
        result
    }

    async fn exchange(&mut self, command: Command) -> Result<Response, ClientError> {
        let framed = self.framed.as_mut().ok_or(ClientError::ConnectionClosed)?;
        framed.send(command.into()).await?;
        loop {
            match framed.next().await {
                Some(Ok(Frame::Response(response))) => return Ok(response),
                Some(Ok(Frame::Command(forwarded))) => self.forwarded.push_back(forwarded),
                Some(Err(err)) => return Err(err.into()),
                None => return Err(ClientError::ConnectionClosed),
            }
        }
    }

    /// Stores `value` under `key`. A zero `ttl` never expires.
    pub async fn set(
        &mut self,
        key: impl Into<Bytes>,
        value: impl Into<Bytes>,
        ttl: Duration,
    ) -> Result<(), ClientError> {
        let command = Command::Set {
            key: key.into(),
            value: value.into(),
            ttl,
        };
        expect_ok(self.request(command).await?)
    }

    /// Returns the value for `key`, or `None` if it is missing or expired.
    pub async fn get(&mut self, key: impl Into<Bytes>) -> Result<Option<Bytes>, ClientError> {
        let response = self.request(Command::Get { key: key.into() }).await?;
        match response.status {
            Status::Ok => Ok(Some(response.value.unwrap_or_default())),
            Status::NotFound => Ok(None),
            status => Err(ClientError::Status(status)),
        }
    }

    pub async fn delete(&mut self, key: impl Into<Bytes>) -> Result<(), ClientError> {
        expect_ok(self.request(Command::Delete { key: key.into() }).await?)
    }

    /// Registers this connection as a member of the node.
    pub async fn join(&mut self) -> Result<(), ClientError> {
        expect_ok(self.request(Command::Join).await?)
    }

    /// Waits for the next command the node forwards to this member.
    ///
    /// Returns `None` once the node closes the connection.
    pub async fn recv_forwarded(&mut self) -> Result<Option<Command>, ClientError> {
        if let Some(command) = self.forwarded.pop_front() {
            return Ok(Some(command));
        }
        let framed = self.framed.as_mut().ok_or(ClientError::ConnectionClosed)?;
        let result = match framed.next().await {
            Some(Ok(Frame::Command(command))) => Ok(Some(command)),
            Some(Ok(frame)) => Err(ClientError::UnexpectedFrame(frame.to_string())),
            Some(Err(err)) => Err(err.into()),
            None => Ok(None),
        };
        if !matches!(result, Ok(Some(_))) {
            self.framed = None;
        }
        result
    }

    /// Answers the oldest forwarded command.
    pub async fn acknowledge(&mut self, response: Response) -> Result<(), ClientError> {
        let framed = self.framed.as_mut().ok_or(ClientError::ConnectionClosed)?;
        if let Err(err) = framed.send(response.into()).await {
            self.framed = None;
            return Err(err.into());
        }
        Ok(())
    }
}

fn expect_ok(response: Response) -> Result<(), ClientError> {
    match response.status {
        Status::Ok => Ok(()),
        status => Err(ClientError::Status(status)),
    }
}
