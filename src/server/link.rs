//! Outbound side of a connection
//!
//! A single writer task owns the socket's write half. Responses to the
//! connection's own requests and commands forwarded to it as a member are
//! both queued here, so they hit the wire in the order they were queued.
//!
//! Commands that expect an acknowledgement park a one-shot slot in the
//! connection's [`PendingReplies`] queue right before their bytes are
//! written; the reader loop completes the oldest slot for each Response
//! frame it decodes.

use std::collections::VecDeque;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::Encoder;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::error::ForwardError;
use crate::protocol::{Command, Frame, FrameCodec, Response};

/// Frames queued per connection before senders wait.
const OUTBOUND_CAPACITY: usize = 64;

// == Connection Id ==
/// Process-unique identifier for an accepted or dialed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Reply slots for in-flight requests, oldest first.
pub(crate) type PendingReplies = Arc<Mutex<VecDeque<oneshot::Sender<Response>>>>;

#[derive(Debug)]
struct Outbound {
    frame: Frame,
    reply: Option<oneshot::Sender<Response>>,
}

/// The writer task has exited; nothing more can be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkClosed;

// == Connection Link ==
/// Cloneable handle for writing frames to one connection.
#[derive(Debug, Clone)]
pub struct ConnectionLink {
    id: ConnectionId,
    peer: SocketAddr,
    outbound: mpsc::Sender<Outbound>,
    pending: PendingReplies,
}

impl ConnectionLink {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }

    /// Fails every request still waiting for an answer.
    ///
    /// Replies are matched oldest first, so one that never arrives would pair
    /// every later answer with the wrong request. Returns how many were dropped.
    pub fn clear_pending(&self) -> usize {
        let mut pending = self.pending.lock();
        let dropped = pending.len();
        pending.clear();
        dropped
    }

    /// Queues a frame that expects no answer.
    pub async fn send(&self, frame: Frame) -> Result<(), LinkClosed> {
        self.outbound
            .send(Outbound { frame, reply: None })
            .await
            .map_err(|_| LinkClosed)
    }

    /// Sends a command and waits for the Response the peer sends back.
    ///
    /// `timeout` bounds the whole exchange, including waiting for room in a
    /// congested outbound queue.
    pub async fn request(&self, command: Command, timeout: Duration) -> Result<Response, ForwardError> {
        let (reply, answer) = oneshot::channel();
        let exchange = async {
            self.outbound
                .send(Outbound {
                    frame: command.into(),
                    reply: Some(reply),
                })
                .await
                .map_err(|_| ForwardError::LinkClosed)?;
            answer.await.map_err(|_| ForwardError::LinkClosed)
        };

        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| ForwardError::Timeout(timeout))?
    }
}

/// Starts the writer task for `writer` and returns the handle feeding it.
pub(crate) fn spawn_writer<W>(
    id: ConnectionId,
    peer: SocketAddr,
    writer: W,
    codec: FrameCodec,
    pending: PendingReplies,
    tracker: &TaskTracker,
) -> ConnectionLink
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (outbound, queue) = mpsc::channel(OUTBOUND_CAPACITY);
    tracker.spawn(run_writer(writer, codec, queue, pending.clone(), peer));
    ConnectionLink {
        id,
        peer,
        outbound,
        pending,
    }
}

/// Drains the queue until every link handle is dropped or a write fails,
/// then shuts the write half down.
async fn run_writer<W>(
    mut writer: W,
    mut codec: FrameCodec,
    mut queue: mpsc::Receiver<Outbound>,
    pending: PendingReplies,
    peer: SocketAddr,
) where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::new();

    while let Some(Outbound { frame, reply }) = queue.recv().await {
        buf.clear();
        let is_response = matches!(frame, Frame::Response(_));

        if let Err(err) = codec.encode(frame, &mut buf) {
            buf.clear();
            if !is_response {
                // Dropping `reply` fails the waiting request
                warn!(%peer, error = %err, "dropping command that cannot be encoded");
                continue;
            }
            warn!(%peer, error = %err, "response cannot be encoded, answering with error status");
            if let Err(err) = codec.encode(Response::error().into(), &mut buf) {
                warn!(%peer, error = %err, "failed to encode error response");
                continue;
            }
        }

        if let Some(reply) = reply {
            pending.lock().push_back(reply);
        }

        if let Err(err) = write_frame(&mut writer, &buf).await {
            debug!(%peer, error = %err, "write failed, closing connection");
            return;
        }
    }

    if let Err(err) = writer.shutdown().await {
        debug!(%peer, error = %err, "failed to shut down write half");
    }
}

async fn write_frame<W>(writer: &mut W, buf: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(buf).await?;
    writer.flush().await
}
