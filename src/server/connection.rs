//! Per-connection state machine
//!
//! `Open -> (Reading -> Dispatching -> Responding)* -> Closed`. One frame is
//! read, dispatched and answered before the next is read, so responses leave
//! in request order. End of stream closes cleanly; any protocol error closes
//! only this connection.

use std::sync::Arc;

use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio::net::TcpStream;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::cluster::{ForwardJob, Member};
use crate::error::ProtocolError;
use crate::protocol::{Command, Frame, FrameCodec, Response};
use crate::server::link::{self, ConnectionId, ConnectionLink, PendingReplies};
use crate::server::ServerContext;

/// Splits `stream`, starts its writer and reader tasks on `tracker`, and
/// returns the link for writing to it.
pub(crate) fn spawn(
    stream: TcpStream,
    ctx: Arc<ServerContext>,
    shutdown: CancellationToken,
    tracker: &TaskTracker,
) -> std::io::Result<ConnectionLink> {
    let peer = stream.peer_addr()?;
    let id = ctx.next_connection_id();
    let (read_half, write_half) = stream.into_split();

    let pending = PendingReplies::default();
    let codec = FrameCodec::new(ctx.config.max_frame_size);
    let link = link::spawn_writer(id, peer, write_half, codec, pending.clone(), tracker);

    let connection = Connection {
        reader: FramedRead::new(read_half, codec),
        link: link.clone(),
        pending,
        ctx,
        shutdown,
    };
    tracker.spawn(connection.run());

    Ok(link)
}

struct Connection<R> {
    reader: FramedRead<R, FrameCodec>,
    link: ConnectionLink,
    pending: PendingReplies,
    ctx: Arc<ServerContext>,
    shutdown: CancellationToken,
}

impl<R> Connection<R>
where
    R: AsyncRead + Unpin,
{
    fn id(&self) -> ConnectionId {
        self.link.id()
    }

    async fn run(mut self) {
        let (conn, peer) = (self.id(), self.link.peer());
        info!(%conn, %peer, "connection opened");

        let outcome = self.serve().await;

        // Releases the registry's link handle so the writer task can finish
        if self.ctx.registry.remove(conn).is_some() {
            info!(%conn, %peer, "member left");
        }
        match outcome {
            Ok(()) => info!(%conn, %peer, "connection closed"),
            Err(err) => warn!(%conn, %peer, error = %err, "connection closed on protocol error"),
        }
    }

    async fn serve(&mut self) -> Result<(), ProtocolError> {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Ok(()),
                next = self.reader.next() => next,
            };
            let Some(frame) = next else {
                return Ok(());
            };

            match frame? {
                Frame::Command(command) => {
                    let response = self.dispatch(command);
                    if self.link.send(response.into()).await.is_err() {
                        debug!(conn = %self.id(), "writer gone, stopping reader");
                        return Ok(());
                    }
                }
                Frame::Response(response) => self.complete_pending(response),
            }
        }
    }

    fn dispatch(&self, command: Command) -> Response {
        let conn = self.id();
        match command {
            Command::Set { key, value, ttl } => {
                debug!(%conn, key = ?key, ttl_ms = ttl.as_millis() as u64, "SET received");
                match self.ctx.cache.set(key.clone(), value.clone(), ttl) {
                    Ok(()) => {
                        self.ctx.fanout.enqueue(ForwardJob {
                            origin: conn,
                            key: key.clone(),
                            value,
                            ttl,
                        });
                        Response::ok().with_key(key)
                    }
                    Err(err) => {
                        warn!(%conn, error = %err, "SET rejected by store");
                        Response::error().with_key(key)
                    }
                }
            }
            Command::Get { key } => {
                debug!(%conn, key = ?key, "GET received");
                match self.ctx.cache.get(&key) {
                    Ok(value) => Response::found(key, value),
                    Err(err) => Response {
                        key: Some(key),
                        value: None,
                        status: err.status(),
                    },
                }
            }
            Command::Delete { key } => {
                debug!(%conn, key = ?key, "DEL received");
                self.ctx.cache.delete(&key);
                Response::ok().with_key(key)
            }
            Command::Join if self.shutdown.is_cancelled() => {
                debug!(%conn, "JOIN refused, shutting down");
                Response::error()
            }
            Command::Join => {
                debug!(%conn, "JOIN received");
                if self.ctx.registry.add(Member::new(self.link.clone())) {
                    info!(%conn, peer = %self.link.peer(), members = self.ctx.registry.len(), "member joined");
                }
                Response::ok()
            }
        }
    }

    fn complete_pending(&self, response: Response) {
        let slot = self.pending.lock().pop_front();
        match slot {
            // The requester may have timed out already
            Some(reply) => {
                let _ = reply.send(response);
            }
            None => warn!(conn = %self.id(), "ignoring unsolicited response"),
        }
    }
}
