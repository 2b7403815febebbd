//! Server Module
//!
//! TCP listener, per-connection tasks and lifecycle for one cache node.
//!
//! # Lifecycle
//! 1. [`Server::bind`] opens the listener and starts the sweeper and fan-out workers
//! 2. [`Server::join`] optionally dials a seed node and registers with it
//! 3. [`Server::run`] accepts connections until a [`ShutdownHandle`] fires,
//!    then waits for every task to finish

mod connection;
mod context;
pub(crate) mod link;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::cache::CacheStore;
use crate::cluster::{Fanout, MembershipRegistry};
use crate::config::Config;
use crate::error::ServerError;
use crate::protocol::Command;
use crate::tasks::run_sweeper;

pub use context::ServerContext;
pub use link::{ConnectionId, ConnectionLink, LinkClosed};

/// How long `run` waits for connections and workers after shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

// == Shutdown Handle ==
/// Stops a running [`Server`] from any task.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    token: CancellationToken,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }
}

// == Server ==
pub struct Server {
    listener: TcpListener,
    ctx: Arc<ServerContext>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl Server {
    /// Binds `listen_addr` and starts the background tasks.
    ///
    /// Port `0` picks a free port; see [`Server::local_addr`].
    pub async fn bind(listen_addr: &str, config: Config) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(listen_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: listen_addr.to_string(),
                source,
            })?;

        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();

        let cache = Arc::new(CacheStore::new());
        let registry = Arc::new(MembershipRegistry::new());
        let fanout = Fanout::start(Arc::clone(&registry), &config, shutdown.clone(), &tracker);

        tracker.spawn(run_sweeper(
            Arc::clone(&cache),
            config.sweep_interval(),
            config.sweep_batch_size,
            shutdown.clone(),
        ));

        let local_addr = listener.local_addr()?;
        info!(
            addr = %local_addr,
            max_frame_size = config.max_frame_size,
            fanout_workers = config.fanout_workers,
            "listening"
        );

        let ctx = Arc::new(ServerContext::new(cache, registry, fanout, config));
        Ok(Self {
            listener,
            ctx,
            shutdown,
            tracker,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn context(&self) -> Arc<ServerContext> {
        Arc::clone(&self.ctx)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            token: self.shutdown.clone(),
        }
    }

    /// Dials `seed` and sends Join, so the seed forwards its Sets here.
    ///
    /// The dialed connection is served like an accepted one: forwarded Sets
    /// arriving on it are applied locally and acknowledged.
    pub async fn join(&self, seed: &str) -> Result<(), ServerError> {
        let join_error = |reason: String| ServerError::Join {
            addr: seed.to_string(),
            reason,
        };

        let stream = TcpStream::connect(seed)
            .await
            .map_err(|err| join_error(err.to_string()))?;
        let link = connection::spawn(
            stream,
            Arc::clone(&self.ctx),
            self.shutdown.clone(),
            &self.tracker,
        )
        .map_err(|err| join_error(err.to_string()))?;

        let response = link
            .request(Command::Join, self.ctx.config.forward_timeout())
            .await
            .map_err(|err| join_error(err.to_string()))?;
        if !response.is_ok() {
            return Err(join_error(format!("seed answered {:?}", response.status)));
        }

        info!(seed, conn = %link.id(), "joined cluster");
        Ok(())
    }

    /// Accepts connections until shutdown, then drains every task.
    pub async fn run(self) -> Result<(), ServerError> {
        loop {
            let accepted = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "accepted connection");
                    if let Err(err) = stream.set_nodelay(true) {
                        debug!(%peer, error = %err, "failed to set TCP_NODELAY");
                    }
                    if let Err(err) = connection::spawn(
                        stream,
                        Arc::clone(&self.ctx),
                        self.shutdown.clone(),
                        &self.tracker,
                    ) {
                        warn!(%peer, error = %err, "failed to start connection");
                    }
                }
                // Per-connection failures (e.g. fd exhaustion) must not stop the node
                Err(err) => {
                    warn!(error = %err, "accept failed");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }
        }

        info!("shutting down");
        drop(self.listener);
        // Members hold links; release them so writer tasks can finish
        self.ctx.registry.clear();
        self.tracker.close();
        if tokio::time::timeout(SHUTDOWN_GRACE, self.tracker.wait())
            .await
            .is_err()
        {
            warn!(remaining = self.tracker.len(), "tasks still running after shutdown grace period");
        }

        let stats = self.ctx.cache.stats();
        info!(
            entries = stats.total_entries,
            hits = stats.hits,
            misses = stats.misses,
            expirations = stats.expirations,
            hit_rate = stats.hit_rate(),
            "server stopped"
        );
        Ok(())
    }
}
