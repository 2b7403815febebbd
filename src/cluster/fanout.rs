//! Fan-out of accepted Sets to joined members
//!
//! Sets are queued on a bounded channel drained by a fixed pool of workers.
//! Enqueueing never waits: when the queue is full the forwarded write is
//! dropped and logged. Each job is delivered to all members concurrently,
//! and a member whose delivery fails is removed from the registry.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::join_all;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::cluster::{MembershipRegistry, PeerClient};
use crate::config::Config;
use crate::server::ConnectionId;

// == Forward Job ==
/// A Set accepted locally, to be replayed on every other member.
#[derive(Debug, Clone)]
pub struct ForwardJob {
    /// Connection the Set arrived on. Excluded from delivery even when it is
    /// a member, so a member never receives an echo of its own write.
    pub origin: ConnectionId,
    pub key: Bytes,
    pub value: Bytes,
    pub ttl: Duration,
}

type JobQueue = Arc<Mutex<mpsc::Receiver<ForwardJob>>>;

// == Fanout ==
/// Handle for queueing forward jobs.
#[derive(Debug, Clone)]
pub struct Fanout {
    queue: mpsc::Sender<ForwardJob>,
    registry: Arc<MembershipRegistry>,
}

impl Fanout {
    /// Spawns the worker pool on `tracker`. Workers stop when `shutdown` is
    /// cancelled; queued jobs are abandoned.
    pub fn start(
        registry: Arc<MembershipRegistry>,
        config: &Config,
        shutdown: CancellationToken,
        tracker: &TaskTracker,
    ) -> Self {
        let (queue, jobs) = mpsc::channel(config.fanout_queue_capacity.max(1));
        let jobs: JobQueue = Arc::new(Mutex::new(jobs));

        for worker in 0..config.fanout_workers.max(1) {
            tracker.spawn(run_worker(
                worker,
                Arc::clone(&jobs),
                Arc::clone(&registry),
                config.forward_timeout(),
                shutdown.clone(),
            ));
        }

        Self { queue, registry }
    }

    /// Queues `job` if anyone is listening. Returns whether it was queued.
    pub fn enqueue(&self, job: ForwardJob) -> bool {
        if self.registry.is_empty() {
            return false;
        }
        match self.queue.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                warn!(key = ?job.key, "fan-out queue full, dropping forwarded write");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("fan-out workers stopped, not forwarding");
                false
            }
        }
    }
}

async fn run_worker(
    worker: usize,
    jobs: JobQueue,
    registry: Arc<MembershipRegistry>,
    timeout: Duration,
    shutdown: CancellationToken,
) {
    debug!(worker, "fan-out worker started");
    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = async { jobs.lock().await.recv().await } => next,
        };
        let Some(job) = next else {
            break;
        };
        deliver(&registry, &job, timeout).await;
    }
    debug!(worker, "fan-out worker stopped");
}

/// Sends `job` to every member except its origin, concurrently, and evicts
/// members that fail. Returns the number of successful deliveries.
pub async fn deliver(registry: &MembershipRegistry, job: &ForwardJob, timeout: Duration) -> usize {
    let members: Vec<_> = registry
        .snapshot()
        .into_iter()
        .filter(|member| member.id() != job.origin)
        .collect();

    let deliveries = members.iter().map(|member| async move {
        let result = PeerClient::new(member, timeout)
            .set(job.key.clone(), job.value.clone(), job.ttl)
            .await;
        (member, result)
    });

    let mut delivered = 0;
    for (member, result) in join_all(deliveries).await {
        match result {
            Ok(()) => delivered += 1,
            Err(err) => {
                warn!(
                    member = %member.id(),
                    peer = %member.addr(),
                    error = %err,
                    "forward to member failed, removing it"
                );
                registry.remove(member.id());
                // An unanswered forward would misalign replies if it rejoins
                member.link().clear_pending();
            }
        }
    }
    delivered
}
