//! Expiry Sweeper
//!
//! Background task that periodically removes expired cache entries, so keys
//! that are never read again still free their memory.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::CacheStore;

/// Runs the sweep loop until `shutdown` is cancelled.
///
/// Each tick removes at most `batch` expired entries, oldest deadline first,
/// so one sweep never holds the store's write lock for long.
///
/// # Arguments
/// * `cache` - Shared cache store
/// * `interval` - Time between sweeps
/// * `batch` - Upper bound on entries removed per sweep
/// * `shutdown` - Stops the loop when cancelled
pub async fn run_sweeper(
    cache: Arc<CacheStore>,
    interval: Duration,
    batch: usize,
    shutdown: CancellationToken,
) {
    info!(interval_ms = interval.as_millis() as u64, batch, "expiry sweeper started");

    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let removed = cache.sweep_expired(batch);
        if removed > 0 {
            info!(removed, remaining = cache.len(), "expiry sweep removed entries");
        } else {
            debug!("expiry sweep: nothing to remove");
        }
    }

    debug!("expiry sweeper stopped");
}

/// Spawns [`run_sweeper`] on the current runtime.
///
/// # Example
/// ```ignore
/// let cache = Arc::new(CacheStore::new());
/// let shutdown = CancellationToken::new();
/// let handle = spawn_sweeper(cache.clone(), Duration::from_secs(1), 256, shutdown.clone());
/// // Later, during shutdown:
/// shutdown.cancel();
/// handle.await?;
/// ```
pub fn spawn_sweeper(
    cache: Arc<CacheStore>,
    interval: Duration,
    batch: usize,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(run_sweeper(cache, interval, batch, shutdown))
}
