//! Shared state handed to every connection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::cache::CacheStore;
use crate::cluster::{Fanout, MembershipRegistry};
use crate::config::Config;
use crate::server::ConnectionId;

#[derive(Debug)]
pub struct ServerContext {
    pub cache: Arc<CacheStore>,
    pub registry: Arc<MembershipRegistry>,
    pub fanout: Fanout,
    pub config: Config,
    next_connection_id: AtomicU64,
}

impl ServerContext {
    pub fn new(
        cache: Arc<CacheStore>,
        registry: Arc<MembershipRegistry>,
        fanout: Fanout,
        config: Config,
    ) -> Self {
        Self {
            cache,
            registry,
            fanout,
            config,
            next_connection_id: AtomicU64::new(1),
        }
    }

    pub fn next_connection_id(&self) -> ConnectionId {
        ConnectionId(self.next_connection_id.fetch_add(1, Ordering::Relaxed))
    }
}
