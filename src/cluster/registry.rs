//! Membership Registry
//!
//! The set of joined connections that receive forwarded writes. Guarded by
//! its own lock, disjoint from the cache store's.

use std::collections::HashMap;
use std::net::SocketAddr;

use parking_lot::Mutex;

use crate::server::{ConnectionId, ConnectionLink};

// == Member ==
/// A joined peer, reachable through its connection's link.
#[derive(Debug, Clone)]
pub struct Member {
    link: ConnectionLink,
}

impl Member {
    pub fn new(link: ConnectionLink) -> Self {
        Self { link }
    }

    pub fn id(&self) -> ConnectionId {
        self.link.id()
    }

    pub fn addr(&self) -> SocketAddr {
        self.link.peer()
    }

    pub fn link(&self) -> &ConnectionLink {
        &self.link
    }
}

// == Membership Registry ==
#[derive(Debug, Default)]
pub struct MembershipRegistry {
    members: Mutex<HashMap<ConnectionId, Member>>,
}

impl MembershipRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `member`. Returns false if its connection had already joined.
    pub fn add(&self, member: Member) -> bool {
        self.members.lock().insert(member.id(), member).is_none()
    }

    pub fn remove(&self, id: ConnectionId) -> Option<Member> {
        self.members.lock().remove(&id)
    }

    /// Point-in-time copy; iterating it never races with joins or departures.
    pub fn snapshot(&self) -> Vec<Member> {
        self.members.lock().values().cloned().collect()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.members.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.members.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.lock().is_empty()
    }

    /// Drops every member, releasing their links.
    pub fn clear(&self) {
        self.members.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FrameCodec;
    use crate::server::link::{spawn_writer, PendingReplies};
    use tokio_util::task::TaskTracker;

    fn member(id: u64, tracker: &TaskTracker) -> Member {
        let (_, server) = tokio::io::duplex(64);
        let peer = format!("127.0.0.1:{}", 10_000 + id).parse().unwrap();
        Member::new(spawn_writer(
            ConnectionId(id),
            peer,
            server,
            FrameCodec::default(),
            PendingReplies::default(),
            tracker,
        ))
    }

    #[tokio::test]
    async fn test_add_and_remove() {
        let tracker = TaskTracker::new();
        let registry = MembershipRegistry::new();

        assert!(registry.add(member(1, &tracker)));
        assert!(registry.add(member(2, &tracker)));
        assert_eq!(registry.len(), 2);
        assert!(registry.contains(ConnectionId(1)));

        let removed = registry.remove(ConnectionId(1)).unwrap();
        assert_eq!(removed.id(), ConnectionId(1));
        assert!(!registry.contains(ConnectionId(1)));
        assert!(registry.remove(ConnectionId(1)).is_none());
    }

    #[tokio::test]
    async fn test_rejoin_is_not_duplicated() {
        let tracker = TaskTracker::new();
        let registry = MembershipRegistry::new();

        assert!(registry.add(member(7, &tracker)));
        assert!(!registry.add(member(7, &tracker)));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_is_detached() {
        let tracker = TaskTracker::new();
        let registry = MembershipRegistry::new();
        registry.add(member(1, &tracker));
        registry.add(member(2, &tracker));

        let snapshot = registry.snapshot();
        registry.remove(ConnectionId(1));
        registry.add(member(3, &tracker));

        let mut ids: Vec<_> = snapshot.iter().map(Member::id).collect();
        ids.sort();
        assert_eq!(ids, vec![ConnectionId(1), ConnectionId(2)]);
        assert_eq!(registry.len(), 2);

        registry.clear();
        assert!(registry.is_empty());
    }
}
