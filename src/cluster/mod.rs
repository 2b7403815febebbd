//! Cluster Module
//!
//! Membership of joined peers and best-effort replication of Sets to them.
//!
//! # Components
//! - Registry: the set of joined members
//! - Peer client: one forwarded Set to one member
//! - Fanout: queue and worker pool that forward Sets to every member

mod fanout;
mod peer;
mod registry;

pub use fanout::{deliver, Fanout, ForwardJob};
pub use peer::PeerClient;
pub use registry::{Member, MembershipRegistry};
