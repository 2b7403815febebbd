//! Cache Module
//!
//! Provides the shared in-memory store with lazy TTL expiry and a bounded
//! sweep for entries nobody reads again.

mod entry;
mod stats;
mod store;


// Re-export public types
pub use entry::CacheEntry;
pub use stats::CacheStats;
pub use store::CacheStore;
