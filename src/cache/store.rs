//! Cache Store Module
//!
//! Main cache engine: a HashMap of entries plus a deadline-ordered expiry
//! index, behind a single reader/writer lock.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::time::Instant;

use crate::cache::stats::StatsCounters;
use crate::cache::{CacheEntry, CacheStats};
use crate::error::{CacheError, Result};

// == Cache Store ==
/// Thread-safe key/value storage with TTL support.
///
/// Reads (`get`, `has`) share the lock; writes, deletes and expiry removals
/// take it exclusively. The lock is only ever held for the map mutation
/// itself, never across I/O.
#[derive(Debug, Default)]
pub struct CacheStore {
    inner: RwLock<Inner>,
    stats: StatsCounters,
}

#[derive(Debug, Default)]
struct Inner {
    /// Key-value storage
    entries: HashMap<Bytes, CacheEntry>,
    /// Keys with a deadline, ordered by that deadline
    expiry: BTreeSet<(Instant, Bytes)>,
}

/// Outcome of a read under the shared lock.
enum Lookup<T> {
    Fresh(T),
    Expired,
    Missing,
}

impl Inner {
    fn insert(&mut self, key: Bytes, entry: CacheEntry) {
        let deadline = entry.expires_at;
        if let Some(previous) = self.entries.insert(key.clone(), entry) {
            if let Some(at) = previous.expires_at {
                self.expiry.remove(&(at, key.clone()));
            }
        }
        if let Some(at) = deadline {
            self.expiry.insert((at, key));
        }
    }

    fn remove(&mut self, key: &[u8]) -> Option<CacheEntry> {
        let (key, entry) = self.entries.remove_entry(key)?;
        if let Some(at) = entry.expires_at {
            self.expiry.remove(&(at, key));
        }
        Some(entry)
    }
}

impl CacheStore {
    // == Constructor ==
    /// Creates a new empty CacheStore.
    pub fn new() -> Self {
        Self::default()
    }

    // == Set ==
    /// Stores a key-value pair.
    ///
    /// If the key already exists, the value is overwritten and its TTL is
    /// replaced. A zero `ttl` means the entry never expires.
    ///
    /// # Arguments
    /// * `key` - The key to store
    /// * `value` - The value to store
    /// * `ttl` - Time to live, `Duration::ZERO` for no expiry
    pub fn set(&self, key: Bytes, value: Bytes, ttl: Duration) -> Result<()> {
        let entry = CacheEntry::new(value, ttl)?;
        self.inner.write().insert(key, entry);
        Ok(())
    }

    // == Get ==
    /// Retrieves a value by key.
    ///
    /// Returns the value if found and not expired. An expired entry is
    /// reported as [`CacheError::Expired`] even if the sweeper has not run
    /// yet, and is removed on the way out.
    pub fn get(&self, key: &[u8]) -> Result<Bytes> {
        match self.lookup(key, |entry| entry.value.clone()) {
            Lookup::Fresh(value) => {
                self.stats.record_hit();
                Ok(value)
            }
            Lookup::Expired => {
                self.stats.record_miss();
                Err(CacheError::Expired(display_key(key)))
            }
            Lookup::Missing => {
                self.stats.record_miss();
                Err(CacheError::NotFound(display_key(key)))
            }
        }
    }

    // == Has ==
    /// Returns true if a fresh entry exists for `key`.
    pub fn has(&self, key: &[u8]) -> bool {
        matches!(self.lookup(key, |_| ()), Lookup::Fresh(()))
    }

    // == Delete ==
    /// Removes an entry by key. Idempotent.
    ///
    /// Returns whether an entry was present.
    pub fn delete(&self, key: &[u8]) -> bool {
        self.inner.write().remove(key).is_some()
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot(self.len())
    }

    // == Sweep Expired ==
    /// Removes at most `batch` expired entries, oldest deadline first.
    ///
    /// Returns the number of entries removed.
    pub fn sweep_expired(&self, batch: usize) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        {
            let mut inner = self.inner.write();
            while removed < batch {
                match inner.expiry.first() {
                    Some((at, _)) if *at <= now => {}
                    _ => break,
                }
                if let Some((_, key)) = inner.expiry.pop_first() {
                    inner.entries.remove(&key);
                    removed += 1;
                }
            }
        }
        self.stats.record_expirations(removed);
        removed
    }

    // == Length ==
    /// Returns the current number of entries, expired ones not yet removed included.
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    /// Reads under the shared lock, then upgrades to the exclusive lock only
    /// to drop an entry found expired.
    fn lookup<T>(&self, key: &[u8], read: impl FnOnce(&CacheEntry) -> T) -> Lookup<T> {
        let now = Instant::now();
        {
            let inner = self.inner.read();
            match inner.entries.get(key) {
                Some(entry) if !entry.is_expired_at(now) => return Lookup::Fresh(read(entry)),
                Some(_) => {}
                None => return Lookup::Missing,
            }
        }

        // A concurrent Set may have replaced the entry between the two locks;
        // only remove what is still expired.
        let mut inner = self.inner.write();
        let still_expired = inner
            .entries
            .get(key)
            .is_some_and(|entry| entry.is_expired_at(now));
        if still_expired {
            inner.remove(key);
            drop(inner);
            self.stats.record_expirations(1);
        }
        Lookup::Expired
    }
}

fn display_key(key: &[u8]) -> String {
    String::from_utf8_lossy(key).into_owned()
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread::sleep;

    fn b(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[test]
    fn test_store_new() {
        let store = CacheStore::new();
        assert_eq!(store.len(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_set_and_get() {
        let store = CacheStore::new();

        store.set(b("key1"), b("value1"), Duration::ZERO).unwrap();
        let value = store.get(b"key1").unwrap();

        assert_eq!(value, b("value1"));
        assert_eq!(store.len(), 1);
        assert!(store.has(b"key1"));
    }

    #[test]
    fn test_store_get_nonexistent() {
        let store = CacheStore::new();

        let result = store.get(b"missing");
        assert!(matches!(result, Err(CacheError::NotFound(_))));
        assert!(!store.has(b"missing"));
    }

    #[test]
    fn test_store_empty_key_is_valid() {
        let store = CacheStore::new();

        store.set(Bytes::new(), b("v"), Duration::ZERO).unwrap();
        assert_eq!(store.get(b"").unwrap(), b("v"));
    }

    #[test]
    fn test_store_delete() {
        let store = CacheStore::new();

        store.set(b("key1"), b("value1"), Duration::ZERO).unwrap();
        assert!(store.delete(b"key1"));

        assert!(store.is_empty());
        assert!(matches!(store.get(b"key1"), Err(CacheError::NotFound(_))));
    }

    #[test]
    fn test_store_delete_is_idempotent() {
        let store = CacheStore::new();

        assert!(!store.delete(b"nonexistent"));
        assert!(!store.delete(b"nonexistent"));
    }

    #[test]
    fn test_store_overwrite() {
        let store = CacheStore::new();

        store.set(b("key1"), b("value1"), Duration::ZERO).unwrap();
        store.set(b("key1"), b("value2"), Duration::ZERO).unwrap();

        assert_eq!(store.get(b"key1").unwrap(), b("value2"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_ttl_expiration_is_lazy() {
        let store = CacheStore::new();

        store.set(b("key1"), b("value1"), Duration::from_millis(50)).unwrap();

        // Should be accessible immediately
        assert!(store.get(b"key1").is_ok());

        sleep(Duration::from_millis(80));

        // No sweep has run; the read itself must hide and drop the entry
        assert!(!store.has(b"key1"));
        assert!(matches!(store.get(b"key1"), Err(CacheError::NotFound(_))));
        assert!(store.is_empty());
        assert_eq!(store.stats().expirations, 1);
    }

    #[test]
    fn test_store_get_reports_expired() {
        let store = CacheStore::new();

        store.set(b("key1"), b("value1"), Duration::from_millis(20)).unwrap();
        sleep(Duration::from_millis(40));

        assert!(matches!(store.get(b"key1"), Err(CacheError::Expired(_))));
    }

    #[test]
    fn test_store_overwrite_clears_ttl() {
        let store = CacheStore::new();

        store.set(b("key1"), b("short"), Duration::from_millis(20)).unwrap();
        store.set(b("key1"), b("forever"), Duration::ZERO).unwrap();
        sleep(Duration::from_millis(40));

        assert_eq!(store.sweep_expired(10), 0);
        assert_eq!(store.get(b"key1").unwrap(), b("forever"));
    }

    #[test]
    fn test_store_stats() {
        let store = CacheStore::new();

        store.set(b("key1"), b("value1"), Duration::ZERO).unwrap();
        store.get(b"key1").unwrap(); // hit
        let _ = store.get(b"nonexistent"); // miss

        let stats = store.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total_entries, 1);
    }

    #[test]
    fn test_store_sweep_expired() {
        let store = CacheStore::new();

        store.set(b("key1"), b("value1"), Duration::from_millis(20)).unwrap();
        store.set(b("key2"), b("value2"), Duration::from_secs(10)).unwrap();
        store.set(b("key3"), b("value3"), Duration::ZERO).unwrap();

        sleep(Duration::from_millis(40));

        assert_eq!(store.sweep_expired(100), 1);
        assert_eq!(store.len(), 2);
        assert!(store.get(b"key2").is_ok());
        assert!(store.get(b"key3").is_ok());
    }

    #[test]
    fn test_store_sweep_respects_batch() {
        let store = CacheStore::new();

        for i in 0..10 {
            store
                .set(b(&format!("key{i}")), b("v"), Duration::from_millis(10))
                .unwrap();
        }
        sleep(Duration::from_millis(30));

        assert_eq!(store.sweep_expired(4), 4);
        assert_eq!(store.sweep_expired(4), 4);
        assert_eq!(store.sweep_expired(4), 2);
        assert!(store.is_empty());
        assert_eq!(store.stats().expirations, 10);
    }

    #[test]
    fn test_store_ttl_out_of_range() {
        let store = CacheStore::new();

        let result = store.set(b("key"), b("value"), Duration::MAX);
        assert!(matches!(result, Err(CacheError::InvalidRequest(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_concurrent_writers_last_write_wins() {
        let store = Arc::new(CacheStore::new());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        store
                            .set(b("shared"), b(&format!("writer{i}")), Duration::ZERO)
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // Whatever landed last is one writer's whole value, never a mix
        let value = store.get(b"shared").unwrap();
        let text = std::str::from_utf8(&value).unwrap();
        assert!(text.starts_with("writer"));
        assert!((0..8).any(|i| text == format!("writer{i}")));
        assert_eq!(store.len(), 1);
    }
}
