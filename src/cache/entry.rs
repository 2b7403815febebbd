//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;

use crate::error::{CacheError, Result};

// == Cache Entry ==
/// Represents a single cache entry with value and expiry deadline.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The stored value
    pub value: Bytes,
    /// Expiration deadline, None = no expiration
    pub expires_at: Option<Instant>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry.
    ///
    /// A zero `ttl` means the entry never expires. Fails when the deadline
    /// cannot be represented by the clock.
    ///
    /// # Arguments
    /// * `value` - The value to store
    /// * `ttl` - Time to live, measured from now
    pub fn new(value: Bytes, ttl: Duration) -> Result<Self> {
        let expires_at = if ttl.is_zero() {
            None
        } else {
            let deadline = Instant::now().checked_add(ttl).ok_or_else(|| {
                CacheError::InvalidRequest(format!("TTL of {}ms is out of range", ttl.as_millis()))
            })?;
            Some(deadline)
        };

        Ok(Self { value, expires_at })
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now`.
    ///
    /// An entry is expired once `now` reaches its deadline, so a TTL that has
    /// fully elapsed is never observable.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(expires) => now >= expires,
            None => false,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    // == Time To Live ==
    /// Returns the remaining TTL, or None if no expiration is set.
    ///
    /// Returns `Some(Duration::ZERO)` once the entry has expired.
    pub fn ttl_remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|expires| expires.saturating_duration_since(Instant::now()))
    }
}
