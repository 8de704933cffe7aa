//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::time::Duration;

use tokio::time::Instant;

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
///
/// Values are stored JSON-encoded so entries of different configurations
/// can share one physical store.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The stored value
    pub value: serde_json::Value,
    /// Expiration time, write time plus the configuration's TTL
    pub expires_at: Instant,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry expiring `ttl` after `now`.
    pub fn new(value: serde_json::Value, ttl: Duration, now: Instant) -> Self {
        Self {
            value,
            expires_at: now + ttl,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now`.
    ///
    /// Boundary condition: an entry is expired once `now >= expires_at`, so a
    /// zero TTL entry is never served.
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}
