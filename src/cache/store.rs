//! Cache Store Module
//!
//! Physical key/value storage with lazy TTL expiry and LRU eviction at capacity.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::cache::{CacheEntry, CacheStats, LruTracker};

// == Cache Store ==
/// Physical store shared by every cache configuration.
///
/// Expiry is evaluated at read time; nothing sweeps in the background.
#[derive(Debug)]
pub struct CacheStore {
    /// Key-value storage
    entries: HashMap<String, CacheEntry>,
    /// LRU access tracker
    lru: LruTracker,
    /// Performance statistics
    stats: CacheStats,
    /// Maximum number of entries allowed
    max_entries: usize,
}

impl CacheStore {
    // == Constructor ==
    /// Creates a new CacheStore holding at most `max_entries` entries.
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            stats: CacheStats::new(),
            max_entries: max_entries.max(1),
        }
    }

    // == Get ==
    /// Returns the live value under `key`.
    ///
    /// An expired entry is removed and reported as a miss.
    pub fn get(&mut self, key: &str, now: Instant) -> Option<serde_json::Value> {
        let expired = match self.entries.get(key) {
            None => {
                self.stats.misses += 1;
                return None;
            }
            Some(entry) => entry.is_expired(now),
        };

        if expired {
            self.remove_entry(key);
            self.stats.expirations += 1;
            self.stats.misses += 1;
            return None;
        }

        self.stats.hits += 1;
        self.lru.touch(key);
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    /// Returns the live value under `key` without touching counters or recency.
    pub fn peek(&self, key: &str, now: Instant) -> Option<serde_json::Value> {
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone())
    }

    // == Insert ==
    /// Stores `value` under `key`, replacing any previous entry and its expiry.
    pub fn insert(&mut self, key: String, value: serde_json::Value, ttl: Duration, now: Instant) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            self.make_room(now);
        }

        self.entries
            .insert(key.clone(), CacheEntry::new(value, ttl, now));
        self.lru.touch(&key);
        self.stats.total_entries = self.entries.len();
    }

    // == Remove ==
    /// Removes the entry under `key`, returning whether one existed.
    pub fn remove(&mut self, key: &str) -> bool {
        self.remove_entry(key)
    }

    // == Purge Expired ==
    /// Drops every expired entry, returning how many were removed.
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.remove_entry(key);
        }
        self.stats.expirations += expired.len() as u64;
        expired.len()
    }

    /// Frees one slot: expired entries go first, then the least recently used.
    fn make_room(&mut self, now: Instant) {
        if self.purge_expired(now) > 0 {
            return;
        }
        if let Some(key) = self.lru.evict_oldest() {
            self.entries.remove(&key);
            self.stats.evictions += 1;
            self.stats.total_entries = self.entries.len();
        }
    }

    fn remove_entry(&mut self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        self.lru.remove(key);
        self.stats.total_entries = self.entries.len();
        removed
    }

    // == Stats ==
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut CacheStats {
        &mut self.stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
