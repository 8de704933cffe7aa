//! Cache Module
//!
//! Typed, namespaced TTL cache with lazy expiry, LRU eviction at capacity and
//! single-flight population.

mod config;
mod engine;
mod entry;
mod flight;
mod lru;
mod stats;
mod store;


// Re-export public types
pub use config::{join_key, CacheConfig, NAMESPACE_SEPARATOR};
pub use engine::Cache;
pub use entry::CacheEntry;
pub use lru::LruTracker;
pub use stats::CacheStats;
pub use store::CacheStore;

// == Public Constants ==
/// Default capacity of the shared store
pub const DEFAULT_MAX_ENTRIES: usize = 1000;
