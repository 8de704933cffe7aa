//! Configuration Module
//!
//! Handles loading and managing server configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// TTL in seconds for cached fee aggregates
    pub fee_cache_ttl: u64,
    /// Maximum number of entries the cache can hold
    pub cache_max_entries: usize,
    /// Upper bound for a single aggregate computation, in milliseconds
    pub compute_timeout_ms: u64,
    /// Attempts made for retryable storage/upstream failures
    pub retry_max_attempts: u32,
    /// Base delay for exponential backoff, in milliseconds
    pub retry_base_delay_ms: u64,
    /// Background processor interval in seconds
    pub process_interval: u64,
    /// Maximum events applied per contract per processor run
    pub process_batch_size: usize,
    /// Native token price in USD served by the static price feed
    pub native_usd_price: f64,
    /// Journal file for the durable event store; in-memory when unset
    pub journal_path: Option<PathBuf>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `FEE_CACHE_TTL` - Fee cache TTL in seconds (default: 30)
    /// - `CACHE_MAX_ENTRIES` - Maximum cache entries (default: 1000)
    /// - `COMPUTE_TIMEOUT_MS` - Computation timeout (default: 5000)
    /// - `RETRY_MAX_ATTEMPTS` - Attempts for retryable failures (default: 3)
    /// - `RETRY_BASE_DELAY_MS` - Backoff base delay (default: 100)
    /// - `PROCESS_INTERVAL` - Processor frequency in seconds (default: 1)
    /// - `PROCESS_BATCH_SIZE` - Events per contract per run (default: 100)
    /// - `NATIVE_USD_PRICE` - Static native token price (default: 0)
    /// - `JOURNAL_PATH` - Event journal file (default: unset, in-memory)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            server_port: parse_var("SERVER_PORT").unwrap_or(defaults.server_port),
            fee_cache_ttl: parse_var("FEE_CACHE_TTL").unwrap_or(defaults.fee_cache_ttl),
            cache_max_entries: parse_var("CACHE_MAX_ENTRIES")
                .unwrap_or(defaults.cache_max_entries),
            compute_timeout_ms: parse_var("COMPUTE_TIMEOUT_MS")
                .unwrap_or(defaults.compute_timeout_ms),
            retry_max_attempts: parse_var("RETRY_MAX_ATTEMPTS")
                .unwrap_or(defaults.retry_max_attempts),
            retry_base_delay_ms: parse_var("RETRY_BASE_DELAY_MS")
                .unwrap_or(defaults.retry_base_delay_ms),
            process_interval: parse_var("PROCESS_INTERVAL").unwrap_or(defaults.process_interval),
            process_batch_size: parse_var("PROCESS_BATCH_SIZE")
                .unwrap_or(defaults.process_batch_size),
            native_usd_price: parse_var("NATIVE_USD_PRICE").unwrap_or(defaults.native_usd_price),
            journal_path: env::var("JOURNAL_PATH")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        }
    }

    pub fn fee_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.fee_cache_ttl)
    }

    pub fn compute_timeout(&self) -> Duration {
        Duration::from_millis(self.compute_timeout_ms)
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            fee_cache_ttl: 30,
            cache_max_entries: crate::cache::DEFAULT_MAX_ENTRIES,
            compute_timeout_ms: 5000,
            retry_max_attempts: 3,
            retry_base_delay_ms: 100,
            process_interval: 1,
            process_batch_size: 100,
            native_usd_price: 0.0,
            journal_path: None,
        }
    }
}
