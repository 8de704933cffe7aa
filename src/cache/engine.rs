//! Cache Engine Module
//!
//! Typed `get`/`set`/`delete` over the shared store, plus `get_or_compute`,
//! which guarantees at most one in-flight computation per derived key.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{watch, RwLock};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cache::flight::{Flights, Join, Outcome};
use crate::cache::{CacheConfig, CacheStats, CacheStore};
use crate::error::{ApiError, Result};

#[derive(Debug)]
struct Inner {
    store: RwLock<CacheStore>,
    flights: Arc<Flights>,
}

// == Cache ==
/// Cloneable handle to the cache engine.
///
/// Lock order is always store, then flights; the flights lock is never held
/// across an await.
#[derive(Debug, Clone)]
pub struct Cache {
    inner: Arc<Inner>,
}

impl Cache {
    /// Creates a cache holding at most `max_entries` entries.
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                store: RwLock::new(CacheStore::new(max_entries)),
                flights: Arc::new(Flights::new()),
            }),
        }
    }

    // == Get ==
    /// Returns the live value for `args`, or `None` on a miss.
    pub async fn get<A, V>(&self, config: &CacheConfig<A, V>, args: &A) -> Result<Option<V>>
    where
        A: ?Sized,
        V: DeserializeOwned,
    {
        self.lookup(&config.key(args)).await
    }

    // == Set ==
    /// Stores `value` for `args` with the configuration's TTL.
    pub async fn set<A, V>(&self, config: &CacheConfig<A, V>, args: &A, value: &V) -> Result<()>
    where
        A: ?Sized,
        V: Serialize,
    {
        let key = config.key(args);
        let encoded = encode(&key, value)?;
        self.inner
            .store
            .write()
            .await
            .insert(key, encoded, config.ttl(), Instant::now());
        Ok(())
    }

    // == Delete ==
    /// Removes the entry for `args` regardless of TTL.
    ///
    /// A computation already in flight for the key is detached: its callers
    /// still get its result, but it is not written to the cache.
    pub async fn delete<A, V>(&self, config: &CacheConfig<A, V>, args: &A) -> bool
    where
        A: ?Sized,
    {
        let key = config.key(args);
        let mut store = self.inner.store.write().await;
        let removed = store.remove(&key);
        let detached = self.inner.flights.detach(&key);
        if removed || detached {
            store.stats_mut().invalidations += 1;
            debug!(key = %key, removed, detached, "cache entry invalidated");
        }
        removed
    }

    // == Get Or Compute ==
    /// Returns the cached value for `args`, computing it on a miss.
    ///
    /// Among concurrent callers for one key exactly one runs `compute`; the
    /// rest wait for its outcome. Success is written through before anyone
    /// returns; failure reaches every waiter and writes nothing. Each caller
    /// gives up after `timeout` with `UpstreamUnavailable`, and a timed-out
    /// leader releases the key.
    pub async fn get_or_compute<A, V, F, Fut>(
        &self,
        config: &CacheConfig<A, V>,
        args: &A,
        timeout: Duration,
        compute: F,
    ) -> Result<V>
    where
        A: ?Sized,
        V: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let key = config.key(args);
        let deadline = Instant::now() + timeout;
        let mut compute = Some(compute);

        loop {
            if let Some(value) = self.lookup(&key).await? {
                return Ok(value);
            }

            match self.inner.flights.join(&key) {
                Join::Leader(guard) => {
                    // A previous leader may have finished between the lookup and the join.
                    if let Some(value) = self.peek(&key).await? {
                        return Ok(value);
                    }
                    let compute = compute
                        .take()
                        .ok_or_else(|| ApiError::internal(format!("{} led twice", key)))?;
                    self.inner.store.write().await.stats_mut().computations += 1;

                    let outcome = match tokio::time::timeout_at(deadline, compute()).await {
                        Ok(result) => result,
                        Err(_) => Err(timed_out(&key, timeout)),
                    };

                    let published = match &outcome {
                        Ok(value) => encode(&key, value),
                        Err(err) => Err(err.clone()),
                    };

                    match &published {
                        Ok(encoded) => {
                            let mut store = self.inner.store.write().await;
                            if guard.release() {
                                store.insert(
                                    key.clone(),
                                    encoded.clone(),
                                    config.ttl(),
                                    Instant::now(),
                                );
                            } else {
                                debug!(
                                    cache = config.name(),
                                    key = %key,
                                    "invalidated during computation, result not cached"
                                );
                            }
                        }
                        Err(err) => warn!(
                            cache = config.name(),
                            key = %key,
                            code = err.code(),
                            "computation failed"
                        ),
                    }

                    guard.publish(published.clone());
                    return published.and(outcome);
                }
                Join::Follower(rx) => {
                    self.inner.store.write().await.stats_mut().coalesced += 1;
                    match wait_for(rx, deadline).await {
                        Some(Ok(value)) => return decode(&key, value),
                        Some(Err(err)) => return Err(err),
                        None if Instant::now() >= deadline => return Err(timed_out(&key, timeout)),
                        // leader vanished without an outcome; try again
                        None => continue,
                    }
                }
            }
        }
    }

    // == Stats ==
    pub async fn stats(&self) -> CacheStats {
        self.inner.store.read().await.stats().clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.store.read().await.len()
    }

    /// Number of computations currently in flight.
    pub fn in_flight(&self) -> usize {
        self.inner.flights.in_flight()
    }

    async fn lookup<V: DeserializeOwned>(&self, key: &str) -> Result<Option<V>> {
        let value = self.inner.store.write().await.get(key, Instant::now());
        value.map(|value| decode(key, value)).transpose()
    }

    async fn peek<V: DeserializeOwned>(&self, key: &str) -> Result<Option<V>> {
        let value = self.inner.store.read().await.peek(key, Instant::now());
        value.map(|value| decode(key, value)).transpose()
    }
}

/// Waits for a leader's outcome until `deadline`.
///
/// Returns `None` if the leader disappeared or the deadline passed.
async fn wait_for(mut rx: watch::Receiver<Outcome>, deadline: Instant) -> Outcome {
    let wait = async {
        loop {
            let current = rx.borrow_and_update().clone();
            if current.is_some() {
                return current;
            }
            if rx.changed().await.is_err() {
                let last = rx.borrow().clone();
                return last;
            }
        }
    };
    tokio::time::timeout_at(deadline, wait).await.unwrap_or(None)
}

fn timed_out(key: &str, timeout: Duration) -> ApiError {
    ApiError::upstream(format!("computation of {} timed out after {:?}", key, timeout))
}

fn encode<V: Serialize>(key: &str, value: &V) -> Result<serde_json::Value> {
    serde_json::to_value(value)
        .map_err(|err| ApiError::internal(format!("value for {} does not encode: {}", key, err)))
}

fn decode<V: DeserializeOwned>(key: &str, value: serde_json::Value) -> Result<V> {
    serde_json::from_value(value).map_err(|err| {
        ApiError::internal(format!("cached value under {} does not decode: {}", key, err))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::{oneshot, Barrier};

    fn fee_config() -> CacheConfig<str, u64> {
        CacheConfig::new("fee_info", Duration::from_secs(30), |contract| contract.to_string())
    }

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test(start_paused = true)]
    async fn test_get_after_set_within_ttl() {
        let cache = Cache::new(100);
        let config = fee_config();

        cache.set(&config, "0xA", &42).await.unwrap();
        tokio::time::advance(Duration::from_secs(29)).await;

        assert_eq!(cache.get(&config, "0xA").await.unwrap(), Some(42));
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_after_ttl_is_miss() {
        let cache = Cache::new(100);
        let config = fee_config();

        cache.set(&config, "0xA", &42).await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;

        assert_eq!(cache.get(&config, "0xA").await.unwrap(), None);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_delete_invalidates_before_ttl() {
        let cache = Cache::new(100);
        let config = fee_config();

        cache.set(&config, "0xA", &42).await.unwrap();
        assert!(cache.delete(&config, "0xA").await);

        assert_eq!(cache.get(&config, "0xA").await.unwrap(), None);
        assert!(!cache.delete(&config, "0xA").await);
    }

    #[tokio::test]
    async fn test_second_call_is_served_from_cache() {
        let cache = Cache::new(100);
        let config = fee_config();
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let value = cache
                .get_or_compute(&config, "0xA", TIMEOUT, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ApiError>(7)
                })
                .await
                .unwrap();
            assert_eq!(value, 7);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats().await;
        assert_eq!(stats.computations, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_computation() {
        const CALLERS: usize = 16;
        let cache = Cache::new(100);
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(CALLERS));

        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                let cache = cache.clone();
                let calls = calls.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    cache
                        .get_or_compute(&fee_config(), "0xA", TIMEOUT, || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(100)).await;
                            Ok::<_, ApiError>(99)
                        })
                        .await
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 99);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.in_flight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failure_reaches_every_waiter_and_is_not_cached() {
        const CALLERS: usize = 8;
        let cache = Cache::new(100);
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(CALLERS));

        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                let cache = cache.clone();
                let calls = calls.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    cache
                        .get_or_compute(&fee_config(), "0xA", TIMEOUT, || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(100)).await;
                            Err::<u64, _>(ApiError::upstream("price feed down"))
                        })
                        .await
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(
                handle.await.unwrap().unwrap_err(),
                ApiError::upstream("price feed down")
            );
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len().await, 0);

        let value = cache
            .get_or_compute(&fee_config(), "0xA", TIMEOUT, || async {
                Ok::<_, ApiError>(5)
            })
            .await
            .unwrap();
        assert_eq!(value, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_releases_key() {
        let cache = Cache::new(100);
        let config = fee_config();

        let err = cache
            .get_or_compute(&config, "0xA", Duration::from_millis(50), || {
                std::future::pending::<Result<u64>>()
            })
            .await
            .unwrap_err();

        assert_eq!(err.code(), "upstream_unavailable");
        assert_eq!(cache.in_flight(), 0);

        let value = cache
            .get_or_compute(&config, "0xA", TIMEOUT, || async { Ok::<_, ApiError>(3) })
            .await
            .unwrap();
        assert_eq!(value, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_leader_timeout_reaches_waiting_follower() {
        let cache = Cache::new(100);

        let leader = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .get_or_compute(&fee_config(), "0xA", Duration::from_millis(100), || {
                        std::future::pending::<Result<u64>>()
                    })
                    .await
            })
        };
        while cache.in_flight() == 0 {
            tokio::task::yield_now().await;
        }

        let follower_calls = AtomicUsize::new(0);
        let err = cache
            .get_or_compute(&fee_config(), "0xA", TIMEOUT, || async {
                follower_calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ApiError>(1)
            })
            .await
            .unwrap_err();

        assert_eq!(err.code(), "upstream_unavailable");
        assert_eq!(follower_calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            leader.await.unwrap().unwrap_err().code(),
            "upstream_unavailable"
        );
        assert_eq!(cache.in_flight(), 0);
        assert_eq!(cache.len().await, 0);

        let value = cache
            .get_or_compute(&fee_config(), "0xA", TIMEOUT, || async {
                Ok::<_, ApiError>(4)
            })
            .await
            .unwrap();
        assert_eq!(value, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_follower_deadline_expires_before_leader() {
        let cache = Cache::new(100);
        let calls = Arc::new(AtomicUsize::new(0));

        let leader = {
            let cache = cache.clone();
            let calls = calls.clone();
            tokio::spawn(async move {
                cache
                    .get_or_compute(&fee_config(), "0xA", TIMEOUT, || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        Ok::<_, ApiError>(8)
                    })
                    .await
            })
        };
        while cache.in_flight() == 0 {
            tokio::task::yield_now().await;
        }

        let err = cache
            .get_or_compute(&fee_config(), "0xA", Duration::from_millis(50), || async {
                Ok::<_, ApiError>(1)
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "upstream_unavailable");
        // the leader keeps its slot
        assert_eq!(cache.in_flight(), 1);

        assert_eq!(leader.await.unwrap().unwrap(), 8);
        assert_eq!(cache.in_flight(), 0);

        let value = cache
            .get_or_compute(&fee_config(), "0xA", TIMEOUT, || async {
                Ok::<_, ApiError>(1)
            })
            .await
            .unwrap();
        assert_eq!(value, 8);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_delete_during_computation_is_not_cached() {
        let cache = Cache::new(100);
        let (release, released) = oneshot::channel::<()>();

        let leader = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .get_or_compute(&fee_config(), "0xA", TIMEOUT, move || async move {
                        let _ = released.await;
                        Ok::<_, ApiError>(1)
                    })
                    .await
            })
        };
        while cache.in_flight() == 0 {
            tokio::task::yield_now().await;
        }

        assert!(!cache.delete(&fee_config(), "0xA").await);
        release.send(()).unwrap();

        assert_eq!(leader.await.unwrap().unwrap(), 1);
        assert_eq!(cache.get(&fee_config(), "0xA").await.unwrap(), None);
        assert_eq!(cache.stats().await.invalidations, 1);
    }

    #[tokio::test]
    async fn test_cancelled_leader_lets_follower_compute() {
        let cache = Cache::new(100);

        let leader = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .get_or_compute(&fee_config(), "0xA", TIMEOUT, || {
                        std::future::pending::<Result<u64>>()
                    })
                    .await
            })
        };
        while cache.in_flight() == 0 {
            tokio::task::yield_now().await;
        }

        let follower = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .get_or_compute(&fee_config(), "0xA", TIMEOUT, || async {
                        Ok::<_, ApiError>(7)
                    })
                    .await
            })
        };
        while cache.stats().await.coalesced == 0 {
            tokio::task::yield_now().await;
        }

        leader.abort();
        assert_eq!(follower.await.unwrap().unwrap(), 7);
        assert_eq!(cache.get(&fee_config(), "0xA").await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_type_mismatch_is_internal() {
        let cache = Cache::new(100);
        let as_text: CacheConfig<str, String> =
            CacheConfig::new("fee_info", Duration::from_secs(30), |c| c.to_string());

        cache
            .set(&as_text, "0xA", &"not a number".to_string())
            .await
            .unwrap();

        let err = cache.get(&fee_config(), "0xA").await.unwrap_err();
        assert_eq!(err.code(), "internal_error");
        assert!(!err.expose());
    }
}
