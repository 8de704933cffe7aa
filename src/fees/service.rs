//! Fee Service
//!
//! Ingests raw events, applies pending ones in chain order and serves fee
//! aggregates through the cache.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument};

use crate::cache::{join_key, Cache, CacheConfig};
use crate::config::Config;
use crate::error::{ApiError, Result};
use crate::events::{validate_identifier, Event, EventId, EventStore, RawEvent, Recorded};
use crate::fees::{fee_of, FeeInfo, PriceFeed, RetryPolicy};

/// Cache namespace of fee aggregates
pub const FEE_INFO_CACHE: &str = "fee_info";

/// Default fee aggregate TTL
pub const DEFAULT_FEE_TTL: Duration = Duration::from_secs(30);

/// Default bound on one aggregate computation
pub const DEFAULT_COMPUTE_TIMEOUT: Duration = Duration::from_secs(5);

fn fee_info_key(contract: &str) -> String {
    join_key([contract])
}

// == Fee Service ==
/// Aggregate service for per-contract fee information.
#[derive(Clone)]
pub struct FeeService {
    store: Arc<dyn EventStore>,
    prices: Arc<dyn PriceFeed>,
    cache: Cache,
    fee_info: CacheConfig<str, FeeInfo>,
    retry: RetryPolicy,
    compute_timeout: Duration,
}

impl FeeService {
    /// Creates a service with default TTL, retry policy and timeout.
    pub fn new(store: Arc<dyn EventStore>, prices: Arc<dyn PriceFeed>, cache: Cache) -> Self {
        Self {
            store,
            prices,
            cache,
            fee_info: CacheConfig::new(FEE_INFO_CACHE, DEFAULT_FEE_TTL, fee_info_key),
            retry: RetryPolicy::default(),
            compute_timeout: DEFAULT_COMPUTE_TIMEOUT,
        }
    }

    /// Creates a service with the policies from `config`.
    pub fn from_config(
        config: &Config,
        store: Arc<dyn EventStore>,
        prices: Arc<dyn PriceFeed>,
        cache: Cache,
    ) -> Self {
        Self::new(store, prices, cache)
            .with_fee_ttl(config.fee_cache_ttl())
            .with_retry(RetryPolicy::new(
                config.retry_max_attempts,
                Duration::from_millis(config.retry_base_delay_ms),
            ))
            .with_compute_timeout(config.compute_timeout())
    }

    pub fn with_fee_ttl(mut self, ttl: Duration) -> Self {
        self.fee_info = CacheConfig::new(FEE_INFO_CACHE, ttl, fee_info_key);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_compute_timeout(mut self, timeout: Duration) -> Self {
        self.compute_timeout = timeout;
        self
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    // == Fee Info ==
    /// Fee aggregate of `contract`, served from cache when fresh.
    #[instrument(skip(self))]
    pub async fn fee_info(&self, contract: &str) -> Result<FeeInfo> {
        check_contract(contract)?;
        self.cache
            .get_or_compute(&self.fee_info, contract, self.compute_timeout, || {
                self.compute_info(contract)
            })
            .await
    }

    /// Recomputes the aggregate from the event log and the price feed.
    ///
    /// Never consults the cache; callers go through [`FeeService::fee_info`].
    pub async fn compute_info(&self, contract: &str) -> Result<FeeInfo> {
        let store = self.store.as_ref();
        let known = self
            .retry
            .run("has_contract", || store.has_contract(contract))
            .await?;
        if !known {
            return Err(ApiError::not_found("contract", contract));
        }

        let events = self
            .retry
            .run("list_processed", || store.list_processed(contract))
            .await?;
        let price = self
            .retry
            .run("native_usd_price", || self.prices.native_usd_price())
            .await?;

        debug!(contract, events = events.len(), "fee info computed");
        FeeInfo::from_events(contract, &events, price)
    }

    // == Ingest ==
    /// Validates and records one raw event. Duplicates are not errors.
    pub async fn ingest(&self, raw: RawEvent) -> Result<Recorded> {
        if let Some(message) = raw.validate() {
            return Err(ApiError::validation(message));
        }
        fee_of(&raw.payload).map_err(ApiError::validation)?;

        let store = self.store.as_ref();
        self.retry
            .run("record_event", || store.record_event(raw.clone()))
            .await
    }

    // == Pending ==
    pub async fn pending(&self, contract: &str, limit: usize) -> Result<Vec<Event>> {
        check_contract(contract)?;
        if limit == 0 {
            return Err(ApiError::validation("limit must be positive"));
        }
        let store = self.store.as_ref();
        self.retry
            .run("list_unprocessed", || store.list_unprocessed(contract, limit))
            .await
    }

    // == Process Pending ==
    /// Applies up to `limit` pending events of `contract` in chain order.
    ///
    /// The contract's cached aggregate is invalidated whenever at least one
    /// event was applied, even if a later event in the batch failed.
    pub async fn process_pending(&self, contract: &str, limit: usize) -> Result<usize> {
        let store = self.store.as_ref();
        let events = self
            .retry
            .run("list_unprocessed", || store.list_unprocessed(contract, limit))
            .await?;

        let mut applied = 0;
        let mut failure = None;
        for event in &events {
            match self
                .retry
                .run("mark_processed", || store.mark_processed(event.id))
                .await
            {
                Ok(()) => applied += 1,
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        if applied > 0 {
            self.cache.delete(&self.fee_info, contract).await;
            info!(contract, applied, "pending events applied");
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(applied),
        }
    }

    /// Runs [`FeeService::process_pending`] for every contract with pending events.
    pub async fn process_all(&self, limit: usize) -> Result<usize> {
        let store = self.store.as_ref();
        let contracts = self
            .retry
            .run("pending_contracts", || store.pending_contracts())
            .await?;

        let mut applied = 0;
        for contract in contracts {
            applied += self.process_pending(&contract, limit).await?;
        }
        Ok(applied)
    }

    // == Mark Processed ==
    /// Marks a single event processed and invalidates its contract's aggregate.
    pub async fn mark_processed(&self, id: EventId) -> Result<Event> {
        let store = self.store.as_ref();
        let event = self.retry.run("get_event", || store.get(id)).await?;
        if !event.is_processed() {
            self.retry
                .run("mark_processed", || store.mark_processed(id))
                .await?;
            self.cache.delete(&self.fee_info, event.contract.as_str()).await;
        }
        self.retry.run("get_event", || store.get(id)).await
    }
}

fn check_contract(contract: &str) -> Result<()> {
    match validate_identifier("contract", contract) {
        Some(message) => Err(ApiError::validation(message)),
        None => Ok(()),
    }
}
