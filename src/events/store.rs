//! Event Store Module
//!
//! The storage port for ingested events, and its in-memory backend.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{ApiError, Result};
use crate::events::{Event, EventId, Ledger, RawEvent, Recorded};

// == Event Store Trait ==
/// Durable record of on-chain events and their processing state.
///
/// Implementations must be safe under concurrent ingestion. Storage failures
/// are reported as [`ApiError::StorageUnavailable`] so callers can retry.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Idempotent upsert keyed by `(contract, txHash, blockIndex)`.
    async fn record_event(&self, raw: RawEvent) -> Result<Recorded>;

    /// Pending events of `contract` ordered by `(blockNumber, blockIndex)`.
    async fn list_unprocessed(&self, contract: &str, limit: usize) -> Result<Vec<Event>>;

    /// Marks an event processed. Unknown ids are `NotFound`; repeating the
    /// call on a processed event succeeds without changes.
    async fn mark_processed(&self, id: EventId) -> Result<()>;

    async fn get(&self, id: EventId) -> Result<Event>;

    /// Processed events of `contract` in canonical order.
    async fn list_processed(&self, contract: &str) -> Result<Vec<Event>>;

    /// Whether any event of `contract` was ever recorded.
    async fn has_contract(&self, contract: &str) -> Result<bool>;

    /// Contracts with pending events, sorted.
    async fn pending_contracts(&self) -> Result<Vec<String>>;

    async fn len(&self) -> Result<usize>;
}

// == Memory Event Store ==
/// Event store kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    ledger: RwLock<Ledger>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn record_event(&self, raw: RawEvent) -> Result<Recorded> {
        if let Some(message) = raw.validate() {
            return Err(ApiError::validation(message));
        }
        let recorded = self.ledger.write().await.record(raw, Utc::now())?;
        debug!(id = %recorded.id, created = recorded.created, "event recorded");
        Ok(recorded)
    }

    async fn list_unprocessed(&self, contract: &str, limit: usize) -> Result<Vec<Event>> {
        Ok(self.ledger.read().await.unprocessed(contract, limit))
    }

    async fn mark_processed(&self, id: EventId) -> Result<()> {
        self.ledger.write().await.mark_processed(id, Utc::now())?;
        Ok(())
    }

    async fn get(&self, id: EventId) -> Result<Event> {
        self.ledger.read().await.get(id).cloned()
    }

    async fn list_processed(&self, contract: &str) -> Result<Vec<Event>> {
        Ok(self.ledger.read().await.processed(contract))
    }

    async fn has_contract(&self, contract: &str) -> Result<bool> {
        Ok(self.ledger.read().await.has_contract(contract))
    }

    async fn pending_contracts(&self) -> Result<Vec<String>> {
        Ok(self.ledger.read().await.pending_contracts())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.ledger.read().await.len())
    }
}
