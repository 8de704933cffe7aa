//! Ledger Module
//!
//! In-memory event rows plus the indexes both store backends serve reads from.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};

use crate::error::{ApiError, Result};
use crate::events::{Event, EventId, EventKey, ProcessingState, RawEvent, Recorded};

/// Ordering key inside a contract: `(blockNumber, blockIndex, id)`.
type Position = (u64, u32, EventId);

// == Ledger ==
/// Event rows with a primary key index and per-contract ordering indexes.
#[derive(Debug)]
pub struct Ledger {
    /// Rows by id
    rows: BTreeMap<EventId, Event>,
    /// `(contract, txHash, blockIndex)` -> id
    keys: HashMap<EventKey, EventId>,
    /// Every event of a contract in canonical order
    by_contract: HashMap<String, BTreeSet<Position>>,
    /// Pending events of a contract in canonical order
    pending: HashMap<String, BTreeSet<Position>>,
    /// Next id to hand out
    next_id: u64,
}

impl Default for Ledger {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            keys: HashMap::new(),
            by_contract: HashMap::new(),
            pending: HashMap::new(),
            next_id: 1,
        }
    }
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    // == Lookup ==
    /// Returns the id already stored for the record's key, if any.
    pub fn existing(&self, raw: &RawEvent) -> Option<EventId> {
        self.id_of(&raw.key())
    }

    pub fn id_of(&self, key: &EventKey) -> Option<EventId> {
        self.keys.get(key).copied()
    }

    /// Builds the row the next insert would store, without inserting it.
    pub fn build(&self, raw: RawEvent, now: DateTime<Utc>) -> Event {
        Event::from_raw(EventId(self.next_id), raw, now)
    }

    // == Insert ==
    /// Inserts a row whose key is not yet present.
    ///
    /// Returns an internal error if the id or key is already taken.
    pub fn insert(&mut self, event: Event) -> Result<()> {
        let key = event.key();
        if self.keys.contains_key(&key) || self.rows.contains_key(&event.id) {
            return Err(ApiError::internal(format!(
                "duplicate ledger insert for event {} ({}/{}/{})",
                event.id, key.contract, key.tx_hash, key.block_index
            )));
        }

        let position = (event.block_number, event.block_index, event.id);
        self.by_contract
            .entry(event.contract.clone())
            .or_default()
            .insert(position);
        if !event.is_processed() {
            self.pending
                .entry(event.contract.clone())
                .or_default()
                .insert(position);
        }

        self.next_id = self.next_id.max(event.id.0 + 1);
        self.keys.insert(key, event.id);
        self.rows.insert(event.id, event);
        Ok(())
    }

    // == Record ==
    /// Idempotent upsert: a known key is a no-op on the stored row.
    pub fn record(&mut self, raw: RawEvent, now: DateTime<Utc>) -> Result<Recorded> {
        if let Some(id) = self.existing(&raw) {
            return Ok(Recorded { id, created: false });
        }
        let event = self.build(raw, now);
        let id = event.id;
        self.insert(event)?;
        Ok(Recorded { id, created: true })
    }

    // == Get ==
    pub fn get(&self, id: EventId) -> Result<&Event> {
        self.rows
            .get(&id)
            .ok_or_else(|| ApiError::not_found("event", id))
    }

    // == Mark Processed ==
    /// Transitions an event to `Processed`.
    ///
    /// Returns `true` if the state changed, `false` if it was already
    /// processed (in which case `updated_at` is left alone).
    pub fn mark_processed(&mut self, id: EventId, now: DateTime<Utc>) -> Result<bool> {
        let event = self
            .rows
            .get_mut(&id)
            .ok_or_else(|| ApiError::not_found("event", id))?;

        if event.state == ProcessingState::Processed {
            return Ok(false);
        }

        event.state = ProcessingState::Processed;
        event.updated_at = now;

        let position = (event.block_number, event.block_index, event.id);
        if let Some(set) = self.pending.get_mut(&event.contract) {
            set.remove(&position);
            if set.is_empty() {
                self.pending.remove(&event.contract);
            }
        }
        Ok(true)
    }

    // == Queries ==
    /// Pending events of a contract, canonical order, at most `limit`.
    pub fn unprocessed(&self, contract: &str, limit: usize) -> Vec<Event> {
        self.collect(self.pending.get(contract), limit)
    }

    /// Processed events of a contract, canonical order.
    pub fn processed(&self, contract: &str) -> Vec<Event> {
        self.by_contract
            .get(contract)
            .into_iter()
            .flatten()
            .filter_map(|(_, _, id)| self.rows.get(id))
            .filter(|event| event.is_processed())
            .cloned()
            .collect()
    }

    pub fn has_contract(&self, contract: &str) -> bool {
        self.by_contract.contains_key(contract)
    }

    /// Contracts with at least one pending event, sorted.
    pub fn pending_contracts(&self) -> Vec<String> {
        let mut contracts: Vec<String> = self.pending.keys().cloned().collect();
        contracts.sort();
        contracts
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn collect(&self, positions: Option<&BTreeSet<Position>>, limit: usize) -> Vec<Event> {
        positions
            .into_iter()
            .flatten()
            .take(limit)
            .filter_map(|(_, _, id)| self.rows.get(id))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(contract: &str, tx_hash: &str, block_number: u64, block_index: u32) -> RawEvent {
        RawEvent {
            contract: contract.to_string(),
            tx_hash: tx_hash.to_string(),
            block_number,
            block_index,
            payload: json!({}),
        }
    }

    #[test]
    fn test_ids_are_monotonic() {
        let mut ledger = Ledger::new();
        let a = ledger.record(raw("0xA", "t1", 1, 0), Utc::now()).unwrap();
        let b = ledger.record(raw("0xA", "t2", 1, 1), Utc::now()).unwrap();
        assert_eq!(a.id, EventId(1));
        assert_eq!(b.id, EventId(2));
    }

    #[test]
    fn test_record_duplicate_keeps_first_row() {
        let mut ledger = Ledger::new();
        let first = ledger.record(raw("0xA", "t1", 10, 0), Utc::now()).unwrap();

        let mut again = raw("0xA", "t1", 10, 0);
        again.payload = json!({ "fee": "5" });
        let second = ledger.record(again, Utc::now()).unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.id, second.id);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.get(first.id).unwrap().payload, json!({}));
    }

    #[test]
    fn test_same_tx_different_index_is_distinct() {
        let mut ledger = Ledger::new();
        ledger.record(raw("0xA", "t1", 10, 0), Utc::now()).unwrap();
        ledger.record(raw("0xA", "t1", 10, 1), Utc::now()).unwrap();
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_unprocessed_canonical_order() {
        let mut ledger = Ledger::new();
        ledger.record(raw("0xA", "t3", 12, 0), Utc::now()).unwrap();
        ledger.record(raw("0xA", "t2", 10, 5), Utc::now()).unwrap();
        ledger.record(raw("0xA", "t1", 10, 1), Utc::now()).unwrap();
        ledger.record(raw("0xB", "t9", 1, 0), Utc::now()).unwrap();

        let positions: Vec<_> = ledger
            .unprocessed("0xA", 10)
            .iter()
            .map(Event::position)
            .collect();
        assert_eq!(positions, vec![(10, 1), (10, 5), (12, 0)]);
        assert_eq!(ledger.unprocessed("0xA", 2).len(), 2);
    }

    #[test]
    fn test_mark_processed_moves_out_of_pending() {
        let mut ledger = Ledger::new();
        let recorded = ledger.record(raw("0xA", "t1", 10, 0), Utc::now()).unwrap();

        assert!(ledger.mark_processed(recorded.id, Utc::now()).unwrap());
        assert!(!ledger.mark_processed(recorded.id, Utc::now()).unwrap());

        assert!(ledger.unprocessed("0xA", 10).is_empty());
        assert!(ledger.pending_contracts().is_empty());
        assert_eq!(ledger.processed("0xA").len(), 1);
        assert!(ledger.has_contract("0xA"));
    }

    #[test]
    fn test_mark_processed_unknown() {
        let mut ledger = Ledger::new();
        let err = ledger.mark_processed(EventId(42), Utc::now()).unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn test_insert_rejects_duplicate_key() {
        let mut ledger = Ledger::new();
        let event = ledger.build(raw("0xA", "t1", 1, 0), Utc::now());
        ledger.insert(event.clone()).unwrap();
        assert!(ledger.insert(event).is_err());
    }
}
