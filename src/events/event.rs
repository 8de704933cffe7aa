//! Event Module
//!
//! Raw records delivered by the chain reader and the stored event rows.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum length in bytes of a contract identifier or transaction hash
pub const MAX_IDENTIFIER_LENGTH: usize = 128;

// == Event Id ==
/// Monotonically assigned event identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// == Processing State ==
/// Two-state lifecycle of a stored event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingState {
    /// Ingested, not yet folded into derived state
    Pending,
    /// Terminal
    Processed,
}

// == Raw Event ==
/// Record pushed by the upstream chain reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    pub contract: String,
    pub tx_hash: String,
    pub block_number: u64,
    pub block_index: u32,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl RawEvent {
    /// Validates the identifiers of the record
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        validate_identifier("contract", &self.contract)
            .or_else(|| validate_identifier("txHash", &self.tx_hash))
    }

    /// Idempotency key of this record.
    pub fn key(&self) -> EventKey {
        EventKey {
            contract: self.contract.clone(),
            tx_hash: self.tx_hash.clone(),
            block_index: self.block_index,
        }
    }
}

/// Checks a contract address or transaction hash.
pub fn validate_identifier(field: &str, value: &str) -> Option<String> {
    if value.is_empty() {
        return Some(format!("{} cannot be empty", field));
    }
    if value.len() > MAX_IDENTIFIER_LENGTH {
        return Some(format!(
            "{} exceeds maximum length of {} bytes",
            field, MAX_IDENTIFIER_LENGTH
        ));
    }
    if value.chars().any(char::is_whitespace) {
        return Some(format!("{} cannot contain whitespace", field));
    }
    None
}

// == Event Key ==
/// `(contract, txHash, blockIndex)`: an event is stored at most once per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub contract: String,
    pub tx_hash: String,
    pub block_index: u32,
}

// == Event ==
/// A stored on-chain occurrence.
///
/// Immutable except for `state` and `updated_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: EventId,
    pub contract: String,
    pub tx_hash: String,
    pub block_number: u64,
    pub block_index: u32,
    pub payload: serde_json::Value,
    pub state: ProcessingState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// Creates a pending event from a raw record.
    pub fn from_raw(id: EventId, raw: RawEvent, now: DateTime<Utc>) -> Self {
        Self {
            id,
            contract: raw.contract,
            tx_hash: raw.tx_hash,
            block_number: raw.block_number,
            block_index: raw.block_index,
            payload: raw.payload,
            state: ProcessingState::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_processed(&self) -> bool {
        self.state == ProcessingState::Processed
    }

    /// Canonical chain position `(blockNumber, blockIndex)`.
    pub fn position(&self) -> (u64, u32) {
        (self.block_number, self.block_index)
    }

    pub fn key(&self) -> EventKey {
        EventKey {
            contract: self.contract.clone(),
            tx_hash: self.tx_hash.clone(),
            block_index: self.block_index,
        }
    }
}

// == Recorded ==
/// Outcome of an idempotent upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Recorded {
    pub id: EventId,
    /// True only for the first delivery of a key
    pub created: bool,
}
