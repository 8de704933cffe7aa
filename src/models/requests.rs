//! Request DTOs for the fee ledger API
//!
//! Defines the structure of incoming HTTP request bodies and query strings.

use serde::Deserialize;

use crate::events::RawEvent;

/// Maximum number of events accepted in one ingestion request
pub const MAX_INGEST_BATCH: usize = 1000;

/// Default `limit` for listing and processing endpoints
pub const DEFAULT_LIMIT: usize = 100;

/// Request body for POST /events
#[derive(Debug, Clone, Deserialize)]
pub struct IngestRequest {
    /// Raw records from the chain reader
    pub events: Vec<RawEvent>,
}

impl IngestRequest {
    /// Validates the batch size
    ///
    /// Returns an error message if validation fails, None if valid.
    /// Individual records are validated on ingestion.
    pub fn validate(&self) -> Option<String> {
        if self.events.is_empty() {
            return Some("events cannot be empty".to_string());
        }
        if self.events.len() > MAX_INGEST_BATCH {
            return Some(format!(
                "batch exceeds maximum of {} events",
                MAX_INGEST_BATCH
            ));
        }
        None
    }
}

/// Query string carrying an optional `limit`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LimitQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

impl LimitQuery {
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT)
    }
}
