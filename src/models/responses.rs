//! Response DTOs for the fee ledger API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::CacheStats;
use crate::events::EventId;

/// Response body for POST /events
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestResponse {
    /// Records stored for the first time
    pub created: usize,
    /// Records already present
    pub duplicates: usize,
    /// Ids in request order
    pub ids: Vec<EventId>,
}

impl IngestResponse {
    pub fn push(&mut self, id: EventId, created: bool) {
        if created {
            self.created += 1;
        } else {
            self.duplicates += 1;
        }
        self.ids.push(id);
    }
}

/// Response body for POST /process
#[derive(Debug, Clone, Serialize)]
pub struct ProcessResponse {
    /// Events transitioned to processed
    pub applied: usize,
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Cache counters
    pub cache: CacheStats,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
    /// Computations currently in flight
    pub in_flight: usize,
    /// Events stored
    pub events: usize,
}

impl StatsResponse {
    pub fn new(cache: CacheStats, in_flight: usize, events: usize) -> Self {
        Self {
            hit_rate: cache.hit_rate(),
            cache,
            in_flight,
            events,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error payload nested under `error`
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    /// Machine-readable code
    pub code: &'static str,
    /// Client-safe message
    pub message: String,
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

impl ErrorResponse {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }
}
