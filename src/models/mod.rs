//! Request and Response models for the fee ledger API
//!
//! This module defines the DTOs (Data Transfer Objects) used for
//! serializing/deserializing HTTP request and response bodies.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{IngestRequest, LimitQuery, DEFAULT_LIMIT, MAX_INGEST_BATCH};
pub use responses::{
    ErrorBody, ErrorResponse, HealthResponse, IngestResponse, ProcessResponse, StatsResponse,
};
