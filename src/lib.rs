//! Fee Ledger - on-chain event ledger with cached fee aggregates
//!
//! Ingests contract events idempotently, tracks which ones have been applied,
//! and serves per-contract fee aggregates through a TTL cache that runs at
//! most one computation per key at a time.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod fees;
pub mod models;
pub mod tasks;

pub use api::AppState;
pub use cache::Cache;
pub use config::Config;
pub use error::ApiError;
pub use fees::FeeService;
pub use tasks::spawn_processor_task;
