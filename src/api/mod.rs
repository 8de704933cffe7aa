//! API Module
//!
//! HTTP handlers and routing for the fee ledger.
//!
//! # Endpoints
//! - `POST /events` - Ingest raw events
//! - `GET /events/pending/:contract` - Pending events in chain order
//! - `POST /events/:id/processed` - Mark an event processed
//! - `POST /process` - Apply pending events
//! - `GET /fees/:contract` - Fee aggregate
//! - `GET /stats` - Statistics
//! - `GET /health` - Health check endpoint

pub mod extract;
pub mod handlers;
pub mod routes;

pub use extract::{AppJson, AppPath, AppQuery};
pub use handlers::*;
pub use routes::create_router;
