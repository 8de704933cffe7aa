//! Events Module
//!
//! Idempotent ingestion and processing-state bookkeeping for on-chain events.

mod event;
mod journal;
mod ledger;
mod store;


// Re-export public types
pub use event::{
    validate_identifier, Event, EventId, EventKey, ProcessingState, RawEvent, Recorded,
    MAX_IDENTIFIER_LENGTH,
};
pub use journal::JournalEventStore;
pub use ledger::Ledger;
pub use store::{EventStore, MemoryEventStore};
