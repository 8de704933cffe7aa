//! Background Tasks Module
//!
//! # Tasks
//! - Event processor: applies pending events and invalidates fee aggregates

mod processor;

pub use processor::spawn_processor_task;
