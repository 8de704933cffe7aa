//! Single-Flight Module
//!
//! Registry of in-flight computations, one slot per derived key.
//!
//! The first caller for a key becomes the leader and receives a
//! [`FlightGuard`]; later callers subscribe to the leader's outcome. Dropping
//! the guard without publishing (cancellation, panic) releases the slot and
//! closes the channel so followers can retry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use crate::error::Result;

/// Published result of a computation; `None` until the leader finishes.
pub type Outcome = Option<Result<serde_json::Value>>;

#[derive(Debug)]
struct Slot {
    id: u64,
    outcome: watch::Receiver<Outcome>,
}

// == Join ==
/// Role assigned to a caller joining a key.
pub enum Join {
    Leader(FlightGuard),
    Follower(watch::Receiver<Outcome>),
}

// == Flights ==
#[derive(Debug, Default)]
pub struct Flights {
    slots: Mutex<HashMap<String, Slot>>,
    next_id: AtomicU64,
}

impl Flights {
    pub fn new() -> Self {
        Self::default()
    }

    // == Join ==
    /// Joins the computation for `key`, or starts one if none is in flight.
    pub fn join(self: &Arc<Self>, key: &str) -> Join {
        let mut slots = self.lock();
        if let Some(slot) = slots.get(key) {
            return Join::Follower(slot.outcome.clone());
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(None);
        slots.insert(key.to_string(), Slot { id, outcome: rx });

        Join::Leader(FlightGuard {
            flights: Arc::clone(self),
            key: key.to_string(),
            id,
            tx,
        })
    }

    // == Detach ==
    /// Forgets the in-flight computation for `key`.
    ///
    /// Its leader keeps running and still answers its own followers, but it
    /// will no longer be allowed to write its result into the cache.
    pub fn detach(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    pub fn in_flight(&self) -> usize {
        self.lock().len()
    }

    // Slots stay consistent even if a holder panicked: every critical
    // section is a single map operation.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// == Flight Guard ==
/// Leadership of one in-flight computation.
#[derive(Debug)]
pub struct FlightGuard {
    flights: Arc<Flights>,
    key: String,
    id: u64,
    tx: watch::Sender<Outcome>,
}

impl FlightGuard {
    /// Removes this guard's slot if it still owns it.
    ///
    /// Returns `false` when the slot was detached in the meantime.
    pub fn release(&self) -> bool {
        let mut slots = self.flights.lock();
        match slots.get(&self.key) {
            Some(slot) if slot.id == self.id => {
                slots.remove(&self.key);
                true
            }
            _ => false,
        }
    }

    /// Releases the slot and hands `outcome` to every follower.
    pub fn publish(self, outcome: Result<serde_json::Value>) {
        self.release();
        self.tx.send_replace(Some(outcome));
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.release();
    }
}
