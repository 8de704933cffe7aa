//! Journal Event Store
//!
//! Durable backend: every mutation is appended to a JSON-lines journal
//! before it is applied to the in-memory ledger, and the journal is replayed
//! on open.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::error::{ApiError, Result};
use crate::events::{Event, EventId, EventStore, Ledger, RawEvent, Recorded};

// == Journal Entry ==
/// One line of the journal.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum JournalEntry {
    Recorded { event: Event },
    Processed { id: EventId, at: DateTime<Utc> },
}

#[derive(Debug)]
struct JournalState {
    ledger: Ledger,
    file: File,
    /// Length of the journal covered by the ledger
    len: u64,
    /// Set once a failed append could not be rolled back
    failed: Option<String>,
}

impl JournalState {
    // == Append ==
    /// Appends one entry and syncs it.
    ///
    /// On failure the file is cut back to its last known length, so a retry
    /// never lands behind a partial or unsynced line. If that cut also fails
    /// the journal refuses further writes until it is reopened.
    async fn append(&mut self, path: &Path, entry: &JournalEntry) -> Result<()> {
        if let Some(reason) = &self.failed {
            return Err(ApiError::storage(format!("journal unusable: {}", reason)));
        }

        let mut line = serde_json::to_vec(entry)
            .map_err(|err| ApiError::internal(format!("journal encode failed: {}", err)))?;
        line.push(b'\n');

        match write_line(&mut self.file, &line).await {
            Ok(()) => {
                self.len += line.len() as u64;
                Ok(())
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "journal append failed");
                self.rollback(path).await;
                Err(err.into())
            }
        }
    }

    /// Truncates the file back to the length the ledger reflects.
    async fn rollback(&mut self, path: &Path) {
        if let Err(err) = self.file.set_len(self.len).await {
            error!(path = %path.display(), error = %err, "journal rollback failed");
            self.failed = Some(err.to_string());
        }
    }
}

async fn write_line(file: &mut File, line: &[u8]) -> std::io::Result<()> {
    file.write_all(line).await?;
    file.flush().await?;
    file.sync_data().await
}

// == Journal Event Store ==
/// Append-only, file-backed event store.
///
/// The write lock is held across the journal append so the file order always
/// matches the order in which the ledger was mutated.
#[derive(Debug)]
pub struct JournalEventStore {
    path: PathBuf,
    state: RwLock<JournalState>,
}

impl JournalEventStore {
    // == Open ==
    /// Opens (or creates) the journal at `path` and replays it.
    ///
    /// A final line cut short by a crash is discarded and truncated away;
    /// any other malformed line fails with `StorageUnavailable`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(err) => return Err(err.into()),
        };

        let (ledger, valid_len) = replay(&contents)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        if valid_len < contents.len() {
            warn!(
                path = %path.display(),
                discarded = contents.len() - valid_len,
                "discarding torn journal tail"
            );
            file.set_len(valid_len as u64).await?;
        }

        info!(path = %path.display(), events = ledger.len(), "event journal opened");

        Ok(Self {
            path,
            state: RwLock::new(JournalState {
                ledger,
                file,
                len: valid_len as u64,
                failed: None,
            }),
        })
    }
}

/// Rebuilds a ledger from journal text.
///
/// Returns the ledger and the byte length of the well-formed prefix. A
/// `recorded` line repeating a stored row and a `processed` line for an
/// event already processed are skipped.
fn replay(contents: &str) -> Result<(Ledger, usize)> {
    let mut ledger = Ledger::new();
    let mut offset = 0;

    for (number, line) in contents.split_inclusive('\n').enumerate() {
        let complete = line.ends_with('\n');
        let text = line.trim_end();
        if text.is_empty() {
            offset += line.len();
            continue;
        }

        let entry = match serde_json::from_str::<JournalEntry>(text) {
            Ok(entry) => entry,
            Err(_) if !complete => break,
            Err(err) => {
                return Err(ApiError::storage(format!(
                    "malformed journal line {}: {}",
                    number + 1,
                    err
                )))
            }
        };

        match entry {
            JournalEntry::Recorded { event } => {
                if ledger.id_of(&event.key()) == Some(event.id) {
                    debug!(
                        id = %event.id,
                        line = number + 1,
                        "skipping repeated journal record"
                    );
                } else {
                    ledger.insert(event)?;
                }
            }
            JournalEntry::Processed { id, at } => {
                ledger.mark_processed(id, at)?;
            }
        }
        offset += line.len();
    }

    Ok((ledger, offset))
}

#[async_trait]
impl EventStore for JournalEventStore {
    async fn record_event(&self, raw: RawEvent) -> Result<Recorded> {
        if let Some(message) = raw.validate() {
            return Err(ApiError::validation(message));
        }

        let mut state = self.state.write().await;
        if let Some(id) = state.ledger.existing(&raw) {
            return Ok(Recorded { id, created: false });
        }

        let event = state.ledger.build(raw, Utc::now());
        let id = event.id;
        let entry = JournalEntry::Recorded { event };
        state.append(&self.path, &entry).await?;

        if let JournalEntry::Recorded { event } = entry {
            state.ledger.insert(event)?;
        }
        debug!(id = %id, "event journaled");
        Ok(Recorded { id, created: true })
    }

    async fn list_unprocessed(&self, contract: &str, limit: usize) -> Result<Vec<Event>> {
        Ok(self.state.read().await.ledger.unprocessed(contract, limit))
    }

    async fn mark_processed(&self, id: EventId) -> Result<()> {
        let mut state = self.state.write().await;
        if state.ledger.get(id)?.is_processed() {
            return Ok(());
        }

        let at = Utc::now();
        state
            .append(&self.path, &JournalEntry::Processed { id, at })
            .await?;
        state.ledger.mark_processed(id, at)?;
        Ok(())
    }

    async fn get(&self, id: EventId) -> Result<Event> {
        self.state.read().await.ledger.get(id).cloned()
    }

    async fn list_processed(&self, contract: &str) -> Result<Vec<Event>> {
        Ok(self.state.read().await.ledger.processed(contract))
    }

    async fn has_contract(&self, contract: &str) -> Result<bool> {
        Ok(self.state.read().await.ledger.has_contract(contract))
    }

    async fn pending_contracts(&self) -> Result<Vec<String>> {
        Ok(self.state.read().await.ledger.pending_contracts())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.state.read().await.ledger.len())
    }
}
