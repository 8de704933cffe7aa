//! Event Processor Task
//!
//! Background task that periodically applies pending events.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::fees::FeeService;

/// Spawns a background task that drains pending events on an interval.
///
/// Each run applies up to `batch_size` events per contract through
/// [`FeeService::process_all`], which also invalidates the affected fee
/// aggregates. Failures are logged and retried on the next tick.
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
pub fn spawn_processor_task(
    service: FeeService,
    interval_secs: u64,
    batch_size: usize,
) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting event processor with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;

            match service.process_all(batch_size).await {
                Ok(0) => debug!("event processor: nothing pending"),
                Ok(applied) => info!("event processor: applied {} events", applied),
                Err(err) => error!(code = err.code(), "event processor run failed: {}", err),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::events::{EventStore, MemoryEventStore, RawEvent};
    use crate::fees::StaticPriceFeed;
    use serde_json::json;
    use std::sync::Arc;

    fn service() -> FeeService {
        FeeService::new(
            Arc::new(MemoryEventStore::new()),
            Arc::new(StaticPriceFeed::new(1.0)),
            Cache::new(100),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_processor_applies_pending_events() {
        let service = service();
        for i in 0..3u32 {
            service
                .ingest(RawEvent {
                    contract: "0xA".to_string(),
                    tx_hash: format!("t{}", i),
                    block_number: 1,
                    block_index: i,
                    payload: json!({ "fee": "10" }),
                })
                .await
                .unwrap();
        }

        let handle = spawn_processor_task(service.clone(), 1, 2);
        tokio::time::sleep(Duration::from_millis(2500)).await;

        let pending = service.store().list_unprocessed("0xA", 10).await.unwrap();
        assert!(pending.is_empty());
        assert_eq!(service.fee_info("0xA").await.unwrap().total_fee_wei, 30);

        handle.abort();
    }

    #[tokio::test]
    async fn test_processor_can_be_aborted() {
        let handle = spawn_processor_task(service(), 1, 10);

        handle.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}
