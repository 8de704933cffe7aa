//! API Handlers
//!
//! HTTP request handlers for each fee ledger endpoint.

use std::sync::Arc;

use axum::{extract::State, Json};
use tracing::info;

use super::extract::{AppJson, AppPath, AppQuery};
use crate::cache::Cache;
use crate::config::Config;
use crate::error::{ApiError, Result};
use crate::events::{Event, EventId, EventStore, JournalEventStore, MemoryEventStore};
use crate::fees::{FeeInfo, FeeService, StaticPriceFeed};
use crate::models::{
    HealthResponse, IngestRequest, IngestResponse, LimitQuery, ProcessResponse, StatsResponse,
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Fee service, owning the event store and cache handles
    pub service: FeeService,
}

impl AppState {
    pub fn new(service: FeeService) -> Self {
        Self { service }
    }

    /// Creates a new AppState from configuration.
    ///
    /// Opens the journal when `journal_path` is set, otherwise keeps events
    /// in memory.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let store: Arc<dyn EventStore> = match &config.journal_path {
            Some(path) => Arc::new(JournalEventStore::open(path).await?),
            None => {
                info!("No journal configured, events are kept in memory");
                Arc::new(MemoryEventStore::new())
            }
        };
        let prices = Arc::new(StaticPriceFeed::new(config.native_usd_price));
        let cache = Cache::new(config.cache_max_entries);

        Ok(Self::new(FeeService::from_config(
            config, store, prices, cache,
        )))
    }
}

/// Handler for POST /events
///
/// Records a batch of raw events. Records are applied in order; on the first
/// failure the error is returned and the client may redeliver the whole
/// batch, since ingestion is idempotent.
pub async fn ingest_handler(
    State(state): State<AppState>,
    AppJson(req): AppJson<IngestRequest>,
) -> Result<Json<IngestResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(ApiError::validation(error_msg));
    }

    let mut response = IngestResponse::default();
    for raw in req.events {
        let recorded = state.service.ingest(raw).await?;
        response.push(recorded.id, recorded.created);
    }

    Ok(Json(response))
}

/// Handler for GET /fees/:contract
pub async fn fee_info_handler(
    State(state): State<AppState>,
    AppPath(contract): AppPath<String>,
) -> Result<Json<FeeInfo>> {
    let info = state.service.fee_info(&contract).await?;
    Ok(Json(info))
}

/// Handler for GET /events/pending/:contract
pub async fn pending_handler(
    State(state): State<AppState>,
    AppPath(contract): AppPath<String>,
    AppQuery(query): AppQuery<LimitQuery>,
) -> Result<Json<Vec<Event>>> {
    let events = state.service.pending(&contract, query.limit()).await?;
    Ok(Json(events))
}

/// Handler for POST /events/:id/processed
pub async fn mark_processed_handler(
    State(state): State<AppState>,
    AppPath(id): AppPath<u64>,
) -> Result<Json<Event>> {
    let event = state.service.mark_processed(EventId(id)).await?;
    Ok(Json(event))
}

/// Handler for POST /process
///
/// Applies pending events of every contract, up to `limit` per contract.
pub async fn process_handler(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<LimitQuery>,
) -> Result<Json<ProcessResponse>> {
    let limit = query.limit();
    if limit == 0 {
        return Err(ApiError::validation("limit must be positive"));
    }
    let applied = state.service.process_all(limit).await?;
    Ok(Json(ProcessResponse { applied }))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Result<Json<StatsResponse>> {
    let cache = state.service.cache();
    let events = state.service.store().len().await?;

    Ok(Json(StatsResponse::new(
        cache.stats().await,
        cache.in_flight(),
        events,
    )))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
