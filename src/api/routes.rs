//! API Routes
//!
//! Configures the Axum router with all fee ledger endpoints.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    fee_info_handler, health_handler, ingest_handler, mark_processed_handler, pending_handler,
    process_handler, stats_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `POST /events` - Ingest a batch of raw events
/// - `GET /events/pending/:contract` - List pending events in chain order
/// - `POST /events/:id/processed` - Mark one event processed
/// - `POST /process` - Apply pending events of every contract
/// - `GET /fees/:contract` - Cached fee aggregate of a contract
/// - `GET /stats` - Cache and store statistics
/// - `GET /health` - Health check endpoint
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/events", post(ingest_handler))
        .route("/events/pending/:contract", get(pending_handler))
        .route("/events/:id/processed", post(mark_processed_handler))
        .route("/process", post(process_handler))
        .route("/fees/:contract", get(fee_info_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
