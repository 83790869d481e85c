//! Axum router — maps all URL paths to handlers.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use std::sync::Arc;
use crate::state::{AppState, SharedState};
use crate::handlers::{
    agents::{get_agent, list_agents, update_agent},
    slr::{cancel, feedback, list_jobs, run, status, upload},
    system::health,
};
use crate::sse::sse_handler;

/// Build and return the full Axum router.
pub fn build_router(state: AppState) -> Router {
    let max_upload = state.config.server.max_upload_bytes;
    let shared: SharedState = Arc::new(state);

    Router::new()
        .route("/health", get(health))

        // SSE streaming
        .route("/api/events", get(sse_handler))

        // SLR pipeline
        .route("/api/slr/upload",              post(upload))
        .route("/api/slr/run",                 post(run))
        .route("/api/slr/status/{job_id}",     get(status))
        .route("/api/slr/jobs",                get(list_jobs))
        .route("/api/slr/jobs/{job_id}/cancel", post(cancel))
        .route("/api/slr/feedback",            post(feedback))

        // Agents
        .route("/api/agents",      get(list_agents))
        .route("/api/agents/{id}", get(get_agent).put(update_agent))

        // Middleware
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}
