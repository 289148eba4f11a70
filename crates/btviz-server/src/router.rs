//! Router assembly for the HTTP API.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Builds the complete router.
///
/// CORS is permissive (the renderer is served from another origin).
/// TraceLayer provides request-level logging via tracing.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/graph", post(handlers::graph::build_graph))
        .route("/api/graph/dot", post(handlers::graph::graph_dot))
        .route("/api/trace", post(handlers::trace::trace))
        .route("/api/trace/static", post(handlers::trace::trace_static))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
