//! Static graph handlers.

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;

use btviz_analysis::{build_static_graph, GraphOptions};
use btviz_core::StaticGraph;

use super::require_code;
use crate::error::ApiError;
use crate::schema::common::ApiResponse;
use crate::schema::graph::{GraphRequest, GraphResponse};
use crate::state::AppState;

fn build(state: &AppState, request: &GraphRequest) -> Result<(GraphOptions, StaticGraph), ApiError> {
    require_code(&request.code)?;
    let options = match request.max_depth {
        Some(depth) => GraphOptions::with_max_depth(depth),
        None => state.graph,
    };
    let graph = build_static_graph(&request.code, options)?;
    tracing::info!(nodes = graph.len(), max_depth = options.max_depth, "static graph built");
    Ok((options, graph))
}

/// Unrolls the first backtracking routine of the submitted code.
///
/// `POST /api/graph`
pub async fn build_graph(
    State(state): State<AppState>,
    Json(request): Json<GraphRequest>,
) -> Result<Json<ApiResponse<GraphResponse>>, ApiError> {
    let (options, graph) = build(&state, &request)?;
    Ok(Json(ApiResponse::ok(GraphResponse {
        max_depth: options.max_depth,
        nodes: graph.into_nodes(),
    })))
}

/// Same graph rendered as Graphviz DOT text.
///
/// `POST /api/graph/dot`
pub async fn graph_dot(
    State(state): State<AppState>,
    Json(request): Json<GraphRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (_, graph) = build(&state, &request)?;
    Ok(([(header::CONTENT_TYPE, "text/vnd.graphviz; charset=utf-8")], graph.to_dot()))
}
