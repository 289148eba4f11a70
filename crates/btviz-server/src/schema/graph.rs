//! Schema types for `POST /api/graph` and `POST /api/graph/dot`.

use serde::{Deserialize, Serialize};

use btviz_core::GraphNode;

/// Request body for the graph endpoints.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphRequest {
    /// Rust source containing a backtracking routine.
    #[serde(default)]
    pub code: String,

    /// Unrolling depth (default: server setting, clamped to 1..=10).
    pub max_depth: Option<usize>,
}

/// Response body for `POST /api/graph`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphResponse {
    pub max_depth: usize,
    pub nodes: Vec<GraphNode>,
}
