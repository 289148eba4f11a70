//! Schema types for `POST /api/trace` and `POST /api/trace/static`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use btviz_core::TraceStep;

/// Request body for the trace endpoints.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceRequest {
    /// Rust source instrumented with `capture_step!`.
    #[serde(default)]
    pub code: String,

    /// Run time limit in milliseconds (default: server setting; 0 keeps it).
    /// Ignored by the static endpoint.
    pub timeout_ms: Option<u64>,
}

/// Response body for both trace endpoints.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceResponse {
    /// Identifier of this run, also recorded on its log span.
    pub run_id: Uuid,
    /// `true` when the steps came from the syntax tree without running
    /// anything.
    pub is_static: bool,
    pub steps: Vec<TraceStep>,
}
