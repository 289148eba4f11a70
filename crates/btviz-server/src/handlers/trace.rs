//! Trace handlers.
//!
//! The executed trace blocks on the compiler and the snippet process, so it
//! runs on the blocking pool. A client that disconnects drops the handler
//! future but not the blocking task, which always finishes its cleanup.

use std::time::Duration;

use axum::extract::State;
use axum::Json;
use uuid::Uuid;

use btviz_analysis::{find_instrumentation, static_trace, SyntaxTree};
use btviz_exec::run_trace;

use super::require_code;
use crate::error::ApiError;
use crate::schema::common::ApiResponse;
use crate::schema::trace::{TraceRequest, TraceResponse};
use crate::state::AppState;

/// Compiles and runs the submitted code, returning its recorded steps.
///
/// `POST /api/trace`
pub async fn trace(
    State(state): State<AppState>,
    Json(request): Json<TraceRequest>,
) -> Result<Json<ApiResponse<TraceResponse>>, ApiError> {
    require_code(&request.code)?;

    let run_id = Uuid::new_v4();
    let mut options = (*state.pipeline).clone();
    if let Some(ms) = request.timeout_ms.filter(|ms| *ms > 0) {
        options.timeout = Some(Duration::from_millis(ms));
    }

    let span = tracing::info_span!("trace_request", %run_id);
    let code = request.code;
    let (steps, warnings) = tokio::task::spawn_blocking(move || {
        span.in_scope(|| {
            let warnings = instrumentation_warnings(&code);
            run_trace(&code, &options).map(|steps| (steps, warnings))
        })
    })
    .await
    .map_err(|err| ApiError::InternalError(format!("trace task failed: {err}")))??;

    Ok(Json(ApiResponse::ok_with_warnings(
        TraceResponse {
            run_id,
            is_static: false,
            steps,
        },
        warnings,
    )))
}

/// Notes for code that parses but contains no `capture_step!` calls.
fn instrumentation_warnings(code: &str) -> Vec<String> {
    match SyntaxTree::parse(code) {
        Ok(tree) if find_instrumentation(&tree).is_empty() => {
            vec!["no capture_step! calls found; the trace will be empty".to_string()]
        }
        _ => Vec::new(),
    }
}

/// Builds a trace from the literal arguments of `capture_step!` calls
/// without compiling anything.
///
/// `POST /api/trace/static`
pub async fn trace_static(Json(request): Json<TraceRequest>) -> Result<Json<ApiResponse<TraceResponse>>, ApiError> {
    require_code(&request.code)?;
    let run_id = Uuid::new_v4();
    let steps = static_trace(&request.code)?;
    tracing::info!(%run_id, steps = steps.len(), "static trace built");
    Ok(Json(ApiResponse::ok(TraceResponse {
        run_id,
        is_static: true,
        steps,
    })))
}
