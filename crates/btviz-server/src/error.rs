//! API error types with HTTP status code mapping.
//!
//! [`ApiError`] is the unified error type for all endpoints. Problems with
//! the submitted code are 422s carrying a message the user can act on;
//! malformed requests are 400s; anything else is a 500.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use btviz_analysis::AnalysisError;
use btviz_exec::{CompileFailure, ExecutionFailure, TraceError};

const REWRITE_HINT: &str = "rewrite your code to match the expected shape";

/// Structured error detail in API responses.
#[derive(Debug, Clone, Serialize)]
pub struct ApiErrorDetail {
    /// Machine-readable error code (e.g., "PATTERN_NOT_FOUND").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Optional structured details (diagnostics, failure description).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Invalid request (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The code is not valid Rust (422).
    #[error("syntax error at {line}:{column}: {message}")]
    Syntax {
        message: String,
        line: usize,
        column: usize,
    },

    /// No backtracking routine in the code (422).
    #[error("{0}")]
    PatternNotFound(String),

    /// No top-level unit to build (422).
    #[error("{0}")]
    NoDeclaration(String),

    /// No `capture_step!` calls (422).
    #[error("{0}")]
    NoInstrumentation(String),

    /// The toolchain rejected the code (422).
    #[error("compilation failed")]
    CompileFailed(CompileFailure),

    /// The code failed while running (422).
    #[error("execution error: {0}")]
    ExecutionFailed(ExecutionFailure),

    /// Internal server error (500).
    #[error("internal error: {0}")]
    InternalError(String),
}

impl ApiError {
    fn status_and_detail(&self) -> (StatusCode, ApiErrorDetail) {
        let unprocessable = |code: &str, message: String, details: Option<serde_json::Value>| {
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                ApiErrorDetail {
                    code: code.to_string(),
                    message,
                    details,
                },
            )
        };
        match self {
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ApiErrorDetail {
                    code: "BAD_REQUEST".to_string(),
                    message: msg.clone(),
                    details: None,
                },
            ),
            ApiError::Syntax { line, column, .. } => unprocessable(
                "SYNTAX_ERROR",
                self.to_string(),
                Some(serde_json::json!({ "line": line, "column": column })),
            ),
            ApiError::PatternNotFound(msg) => {
                unprocessable("PATTERN_NOT_FOUND", format!("{msg}; {REWRITE_HINT}"), None)
            }
            ApiError::NoDeclaration(msg) => {
                unprocessable("NO_DECLARATION", format!("{msg}; {REWRITE_HINT}"), None)
            }
            ApiError::NoInstrumentation(msg) => {
                unprocessable("NO_INSTRUMENTATION", format!("{msg}; {REWRITE_HINT}"), None)
            }
            ApiError::CompileFailed(failure) => unprocessable(
                "COMPILE_ERROR",
                failure.to_string(),
                serde_json::to_value(&failure.diagnostics).ok(),
            ),
            ApiError::ExecutionFailed(failure) => unprocessable(
                "EXECUTION_ERROR",
                failure.to_string(),
                serde_json::to_value(failure).ok(),
            ),
            ApiError::InternalError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiErrorDetail {
                    code: "INTERNAL_ERROR".to_string(),
                    message: msg.clone(),
                    details: None,
                },
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = self.status_and_detail();
        if status.is_server_error() {
            tracing::error!(code = %detail.code, "{}", detail.message);
        } else {
            tracing::info!(code = %detail.code, "request rejected");
        }

        let body = serde_json::json!({
            "success": false,
            "error": detail,
        });

        (status, axum::Json(body)).into_response()
    }
}

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::Syntax { message, line, column } => ApiError::Syntax { message, line, column },
            AnalysisError::PatternNotFound => ApiError::PatternNotFound(err.to_string()),
            AnalysisError::NoInstrumentation => ApiError::NoInstrumentation(err.to_string()),
            AnalysisError::Graph(_) => ApiError::InternalError(err.to_string()),
        }
    }
}

impl From<TraceError> for ApiError {
    fn from(err: TraceError) -> Self {
        match err {
            TraceError::NoDeclaration => ApiError::NoDeclaration(err.to_string()),
            TraceError::Compile(failure) => ApiError::CompileFailed(failure),
            TraceError::Execution(failure) => ApiError::ExecutionFailed(failure),
        }
    }
}
