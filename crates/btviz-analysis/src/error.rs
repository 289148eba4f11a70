//! Analysis error types.

use btviz_core::CoreError;
use serde::Serialize;

/// Errors produced while analyzing a snippet's syntax tree.
#[derive(Debug, Clone, Serialize, thiserror::Error)]
pub enum AnalysisError {
    /// The snippet is not valid Rust.
    #[error("syntax error at {line}:{column}: {message}")]
    Syntax {
        message: String,
        line: usize,
        column: usize,
    },

    /// No routine contains both a self-call and a loop.
    #[error("no backtracking routine found: expected a function that calls itself from inside a loop")]
    PatternNotFound,

    /// The snippet has no `capture_step!` calls.
    #[error("no capture_step! calls found: annotate the snippet with capture_step!(action, details, ...)")]
    NoInstrumentation,

    /// A finished graph violated its structural invariants.
    #[error("graph invariant violated: {0}")]
    Graph(String),
}

impl From<syn::Error> for AnalysisError {
    fn from(err: syn::Error) -> Self {
        let start = err.span().start();
        AnalysisError::Syntax {
            message: err.to_string(),
            line: start.line,
            column: start.column + 1,
        }
    }
}

impl From<CoreError> for AnalysisError {
    fn from(err: CoreError) -> Self {
        AnalysisError::Graph(err.to_string())
    }
}
