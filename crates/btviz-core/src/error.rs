//! Core error types for btviz-core.
//!
//! Uses `thiserror` for structured, matchable variants covering violations of
//! the static graph invariants.

use thiserror::Error;

/// Core errors produced by the btviz-core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Two nodes in one graph share an id.
    #[error("duplicate node id: '{id}'")]
    DuplicateNode { id: String },

    /// A child reference names a node that was never materialized.
    #[error("node '{parent}' references missing child '{child}'")]
    DanglingChild { parent: String, child: String },

    /// A structural invariant of the graph does not hold.
    #[error("graph inconsistency: {reason}")]
    GraphInconsistency { reason: String },
}
