//! HTTP handler modules.
//!
//! Each handler parses its request, delegates to the analysis or execution
//! crate, and wraps the result. No business logic lives here.

pub mod graph;
pub mod health;
pub mod trace;

use crate::error::ApiError;

/// Rejects requests whose `code` field is missing or blank.
pub(crate) fn require_code(code: &str) -> Result<(), ApiError> {
    if code.trim().is_empty() {
        return Err(ApiError::BadRequest("no code provided".to_string()));
    }
    Ok(())
}
