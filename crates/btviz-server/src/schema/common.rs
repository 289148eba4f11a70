//! Common API response wrapper types.

use serde::Serialize;

/// Standard envelope for successful responses.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T: Serialize> {
    /// Always `true` for successful responses.
    pub success: bool,
    pub data: T,
    /// Non-blocking notes about the submitted code.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        ApiResponse {
            success: true,
            data,
            warnings: Vec::new(),
        }
    }

    pub fn ok_with_warnings(data: T, warnings: Vec<String>) -> Self {
        ApiResponse {
            success: true,
            data,
            warnings,
        }
    }
}

/// Health probe body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}
