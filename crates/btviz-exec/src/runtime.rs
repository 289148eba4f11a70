//! Source of the `btviz_trace` support crate.
//!
//! Compiled next to every snippet so `capture_step!` is available through
//! `--extern btviz_trace`. Kept as a standalone file so it can be read and
//! built as ordinary Rust.

/// Crate name the support library is built under.
pub const SUPPORT_CRATE: &str = "btviz_trace";

/// File name the support source is written to inside a workspace.
pub const SUPPORT_FILE: &str = "__btviz_trace.rs";

pub const SUPPORT_SOURCE: &str = include_str!("../runtime/btviz_trace.rs");

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::{CAPTURE_BACKTRACE_ENV, SINK_FAILURE_EXIT, TRACE_FILE_ENV};

    #[test]
    fn support_source_matches_launcher_contract() {
        assert!(SUPPORT_SOURCE.contains("macro_rules! capture_step"));
        assert!(SUPPORT_SOURCE.contains(&format!("\"{TRACE_FILE_ENV}\"")));
        assert!(SUPPORT_SOURCE.contains(&format!("\"{CAPTURE_BACKTRACE_ENV}\"")));
        assert!(SUPPORT_SOURCE.contains(&format!("SINK_FAILURE_EXIT: i32 = {SINK_FAILURE_EXIT};")));
    }
}
