//! Sandboxed compile-and-execute trace pipeline.
//!
//! A snippet is written to a private temporary directory, compiled with the
//! host `rustc` against a per-run `btviz_trace` support crate, and run once
//! in a child process. The child reports each `capture_step!` call on an
//! event file, which is replayed into a fresh
//! [`TraceCollector`](btviz_core::TraceCollector).
//!
//! # Modules
//!
//! - [`error`] -- the three-way [`TraceError`] taxonomy
//! - [`workspace`] -- the temporary directory and its cleanup
//! - [`toolchain`] -- the compiler surface and its `rustc` implementation
//! - [`runtime`] -- source of the support crate
//! - [`launcher`] -- child process lifecycle and failure classification
//! - [`protocol`] -- decoding the child's event stream
//! - [`pipeline`] -- the whole run

pub mod error;
pub mod launcher;
pub mod pipeline;
pub mod protocol;
pub mod runtime;
pub mod toolchain;
pub mod workspace;

pub use error::{CompileFailure, Diagnostic, ExecutionFailure, FailureKind, TraceError};
pub use pipeline::{run_trace, run_trace_with};
pub use toolchain::{RustcToolchain, Toolchain};

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Options controlling a trace run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// Compiler executable.
    pub rustc: PathBuf,

    /// Rust edition snippets are compiled under.
    pub edition: String,

    /// Parent directory for run workspaces.
    /// `None` means the system temporary directory.
    pub work_root: Option<PathBuf>,

    /// Wall-clock limit for the snippet process. `None` waits indefinitely.
    pub timeout: Option<Duration>,

    /// Whether the child captures a native backtrace for every step.
    /// Without it, stacks contain only the call site.
    pub capture_backtraces: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            rustc: PathBuf::from("rustc"),
            edition: "2021".to_string(),
            work_root: None,
            timeout: None,
            capture_backtraces: true,
        }
    }
}

impl PipelineOptions {
    /// Defaults overridden by `BTVIZ_RUSTC` (or `RUSTC`), `BTVIZ_WORK_ROOT`
    /// and `BTVIZ_RUN_TIMEOUT_MS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut options = PipelineOptions::default();
        if let Some(rustc) = lookup("BTVIZ_RUSTC").or_else(|| lookup("RUSTC")) {
            options.rustc = PathBuf::from(rustc);
        }
        if let Some(root) = lookup("BTVIZ_WORK_ROOT").filter(|r| !r.is_empty()) {
            options.work_root = Some(PathBuf::from(root));
        }
        match lookup("BTVIZ_RUN_TIMEOUT_MS").map(|ms| ms.trim().parse::<u64>()) {
            Some(Ok(ms)) if ms > 0 => options.timeout = Some(Duration::from_millis(ms)),
            Some(Ok(_)) | None => {}
            Some(Err(err)) => tracing::warn!(error = %err, "ignoring invalid BTVIZ_RUN_TIMEOUT_MS"),
        }
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_pipeline_options() {
        let opts = PipelineOptions::default();
        assert_eq!(opts.rustc, PathBuf::from("rustc"));
        assert_eq!(opts.edition, "2021");
        assert!(opts.work_root.is_none());
        assert!(opts.timeout.is_none());
        assert!(opts.capture_backtraces);
    }

    #[test]
    fn env_overrides() {
        let opts = PipelineOptions::from_lookup(lookup(&[
            ("RUSTC", "/opt/rustc"),
            ("BTVIZ_WORK_ROOT", "/srv/btviz"),
            ("BTVIZ_RUN_TIMEOUT_MS", "1500"),
        ]));
        assert_eq!(opts.rustc, PathBuf::from("/opt/rustc"));
        assert_eq!(opts.work_root, Some(PathBuf::from("/srv/btviz")));
        assert_eq!(opts.timeout, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn btviz_rustc_wins_over_rustc() {
        let opts = PipelineOptions::from_lookup(lookup(&[("RUSTC", "a"), ("BTVIZ_RUSTC", "b")]));
        assert_eq!(opts.rustc, PathBuf::from("b"));
    }

    #[test]
    fn bad_or_zero_timeout_means_none() {
        let opts = PipelineOptions::from_lookup(lookup(&[("BTVIZ_RUN_TIMEOUT_MS", "soon")]));
        assert!(opts.timeout.is_none());
        let opts = PipelineOptions::from_lookup(lookup(&[("BTVIZ_RUN_TIMEOUT_MS", "0")]));
        assert!(opts.timeout.is_none());
    }
}
