//! Shared application state.
//!
//! The server holds configuration only. Every trace run builds its own
//! collector and workspace, so handlers share nothing mutable.

use std::sync::Arc;

use btviz_analysis::GraphOptions;
use btviz_exec::PipelineOptions;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 3001;

#[derive(Debug, Clone)]
pub struct AppState {
    /// Defaults for static graph requests.
    pub graph: GraphOptions,
    /// Defaults for trace runs.
    pub pipeline: Arc<PipelineOptions>,
}

impl AppState {
    pub fn new(graph: GraphOptions, pipeline: PipelineOptions) -> Self {
        AppState {
            graph,
            pipeline: Arc::new(pipeline),
        }
    }

    /// State configured from `BTVIZ_MAX_DEPTH` and the pipeline variables
    /// read by [`PipelineOptions::from_env`].
    pub fn from_env() -> Self {
        let graph = match std::env::var("BTVIZ_MAX_DEPTH").ok().map(|v| v.trim().parse::<usize>()) {
            Some(Ok(depth)) => GraphOptions::with_max_depth(depth),
            Some(Err(err)) => {
                tracing::warn!(error = %err, "ignoring invalid BTVIZ_MAX_DEPTH");
                GraphOptions::default()
            }
            None => GraphOptions::default(),
        };
        AppState::new(graph, PipelineOptions::from_env())
    }
}

impl Default for AppState {
    fn default() -> Self {
        AppState::new(GraphOptions::default(), PipelineOptions::default())
    }
}
