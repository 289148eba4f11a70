//! Binary entrypoint for the btviz HTTP server.
//!
//! Reads configuration from environment variables:
//! - `BTVIZ_PORT`: listen port (default: 3001)
//! - `BTVIZ_MAX_DEPTH`: default graph unrolling depth (default: 5)
//! - `BTVIZ_RUSTC`, `BTVIZ_WORK_ROOT`, `BTVIZ_RUN_TIMEOUT_MS`: trace pipeline

use btviz_server::router::build_router;
use btviz_server::state::{AppState, DEFAULT_PORT};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();

    let port = std::env::var("BTVIZ_PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);

    let state = AppState::from_env();
    tracing::info!(
        max_depth = state.graph.max_depth,
        rustc = %state.pipeline.rustc.display(),
        timeout = ?state.pipeline.timeout,
        "configuration loaded"
    );
    let app = build_router(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!("btviz server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await
}
