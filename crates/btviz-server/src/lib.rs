//! HTTP/JSON API over the backtracking visualizer engines.
//!
//! Handlers are thin: they validate the request body, delegate to
//! `btviz-analysis` (static graph, static trace) or `btviz-exec` (executed
//! trace), and map failures onto [`error::ApiError`].

pub mod error;
pub mod handlers;
pub mod router;
pub mod schema;
pub mod state;
