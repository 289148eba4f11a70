//! Static analysis of backtracking snippets.
//!
//! Everything here works on the syntax tree only; nothing is compiled or
//! executed.
//!
//! - [`syntax`] -- the queryable tree view over a parsed snippet
//! - [`detector`] -- decides whether a routine is a backtracking routine
//! - [`builder`] -- bounded unrolling of a routine into a static graph
//! - [`scan`] -- locating `capture_step!` calls without running anything

pub mod builder;
pub mod detector;
pub mod error;
pub mod scan;
pub mod syntax;

pub use builder::{build_static_graph, graph_for_routine, GraphOptions};
pub use detector::{find_backtracking, is_backtracking};
pub use error::AnalysisError;
pub use scan::{find_instrumentation, static_trace, CaptureSite};
pub use syntax::{Routine, SyntaxTree};
