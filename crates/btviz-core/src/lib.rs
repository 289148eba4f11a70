//! Data model and run-scoped trace machinery for backtracking visualization.
//!
//! - [`graph`] -- the bounded static decision graph ([`GraphNode`], [`StaticGraph`])
//! - [`trace`] -- ordered execution trace records ([`TraceStep`], [`StackFrame`])
//! - [`value`] -- tagged runtime values captured by instrumentation
//! - [`backtrace`] -- parsing and normalizing native call chains
//! - [`collector`] -- the per-run [`TraceCollector`]
//! - [`instrument`] -- the in-process `capture_step!` entry point

pub mod backtrace;
pub mod collector;
pub mod error;
pub mod graph;
pub mod instrument;
pub mod trace;
pub mod value;

pub use collector::{
    BacktraceInspector, CallChainInspector, FrameDenylist, SignatureIndex, TraceCollector,
};
pub use error::CoreError;
pub use graph::{GraphNode, NodeKind, StaticGraph};
pub use trace::{SourceLine, StackFrame, TraceStep};
pub use value::{TraceValue, Variables};
