//! Bounded unrolling of a backtracking routine into a [`StaticGraph`].
//!
//! The routine body is summarized once. Each unrolling level then becomes a
//! `decision` node named `<routine>_<depth>`, pushed into the arena before
//! its children are visited so the output is in pre-order. A visited set and
//! the depth ceiling together bound the graph at `max_depth + 2` nodes.

use std::collections::HashSet;

use btviz_core::graph::{decision_id, BACKTRACK_MARKER};
use btviz_core::{GraphNode, StaticGraph};
use serde::{Deserialize, Serialize};

use crate::detector::find_backtracking;
use crate::error::AnalysisError;
use crate::syntax::{calls_named, guarded_returns, return_expressions, Routine, SyntaxTree};

/// Default unrolling depth.
pub const DEFAULT_MAX_DEPTH: usize = 5;
/// Largest accepted unrolling depth.
pub const MAX_DEPTH_LIMIT: usize = 10;

/// Options for static graph construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphOptions {
    /// Number of decision levels to unroll, clamped to `1..=10`.
    pub max_depth: usize,
}

impl Default for GraphOptions {
    fn default() -> Self {
        GraphOptions {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl GraphOptions {
    pub fn with_max_depth(max_depth: usize) -> Self {
        GraphOptions {
            max_depth: max_depth.clamp(1, MAX_DEPTH_LIMIT),
        }
    }

    fn effective_depth(&self) -> usize {
        self.max_depth.clamp(1, MAX_DEPTH_LIMIT)
    }
}

/// Parses `source`, selects the first backtracking routine and unrolls it.
pub fn build_static_graph(source: &str, options: GraphOptions) -> Result<StaticGraph, AnalysisError> {
    let tree = SyntaxTree::parse(source)?;
    let routine = find_backtracking(&tree).ok_or(AnalysisError::PatternNotFound)?;
    graph_for_routine(&routine, options)
}

/// Unrolls an already selected routine.
pub fn graph_for_routine(routine: &Routine<'_>, options: GraphOptions) -> Result<StaticGraph, AnalysisError> {
    let name = routine.name();
    let summary = BodySummary::of(routine, &name);

    let mut builder = Builder {
        name: &name,
        summary: &summary,
        max_depth: options.effective_depth(),
        visited: HashSet::new(),
        graph: StaticGraph::new(),
    };
    builder.graph.push(GraphNode::start(&name));
    builder.materialize(0);
    builder.graph.push(GraphNode::end());

    let graph = builder.graph;
    graph.validate()?;
    Ok(graph)
}

/// What every unrolled level of the routine shares.
struct BodySummary {
    parameters: Vec<String>,
    return_expressions: Vec<String>,
    self_calls: usize,
}

impl BodySummary {
    fn of(routine: &Routine<'_>, name: &str) -> Self {
        let mut returns = return_expressions(routine.block);
        let guards = guarded_returns(routine.block).len();
        returns.extend(std::iter::repeat(BACKTRACK_MARKER.to_string()).take(guards));
        BodySummary {
            parameters: routine.param_decls(),
            return_expressions: returns,
            self_calls: calls_named(routine.block, name).len(),
        }
    }
}

struct Builder<'a> {
    name: &'a str,
    summary: &'a BodySummary,
    max_depth: usize,
    visited: HashSet<String>,
    graph: StaticGraph,
}

impl Builder<'_> {
    fn materialize(&mut self, depth: usize) {
        let id = decision_id(self.name, depth);
        if depth >= self.max_depth || !self.visited.insert(id) {
            return;
        }

        let mut node = GraphNode::decision(self.name, depth);
        node.parameters = self.summary.parameters.clone();
        node.return_expressions = self.summary.return_expressions.clone();
        let slot = self.graph.push(node);

        for _ in 0..self.summary.self_calls {
            // The level below would not be materialized; leave no dangling edge.
            if depth + 1 >= self.max_depth {
                break;
            }
            let child = decision_id(self.name, depth + 1);
            if self.visited.contains(&child) {
                continue;
            }
            if let Some(node) = self.graph.node_mut(slot) {
                node.children.push(child);
            }
            self.materialize(depth + 1);
        }
    }
}
