//! The bounded static decision graph.
//!
//! [`StaticGraph`] is a flat, append-only arena of [`GraphNode`]s. Children
//! are non-owning id references; during construction a child may name a node
//! that is materialized later, and [`StaticGraph::validate`] checks that every
//! reference resolves once construction is done.

use std::collections::HashMap;
use std::fmt::{self, Write as _};

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Id of the single entry node.
pub const START_ID: &str = "start";
/// Id of the single exit node.
pub const END_ID: &str = "end";
/// Marker appended to `return_expressions` for each early-return guard.
pub const BACKTRACK_MARKER: &str = "backtrack";

/// Role of a node in the decision graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Start,
    Decision,
    Backtrack,
    End,
}

impl NodeKind {
    /// Fill colour used by the DOT export.
    pub fn color(self) -> &'static str {
        match self {
            NodeKind::Start => "#4CAF50",
            NodeKind::End => "#F44336",
            NodeKind::Backtrack => "#FFC107",
            NodeKind::Decision => "#2196F3",
        }
    }
}

/// One node of the static graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    pub kind: NodeKind,
    pub parameters: Vec<String>,
    pub return_expressions: Vec<String>,
    pub children: Vec<String>,
}

impl GraphNode {
    fn terminal(id: &str, label: &str, kind: NodeKind) -> Self {
        GraphNode {
            id: id.to_string(),
            label: label.to_string(),
            kind,
            parameters: Vec::new(),
            return_expressions: Vec::new(),
            children: Vec::new(),
        }
    }

    /// The entry node, pointing at the first unrolled level of `routine`.
    pub fn start(routine: &str) -> Self {
        let mut node = Self::terminal(START_ID, "Start", NodeKind::Start);
        node.children.push(decision_id(routine, 0));
        node
    }

    pub fn end() -> Self {
        Self::terminal(END_ID, "End", NodeKind::End)
    }

    /// An empty decision node for `routine` at unrolling `depth`.
    pub fn decision(routine: &str, depth: usize) -> Self {
        GraphNode {
            id: decision_id(routine, depth),
            label: format!("Recursion {depth}"),
            kind: NodeKind::Decision,
            parameters: Vec::new(),
            return_expressions: Vec::new(),
            children: Vec::new(),
        }
    }
}

impl fmt::Display for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label, self.id)
    }
}

/// Synthetic id of the decision node for `routine` at `depth`.
pub fn decision_id(routine: &str, depth: usize) -> String {
    format!("{routine}_{depth}")
}

/// Append-only node arena for one graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticGraph {
    nodes: Vec<GraphNode>,
}

impl StaticGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a node and returns its arena slot.
    pub fn push(&mut self, node: GraphNode) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Mutable access to a previously pushed node.
    pub fn node_mut(&mut self, slot: usize) -> Option<&mut GraphNode> {
        self.nodes.get_mut(slot)
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn into_nodes(self) -> Vec<GraphNode> {
        self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Checks the structural invariants of a finished graph.
    ///
    /// Exactly one start and one end node, unique ids, every child id
    /// resolvable, and no cycles.
    pub fn validate(&self) -> Result<(), CoreError> {
        for kind in [NodeKind::Start, NodeKind::End] {
            let count = self.nodes.iter().filter(|n| n.kind == kind).count();
            if count != 1 {
                return Err(CoreError::GraphInconsistency {
                    reason: format!("expected exactly one {kind:?} node, found {count}"),
                });
            }
        }

        let mut graph: DiGraph<&str, ()> = DiGraph::new();
        let mut index: HashMap<&str, NodeIndex> = HashMap::new();
        for node in &self.nodes {
            if index.insert(&node.id, graph.add_node(&node.id)).is_some() {
                return Err(CoreError::DuplicateNode { id: node.id.clone() });
            }
        }

        for node in &self.nodes {
            let from = index[node.id.as_str()];
            for child in &node.children {
                let to = index
                    .get(child.as_str())
                    .ok_or_else(|| CoreError::DanglingChild {
                        parent: node.id.clone(),
                        child: child.clone(),
                    })?;
                graph.add_edge(from, *to, ());
            }
        }

        if is_cyclic_directed(&graph) {
            return Err(CoreError::GraphInconsistency {
                reason: "child references form a cycle".to_string(),
            });
        }
        Ok(())
    }

    /// Renders the graph as Graphviz DOT text.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph backtracking {\n");
        out.push_str("    node [shape=rectangle, style=filled, fontname=\"Helvetica\"];\n");
        for node in &self.nodes {
            let _ = writeln!(
                out,
                "    \"{}\" [fillcolor=\"{}\", label=<{}>];",
                escape_quoted(&node.id),
                node.kind.color(),
                html_label(node)
            );
        }
        for node in &self.nodes {
            for child in &node.children {
                let _ = writeln!(
                    out,
                    "    \"{}\" -> \"{}\";",
                    escape_quoted(&node.id),
                    escape_quoted(child)
                );
            }
        }
        out.push_str("}\n");
        out
    }
}

fn html_label(node: &GraphNode) -> String {
    let mut label = String::from(
        "<table border='0' cellborder='1' cellspacing='0' cellpadding='4'>",
    );
    let _ = write!(label, "<tr><td><b>{}</b></td></tr>", escape_html(&node.label));
    if !node.parameters.is_empty() {
        label.push_str("<tr><td><b>Parameters:</b></td></tr>");
        for param in &node.parameters {
            let _ = write!(label, "<tr><td>{}</td></tr>", escape_html(param));
        }
    }
    if !node.return_expressions.is_empty() {
        label.push_str("<tr><td><b>Returns:</b></td></tr>");
        for ret in &node.return_expressions {
            let _ = write!(label, "<tr><td>{}</td></tr>", escape_html(ret));
        }
    }
    label.push_str("</table>");
    label
}

fn escape_quoted(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
