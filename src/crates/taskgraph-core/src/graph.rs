//! Graph model - nodes, edges, and the validated, immutable definition
//!
//! A [`GraphDefinition`] is the static topology every run executes against. It
//! is built once, validated completely, and then shared read-only (typically
//! behind an `Arc`) across any number of concurrent runs.
//!
//! # Structure
//!
//! ```text
//! entry ──► planner ──► agent_reasoner ──► action_executor ──end──► __end__
//!                            ▲    ▲               │  │
//!                            │    └───continue────┘  │retry
//!                            │                       ▼
//!                      plan_updater ◄────────── researcher
//! ```
//!
//! - **Unconditional edges** carry no label and are taken whenever the source
//!   node completes.
//! - **Conditional edges** carry a label and are taken when the source node's
//!   outcome label matches.
//! - The terminal sentinel [`END`] is a destination only; it is never a node.
//!
//! Cycles are ordinary: re-entering `agent_reasoner` is just another table
//! lookup in the [`Router`].
//!
//! # Examples
//!
//! ```rust,ignore
//! use taskgraph_core::graph::{GraphBuilder, END};
//!
//! let mut builder = GraphBuilder::new();
//! builder
//!     .add_node("planner", planner)
//!     .add_node("executor", executor)
//!     .add_edge("planner", "executor")
//!     .add_conditional_edge("executor", "end", END)
//!     .add_conditional_edge("executor", "continue", "planner")
//!     .set_entry("planner");
//!
//! let graph = builder.build()?;
//! ```

use crate::error::{ValidationError, ValidationIssue};
use crate::node::{GraphState, NodeAdapter};
use crate::router::Router;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

/// Terminal sentinel destination
pub const END: &str = "__end__";

/// Pseudo-node used only when rendering the entry arrow
pub const START: &str = "__start__";

/// Where a run goes after a node completes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Destination {
    /// Continue with the named node
    Node(String),
    /// The run is complete
    End,
}

impl Destination {
    /// Destination naming a node
    pub fn node(name: impl Into<String>) -> Self {
        Self::Node(name.into())
    }

    /// Parse a destination name, mapping [`END`] to [`Destination::End`]
    pub fn parse(name: &str) -> Self {
        if name == END {
            Self::End
        } else {
            Self::Node(name.to_string())
        }
    }

    /// Name as it appears in edges (`END` for the sentinel)
    pub fn as_str(&self) -> &str {
        match self {
            Self::Node(name) => name,
            Self::End => END,
        }
    }

    /// Whether this is the terminal sentinel
    pub fn is_end(&self) -> bool {
        matches!(self, Self::End)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directed transition between nodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    /// Source node
    pub from: String,
    /// Destination node or the terminal sentinel
    pub to: Destination,
    /// Outcome label for conditional edges
    pub label: Option<String>,
}

impl Edge {
    /// Unconditional edge; `to == END` targets the sentinel
    pub fn new(from: impl Into<String>, to: impl AsRef<str>) -> Self {
        Self {
            from: from.into(),
            to: Destination::parse(to.as_ref()),
            label: None,
        }
    }

    /// Edge taken when `from` completes with `label`
    pub fn conditional(
        from: impl Into<String>,
        label: impl Into<String>,
        to: impl AsRef<str>,
    ) -> Self {
        Self {
            from: from.into(),
            to: Destination::parse(to.as_ref()),
            label: Some(label.into()),
        }
    }

    /// Whether this edge is selected by an outcome label
    pub fn is_conditional(&self) -> bool {
        self.label.is_some()
    }
}

/// Named stage wrapping one behavior
///
/// The node only holds a shared reference; the behavior may outlive the graph.
pub struct Node<S> {
    /// Unique node name
    pub name: String,
    /// Behavior invoked when the run reaches this node
    pub adapter: Arc<dyn NodeAdapter<S>>,
}

impl<S: GraphState> Node<S> {
    /// Create a node from a shared adapter
    pub fn new(name: impl Into<String>, adapter: Arc<dyn NodeAdapter<S>>) -> Self {
        Self {
            name: name.into(),
            adapter,
        }
    }
}

impl<S> Clone for Node<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            adapter: Arc::clone(&self.adapter),
        }
    }
}

impl<S> fmt::Debug for Node<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("adapter", &"<adapter>")
            .finish()
    }
}

/// Validated, immutable graph topology
pub struct GraphDefinition<S> {
    nodes: Vec<Node<S>>,
    index: HashMap<String, usize>,
    edges: Vec<Edge>,
    entry: String,
    router: Router,
}

impl<S: GraphState> GraphDefinition<S> {
    /// Validate `nodes`, `edges`, and `entry` and build the definition
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] listing every problem found. No partial
    /// graph is ever returned.
    pub fn build(
        nodes: Vec<Node<S>>,
        edges: Vec<Edge>,
        entry: Option<String>,
    ) -> Result<Self, ValidationError> {
        let issues = validate(&nodes, &edges, entry.as_deref());
        if !issues.is_empty() {
            return Err(ValidationError { issues });
        }

        // validate() reports MissingEntry, so entry is present here
        let entry = entry.unwrap_or_default();
        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.name.clone(), i))
            .collect();
        let router = Router::from_edges(&edges);

        let graph = Self {
            nodes,
            index,
            edges,
            entry,
            router,
        };
        graph.warn_unreachable();

        tracing::debug!(
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            entry = %graph.entry,
            "Graph built"
        );
        Ok(graph)
    }

    /// Designated entry node
    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Look up a node by name
    pub fn node(&self, name: &str) -> Option<&Node<S>> {
        self.index.get(name).map(|&i| &self.nodes[i])
    }

    /// Whether a node with this name exists
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Nodes in insertion order
    pub fn nodes(&self) -> &[Node<S>] {
        &self.nodes
    }

    /// Edges in insertion order
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Outgoing edges of `node`, in insertion order
    pub fn outgoing<'a>(&'a self, node: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.from == node)
    }

    /// Routing table derived from the edges
    pub fn router(&self) -> &Router {
        &self.router
    }

    fn warn_unreachable(&self) {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue = VecDeque::from([self.entry.as_str()]);
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current) {
                continue;
            }
            for edge in self.outgoing(current) {
                if let Destination::Node(next) = &edge.to {
                    queue.push_back(next);
                }
            }
        }

        for node in &self.nodes {
            if !seen.contains(node.name.as_str()) {
                tracing::warn!(node = %node.name, "Node is unreachable from the entry");
            }
        }
    }
}

impl<S> fmt::Debug for GraphDefinition<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphDefinition")
            .field("nodes", &self.nodes)
            .field("edges", &self.edges)
            .field("entry", &self.entry)
            .finish()
    }
}

fn validate<S: GraphState>(
    nodes: &[Node<S>],
    edges: &[Edge],
    entry: Option<&str>,
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    let mut names: HashSet<&str> = HashSet::new();
    for node in nodes {
        if node.name.is_empty() || node.name == END || node.name == START {
            issues.push(ValidationIssue::ReservedNodeName(node.name.clone()));
        }
        if !names.insert(node.name.as_str()) {
            issues.push(ValidationIssue::DuplicateNode(node.name.clone()));
        }
    }

    match entry {
        None => issues.push(ValidationIssue::MissingEntry),
        Some(entry) if !names.contains(entry) => {
            issues.push(ValidationIssue::UnknownEntry(entry.to_string()));
        }
        Some(_) => {}
    }

    for edge in edges {
        if !names.contains(edge.from.as_str()) {
            issues.push(ValidationIssue::UnknownSource {
                from: edge.from.clone(),
            });
        }
        if let Destination::Node(to) = &edge.to {
            if !names.contains(to.as_str()) {
                issues.push(ValidationIssue::UnknownTarget {
                    from: edge.from.clone(),
                    to: to.clone(),
                });
            }
        }
    }

    let mut checked: HashSet<&str> = HashSet::new();
    for node in nodes {
        if !checked.insert(node.name.as_str()) {
            continue;
        }
        issues.extend(check_outgoing(node, edges));
    }

    issues
}

/// Edge-shape and label-vocabulary checks for one node
fn check_outgoing<S: GraphState>(node: &Node<S>, edges: &[Edge]) -> Vec<ValidationIssue> {
    let name = &node.name;
    let mut issues = Vec::new();

    let mut unconditional = 0usize;
    let mut labels: BTreeMap<&str, usize> = BTreeMap::new();
    for edge in edges.iter().filter(|e| &e.from == name) {
        match &edge.label {
            Some(label) => *labels.entry(label.as_str()).or_default() += 1,
            None => unconditional += 1,
        }
    }

    if unconditional == 0 && labels.is_empty() {
        issues.push(ValidationIssue::NoOutgoingEdges(name.clone()));
    }
    if unconditional > 1 {
        issues.push(ValidationIssue::AmbiguousUnconditional {
            node: name.clone(),
            count: unconditional,
        });
    }
    if unconditional > 0 && !labels.is_empty() {
        issues.push(ValidationIssue::MixedEdges(name.clone()));
    }
    for (label, count) in &labels {
        if *count > 1 {
            issues.push(ValidationIssue::DuplicateLabel {
                node: name.clone(),
                label: label.to_string(),
            });
        }
    }

    let declared: BTreeSet<String> = node.adapter.outcomes().into_iter().collect();
    if !declared.is_empty() || !labels.is_empty() {
        for label in &declared {
            if !labels.contains_key(label.as_str()) {
                issues.push(ValidationIssue::MissingLabel {
                    node: name.clone(),
                    label: label.clone(),
                });
            }
        }
        for label in labels.keys() {
            if !declared.contains(*label) {
                issues.push(ValidationIssue::UndeclaredLabel {
                    node: name.clone(),
                    label: label.to_string(),
                });
            }
        }
    }

    issues
}

/// Incremental builder for [`GraphDefinition`]
///
/// Nothing is checked until [`GraphBuilder::build`], which reports all issues
/// at once.
pub struct GraphBuilder<S> {
    nodes: Vec<Node<S>>,
    edges: Vec<Edge>,
    entry: Option<String>,
}

impl<S: GraphState> GraphBuilder<S> {
    /// Empty builder
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            entry: None,
        }
    }

    /// Add a node owning its adapter
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        adapter: impl NodeAdapter<S> + 'static,
    ) -> &mut Self {
        self.add_node_arc(name, Arc::new(adapter))
    }

    /// Add a node sharing an existing adapter
    pub fn add_node_arc(
        &mut self,
        name: impl Into<String>,
        adapter: Arc<dyn NodeAdapter<S>>,
    ) -> &mut Self {
        self.nodes.push(Node::new(name, adapter));
        self
    }

    /// Add an unconditional edge; use [`END`] as `to` to finish the run
    pub fn add_edge(&mut self, from: impl Into<String>, to: impl AsRef<str>) -> &mut Self {
        self.edges.push(Edge::new(from, to));
        self
    }

    /// Add an edge taken when `from` returns `label`
    pub fn add_conditional_edge(
        &mut self,
        from: impl Into<String>,
        label: impl Into<String>,
        to: impl AsRef<str>,
    ) -> &mut Self {
        self.edges.push(Edge::conditional(from, label, to));
        self
    }

    /// Designate the entry node
    pub fn set_entry(&mut self, name: impl Into<String>) -> &mut Self {
        self.entry = Some(name.into());
        self
    }

    /// Validate and freeze the topology
    pub fn build(self) -> Result<GraphDefinition<S>, ValidationError> {
        GraphDefinition::build(self.nodes, self.edges, self.entry)
    }
}

impl<S: GraphState> Default for GraphBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{FnNode, NodeOutput};
    use serde_json::Value;

    fn pass() -> FnNode<Value> {
        FnNode::new(|state: Value| async move { Ok(NodeOutput::new(state)) })
    }

    fn executor() -> FnNode<Value> {
        pass().with_outcomes(["end", "continue", "retry"])
    }

    fn reference_builder() -> GraphBuilder<Value> {
        let mut builder = GraphBuilder::new();
        builder
            .add_node("planner", pass())
            .add_node("agent_reasoner", pass())
            .add_node("action_executor", executor())
            .add_node("researcher", pass())
            .add_node("plan_updater", pass())
            .add_edge("planner", "agent_reasoner")
            .add_edge("agent_reasoner", "action_executor")
            .add_conditional_edge("action_executor", "end", END)
            .add_conditional_edge("action_executor", "continue", "agent_reasoner")
            .add_conditional_edge("action_executor", "retry", "researcher")
            .add_edge("researcher", "plan_updater")
            .add_edge("plan_updater", "agent_reasoner")
            .set_entry("planner");
        builder
    }

    #[test]
    fn test_reference_topology_builds() {
        let graph = reference_builder().build().unwrap();
        assert_eq!(graph.entry(), "planner");
        assert_eq!(graph.nodes().len(), 5);
        assert_eq!(graph.edges().len(), 7);
        assert!(graph.contains("researcher"));
        assert!(!graph.contains(END));
        assert_eq!(graph.outgoing("action_executor").count(), 3);
        assert!(graph.router().is_conditional("action_executor"));
    }

    #[test]
    fn test_destination_parse() {
        assert_eq!(Destination::parse(END), Destination::End);
        assert_eq!(Destination::parse("planner"), Destination::node("planner"));
        assert_eq!(Destination::End.to_string(), END);
    }

    #[test]
    fn test_missing_outcome_edge_rejected() {
        let mut builder = GraphBuilder::new();
        builder
            .add_node("exec", executor())
            .add_conditional_edge("exec", "end", END)
            .add_conditional_edge("exec", "continue", "exec")
            .set_entry("exec");

        let err = builder.build().unwrap_err();
        assert_eq!(
            err.issues,
            vec![ValidationIssue::MissingLabel {
                node: "exec".to_string(),
                label: "retry".to_string()
            }]
        );
    }

    #[test]
    fn test_undeclared_and_duplicate_labels_rejected() {
        let mut builder = GraphBuilder::new();
        builder
            .add_node("exec", pass().with_outcomes(["end"]))
            .add_conditional_edge("exec", "end", END)
            .add_conditional_edge("exec", "end", "exec")
            .add_conditional_edge("exec", "loop", "exec")
            .set_entry("exec");

        let err = builder.build().unwrap_err();
        assert!(err.has(|i| matches!(i, ValidationIssue::DuplicateLabel { label, .. } if label == "end")));
        assert!(err.has(|i| matches!(i, ValidationIssue::UndeclaredLabel { label, .. } if label == "loop")));
    }

    #[test]
    fn test_conditional_edges_without_declared_outcomes_rejected() {
        let mut builder = GraphBuilder::new();
        builder
            .add_node("exec", pass())
            .add_conditional_edge("exec", "end", END)
            .set_entry("exec");

        let err = builder.build().unwrap_err();
        assert!(err.has(|i| matches!(i, ValidationIssue::UndeclaredLabel { .. })));
    }

    #[test]
    fn test_collects_every_issue() {
        let mut builder: GraphBuilder<Value> = GraphBuilder::new();
        builder
            .add_node("a", pass())
            .add_node("a", pass())
            .add_node(END, pass())
            .add_edge("a", "missing")
            .add_edge("ghost", "a")
            .set_entry("nowhere");

        let err = builder.build().unwrap_err();
        assert!(err.has(|i| *i == ValidationIssue::DuplicateNode("a".to_string())));
        assert!(err.has(|i| *i == ValidationIssue::ReservedNodeName(END.to_string())));
        assert!(err.has(|i| *i == ValidationIssue::UnknownEntry("nowhere".to_string())));
        assert!(err.has(|i| matches!(i, ValidationIssue::UnknownTarget { to, .. } if to == "missing")));
        assert!(err.has(|i| matches!(i, ValidationIssue::UnknownSource { from } if from == "ghost")));
        assert!(err.issues.len() >= 5);
    }

    #[test]
    fn test_edge_shape_issues() {
        let mut builder = GraphBuilder::new();
        builder
            .add_node("a", pass().with_outcomes(["x"]))
            .add_node("b", pass())
            .add_node("c", pass())
            .add_edge("a", "b")
            .add_conditional_edge("a", "x", "b")
            .add_edge("b", "c")
            .add_edge("b", END)
            .set_entry("a");

        let err = builder.build().unwrap_err();
        assert!(err.has(|i| *i == ValidationIssue::MixedEdges("a".to_string())));
        assert!(err.has(|i| matches!(i, ValidationIssue::AmbiguousUnconditional { node, count: 2 } if node == "b")));
        assert!(err.has(|i| *i == ValidationIssue::NoOutgoingEdges("c".to_string())));
    }

    #[test]
    fn test_missing_entry() {
        let mut builder = GraphBuilder::new();
        builder.add_node("a", pass()).add_edge("a", END);
        let err = builder.build().unwrap_err();
        assert_eq!(err.issues, vec![ValidationIssue::MissingEntry]);
    }

    #[test]
    fn test_unreachable_node_is_not_an_error() {
        let mut builder = GraphBuilder::new();
        builder
            .add_node("a", pass())
            .add_node("island", pass())
            .add_edge("a", END)
            .add_edge("island", END)
            .set_entry("a");
        assert!(builder.build().is_ok());
    }
}
