//! Graph visualization - Mermaid and ASCII renderings of a topology
//!
//! Rendering walks nodes and edges in insertion order, so the same graph
//! always produces byte-identical output (diffable in docs and snapshots).
//!
//! # Mermaid
//!
//! ```text
//! graph TD
//!     __start__((START))
//!     __end__((END))
//!     planner["planner"]
//!     action_executor{"action_executor"}
//!     __start__ --> planner
//!     planner --> agent_reasoner
//!     action_executor -. "retry" .-> researcher
//!     action_executor -. "end" .-> __end__
//! ```
//!
//! Nodes that route on an outcome label are drawn as diamonds and their edges
//! as labelled dashed arrows.
//!
//! # Examples
//!
//! ```rust,ignore
//! use taskgraph_core::visualization::{visualize, VisualizationOptions};
//!
//! let mermaid = visualize(&graph, &VisualizationOptions::mermaid().with_title("Agent loop"));
//! std::fs::write("docs/agent.mmd", mermaid)?;
//!
//! println!("{}", visualize(&graph, &VisualizationOptions::ascii().with_details()));
//! ```

use crate::graph::{Destination, GraphDefinition, END, START};
use crate::node::GraphState;
use std::fmt::Write;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisualizationFormat {
    /// Mermaid flowchart
    Mermaid,
    /// Plain-text adjacency listing
    Ascii,
}

/// Rendering options
#[derive(Debug, Clone)]
pub struct VisualizationOptions {
    /// Output format
    pub format: VisualizationFormat,
    /// Show each node's declared outcome labels
    pub include_details: bool,
    /// Diagram title
    pub title: Option<String>,
}

impl Default for VisualizationOptions {
    fn default() -> Self {
        Self {
            format: VisualizationFormat::Mermaid,
            include_details: false,
            title: None,
        }
    }
}

impl VisualizationOptions {
    /// Mermaid output
    pub fn mermaid() -> Self {
        Self {
            format: VisualizationFormat::Mermaid,
            ..Default::default()
        }
    }

    /// ASCII output
    pub fn ascii() -> Self {
        Self {
            format: VisualizationFormat::Ascii,
            ..Default::default()
        }
    }

    /// Set title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Include declared outcomes
    pub fn with_details(mut self) -> Self {
        self.include_details = true;
        self
    }
}

/// Render a graph as a string
pub fn visualize<S: GraphState>(graph: &GraphDefinition<S>, options: &VisualizationOptions) -> String {
    match options.format {
        VisualizationFormat::Mermaid => visualize_mermaid(graph, options),
        VisualizationFormat::Ascii => visualize_ascii(graph, options),
    }
}

fn visualize_mermaid<S: GraphState>(graph: &GraphDefinition<S>, options: &VisualizationOptions) -> String {
    let mut out = String::new();

    if let Some(title) = &options.title {
        let _ = writeln!(out, "---\ntitle: {}\n---", escape_mermaid(title));
    }
    out.push_str("graph TD\n");

    let _ = writeln!(out, "    {}((START))", sanitize_id(START));
    let _ = writeln!(out, "    style {} fill:#90EE90,stroke:#228B22,stroke-width:3px", sanitize_id(START));
    let _ = writeln!(out, "    {}((END))", sanitize_id(END));
    let _ = writeln!(out, "    style {} fill:#FFB6C1,stroke:#DC143C,stroke-width:3px", sanitize_id(END));

    for node in graph.nodes() {
        let conditional = graph.router().is_conditional(&node.name);
        let outcomes = node.adapter.outcomes();
        let label = if options.include_details && !outcomes.is_empty() {
            format!("{}<br/>outcomes: {}", node.name, outcomes.join(", "))
        } else {
            node.name.clone()
        };
        let id = sanitize_id(&node.name);

        if conditional {
            let _ = writeln!(out, "    {}{{\"{}\"}}", id, escape_mermaid(&label));
            let _ = writeln!(out, "    style {} fill:#FFE4B5,stroke:#FF8C00,stroke-width:2px", id);
        } else {
            let _ = writeln!(out, "    {}[\"{}\"]", id, escape_mermaid(&label));
        }
    }

    let _ = writeln!(out, "    {} --> {}", sanitize_id(START), sanitize_id(graph.entry()));
    for edge in graph.edges() {
        let to = match &edge.to {
            Destination::Node(name) => sanitize_id(name),
            Destination::End => sanitize_id(END),
        };
        match &edge.label {
            Some(label) => {
                let _ = writeln!(
                    out,
                    "    {} -. \"{}\" .-> {}",
                    sanitize_id(&edge.from),
                    escape_mermaid(label),
                    to
                );
            }
            None => {
                let _ = writeln!(out, "    {} --> {}", sanitize_id(&edge.from), to);
            }
        }
    }

    out
}

fn visualize_ascii<S: GraphState>(graph: &GraphDefinition<S>, options: &VisualizationOptions) -> String {
    let mut out = String::new();

    if let Some(title) = &options.title {
        let _ = writeln!(out, "{title}");
    }
    out.push_str("Graph Structure:\n");
    out.push_str("================\n\n");
    let _ = writeln!(out, "START ({}) ->", graph.entry());

    for node in graph.nodes() {
        let _ = write!(out, "\n[{}]", node.name);
        if options.include_details {
            let outcomes = node.adapter.outcomes();
            if !outcomes.is_empty() {
                let _ = write!(out, " outcomes: {}", outcomes.join(", "));
            }
        }
        out.push('\n');

        for edge in graph.outgoing(&node.name) {
            let to = match &edge.to {
                Destination::Node(name) => name.as_str(),
                Destination::End => "END",
            };
            match &edge.label {
                Some(label) => {
                    let _ = writeln!(out, "  -[{label}]-> {to}");
                }
                None => {
                    let _ = writeln!(out, "  -> {to}");
                }
            }
        }
    }

    out.push_str("\nEND\n");
    out
}

/// Escape characters Mermaid treats specially inside quoted labels
fn escape_mermaid(s: &str) -> String {
    s.replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace("&lt;br/&gt;", "<br/>")
}

/// Mermaid node ids: alphanumerics and underscores only
fn sanitize_id(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}
