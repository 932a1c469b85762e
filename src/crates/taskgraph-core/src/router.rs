//! Routing table - resolves a node's outcome to the next destination
//!
//! The router is an adjacency table built once from a graph's edges:
//!
//! ```text
//! unconditional: node            -> [destination]
//! conditional:   (node, label)   -> destination
//! ```
//!
//! [`Router::next`] is a pure lookup: the same `(node, label)` always yields the
//! same destination, and cycles cost nothing because routing never recurses.

use crate::error::RouterError;
use crate::graph::{Destination, Edge};
use std::collections::HashMap;

/// Adjacency table from `(node, outcome label)` to destination
#[derive(Debug, Clone, Default)]
pub struct Router {
    unconditional: HashMap<String, Vec<Destination>>,
    conditional: HashMap<String, HashMap<String, Destination>>,
}

impl Router {
    /// Build the table from a list of edges
    ///
    /// No validation happens here; a repeated `(node, label)` keeps the last edge.
    pub fn from_edges<'a>(edges: impl IntoIterator<Item = &'a Edge>) -> Self {
        let mut router = Self::default();
        for edge in edges {
            match &edge.label {
                Some(label) => {
                    router
                        .conditional
                        .entry(edge.from.clone())
                        .or_default()
                        .insert(label.clone(), edge.to.clone());
                }
                None => {
                    router
                        .unconditional
                        .entry(edge.from.clone())
                        .or_default()
                        .push(edge.to.clone());
                }
            }
        }
        router
    }

    /// Resolve where a run goes after `node` completed with `label`
    ///
    /// # Errors
    ///
    /// - [`RouterError::UnmatchedLabel`] when a conditional node returns a
    ///   label it has no edge for
    /// - [`RouterError::MissingLabel`] when a conditional node returns no label
    /// - [`RouterError::AmbiguousUnconditional`] / [`RouterError::NoRoute`]
    ///   for unconditional nodes without exactly one edge
    pub fn next(&self, node: &str, label: Option<&str>) -> Result<Destination, RouterError> {
        if let Some(branches) = self.conditional.get(node) {
            let label = label.ok_or_else(|| RouterError::MissingLabel {
                node: node.to_string(),
            })?;
            return branches
                .get(label)
                .cloned()
                .ok_or_else(|| RouterError::UnmatchedLabel {
                    node: node.to_string(),
                    label: label.to_string(),
                    expected: self.labels(node),
                });
        }

        if let Some(label) = label {
            tracing::debug!(node, label, "Ignoring outcome label on unconditional node");
        }

        match self.unconditional.get(node).map(Vec::as_slice) {
            Some([destination]) => Ok(destination.clone()),
            Some(destinations) if destinations.len() > 1 => {
                Err(RouterError::AmbiguousUnconditional {
                    node: node.to_string(),
                    count: destinations.len(),
                })
            }
            _ => Err(RouterError::NoRoute {
                node: node.to_string(),
            }),
        }
    }

    /// Whether `node` routes on its outcome label
    pub fn is_conditional(&self, node: &str) -> bool {
        self.conditional.contains_key(node)
    }

    /// Labels `node` routes on, sorted
    pub fn labels(&self, node: &str) -> Vec<String> {
        let mut labels: Vec<String> = self
            .conditional
            .get(node)
            .map(|branches| branches.keys().cloned().collect())
            .unwrap_or_default();
        labels.sort();
        labels
    }
}
