//! Node adapters - the uniform invoke contract for pluggable behaviors
//!
//! Every stage of a graph (planner, reasoner, action executor, researcher, plan
//! updater, or anything else) is reached through one capability interface,
//! [`NodeAdapter`]. The engine holds `Arc<dyn NodeAdapter<S>>` references only
//! and never sees concrete behavior types.
//!
//! # Contract
//!
//! ```text
//! invoke(&state) ──► Ok(NodeOutput { state: new_state, label: Some("retry") })
//!                └─► Err(NodeError { cause, retryable })
//! ```
//!
//! - The adapter receives the state by shared reference and returns a *new*
//!   state value. The engine's authoritative copy cannot be mutated in place,
//!   so a failed attempt never leaks partial changes into a retry.
//! - `label` must be `Some` exactly when the node routes conditionally, and
//!   must be one of [`NodeAdapter::outcomes`]. Graph validation cross-checks
//!   the declared outcomes against the node's outgoing edge labels.
//!
//! # Implementing an Adapter
//!
//! ```rust,ignore
//! use async_trait::async_trait;
//! use taskgraph_core::{NodeAdapter, NodeError, NodeOutput};
//!
//! struct Executor;
//!
//! #[async_trait]
//! impl NodeAdapter<Task> for Executor {
//!     async fn invoke(&self, state: &Task) -> Result<NodeOutput<Task>, NodeError> {
//!         let mut next = state.clone();
//!         next.step += 1;
//!         let label = if next.done() { "end" } else { "continue" };
//!         Ok(NodeOutput::with_label(next, label))
//!     }
//!
//!     fn outcomes(&self) -> Vec<String> {
//!         vec!["end".into(), "continue".into(), "retry".into()]
//!     }
//! }
//! ```
//!
//! For quick graphs and tests, [`FnNode`] wraps an async closure and
//! [`RoutedNode`] attaches a routing function to an existing adapter.

use crate::error::NodeError;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Bounds every run state must satisfy
///
/// States are cloned between steps, serialized into checkpoints, and moved
/// across tasks. Blanket-implemented for every qualifying type, so plain
/// structs deriving `Clone, Serialize, Deserialize` and `serde_json::Value`
/// both work.
pub trait GraphState: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> GraphState for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Successful node result: the replacement state and an optional outcome label
#[derive(Debug, Clone, PartialEq)]
pub struct NodeOutput<S> {
    /// State that replaces the run's current state
    pub state: S,
    /// Outcome label for conditional routing
    pub label: Option<String>,
}

impl<S> NodeOutput<S> {
    /// Output of an unconditionally routed node
    pub fn new(state: S) -> Self {
        Self { state, label: None }
    }

    /// Output carrying an outcome label
    pub fn with_label(state: S, label: impl Into<String>) -> Self {
        Self {
            state,
            label: Some(label.into()),
        }
    }
}

/// Capability interface implemented by every pluggable behavior
#[async_trait]
pub trait NodeAdapter<S>: Send + Sync {
    /// Compute the next state from the current one
    async fn invoke(&self, state: &S) -> Result<NodeOutput<S>, NodeError>;

    /// Finite set of outcome labels this adapter may return
    ///
    /// Empty for nodes that route unconditionally.
    fn outcomes(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Boxed future returned by [`FnNode`] closures
pub type NodeFuture<S> = BoxFuture<'static, Result<NodeOutput<S>, NodeError>>;

type NodeFn<S> = Arc<dyn Fn(S) -> NodeFuture<S> + Send + Sync>;

/// Adapter built from an async closure
///
/// The closure receives an owned clone of the current state.
///
/// ```rust,ignore
/// let planner = FnNode::new(|mut state: serde_json::Value| async move {
///     state["plan"] = serde_json::json!(["open page", "extract"]);
///     Ok(NodeOutput::new(state))
/// });
/// ```
pub struct FnNode<S> {
    f: NodeFn<S>,
    outcomes: Vec<String>,
}

impl<S: GraphState> FnNode<S> {
    /// Wrap an async closure as an unconditionally routed node
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(S) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<NodeOutput<S>, NodeError>> + Send + 'static,
    {
        Self {
            f: Arc::new(move |state: S| -> NodeFuture<S> { Box::pin(f(state)) }),
            outcomes: Vec::new(),
        }
    }

    /// Declare the outcome labels the closure may return
    pub fn with_outcomes<I, T>(mut self, outcomes: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.outcomes = outcomes.into_iter().map(Into::into).collect();
        self
    }
}

impl<S> fmt::Debug for FnNode<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnNode")
            .field("f", &"<function>")
            .field("outcomes", &self.outcomes)
            .finish()
    }
}

#[async_trait]
impl<S: GraphState> NodeAdapter<S> for FnNode<S> {
    async fn invoke(&self, state: &S) -> Result<NodeOutput<S>, NodeError> {
        (self.f)(state.clone()).await
    }

    fn outcomes(&self) -> Vec<String> {
        self.outcomes.clone()
    }
}

type RouteFn<S> = Arc<dyn Fn(&S) -> String + Send + Sync>;

/// Adapter that runs an inner behavior, then classifies its result into a label
///
/// This is the "validate and route" pattern: the inner behavior does the work
/// (for example invoking an action), and `route` inspects the resulting state
/// to pick one of the declared outcomes. Any label the inner adapter returned
/// is replaced.
pub struct RoutedNode<S> {
    inner: Arc<dyn NodeAdapter<S>>,
    outcomes: Vec<String>,
    route: RouteFn<S>,
}

impl<S: GraphState> RoutedNode<S> {
    /// Attach a routing function and its outcome set to `inner`
    pub fn new<A, I, T, R>(inner: A, outcomes: I, route: R) -> Self
    where
        A: NodeAdapter<S> + 'static,
        I: IntoIterator<Item = T>,
        T: Into<String>,
        R: Fn(&S) -> String + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(inner),
            outcomes: outcomes.into_iter().map(Into::into).collect(),
            route: Arc::new(route),
        }
    }
}

impl<S> fmt::Debug for RoutedNode<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutedNode")
            .field("outcomes", &self.outcomes)
            .field("route", &"<function>")
            .finish()
    }
}

#[async_trait]
impl<S: GraphState> NodeAdapter<S> for RoutedNode<S> {
    async fn invoke(&self, state: &S) -> Result<NodeOutput<S>, NodeError> {
        let output = self.inner.invoke(state).await?;
        let label = (self.route)(&output.state);
        Ok(NodeOutput::with_label(output.state, label))
    }

    fn outcomes(&self) -> Vec<String> {
        self.outcomes.clone()
    }
}
