//! # taskgraph-core - Cyclic Graph Execution for Agent Task Loops
//!
//! A generic control-flow core that threads state through an arbitrary number
//! of node invocations, routes on declared outcome labels, bounds cycles, and
//! survives partial failure without losing a run's accumulated state.
//!
//! ## Overview
//!
//! - **Validated topology** - [`GraphDefinition`] rejects malformed graphs at
//!   build time, listing every problem at once
//! - **Uniform node contract** - every behavior is an `Arc<dyn NodeAdapter<S>>`
//! - **Table-driven routing** - [`Router`] maps `(node, label)` to a destination;
//!   cycles are ordinary lookups, never recursion
//! - **Bounded, retrying run loop** - [`ExecutionEngine`] enforces the step limit,
//!   per-node timeouts and retry budgets
//! - **Checkpoint / resume** - the context is offered to a
//!   [`CheckpointStore`] after every step; a run continues from its last
//!   checkpoint instead of from the entry
//! - **Run API** - [`RunManager`] starts, resumes, inspects, and cancels runs by id
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌─────────────────┐     ┌───────────────────┐
//! │ GraphDefinition  │────►│ ExecutionEngine │────►│ CheckpointStore   │
//! │  nodes, edges,   │     │  step loop      │     │  (memory / file / │
//! │  entry, Router   │     │  retries        │     │   noop)           │
//! └──────────────────┘     │  timeouts       │     └───────────────────┘
//!          ▲               └───────┬─────────┘
//!          │ shared, read-only     │ one ExecutionContext per run
//!          │                       ▼
//!   many concurrent runs     RunResult { state, history, failure }
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use taskgraph_core::{EngineConfig, ExecutionEngine, FnNode, GraphBuilder, NodeOutput, END};
//! use serde_json::{json, Value};
//!
//! let mut builder = GraphBuilder::new();
//! builder
//!     .add_node("plan", FnNode::new(|mut s: Value| async move {
//!         s["plan"] = json!(["search", "answer"]);
//!         Ok(NodeOutput::new(s))
//!     }))
//!     .add_node("act", FnNode::new(|s: Value| async move {
//!         Ok(NodeOutput::with_label(s, "end"))
//!     }).with_outcomes(["end", "continue"]))
//!     .add_edge("plan", "act")
//!     .add_conditional_edge("act", "end", END)
//!     .add_conditional_edge("act", "continue", "plan")
//!     .set_entry("plan");
//!
//! let engine = ExecutionEngine::new(builder.build()?, EngineConfig::default());
//! let result = engine.run(json!({"taskDone": false})).await;
//! assert!(result.is_success());
//! ```
//!
//! ## Modules
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`graph`] | nodes, edges, [`GraphDefinition`], [`GraphBuilder`] |
//! | [`node`] | [`NodeAdapter`], [`FnNode`], [`RoutedNode`] |
//! | [`router`] | [`Router`] |
//! | [`context`] | [`ExecutionContext`], [`RunResult`] |
//! | [`engine`] | [`ExecutionEngine`] |
//! | [`runs`] | [`RunManager`] |
//! | [`config`] | [`EngineConfig`], [`CheckpointPolicy`] |
//! | [`retry`] | [`RetryPolicy`] backoff |
//! | [`events`] | [`RunEvent`] |
//! | [`visualization`] | Mermaid / ASCII rendering |
//! | [`agent`] | the planner / reasoner / executor / researcher / plan-updater topology |

pub mod agent;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod events;
pub mod graph;
pub mod node;
pub mod retry;
pub mod router;
pub mod runs;
pub mod visualization;

pub use agent::{agent_graph, AgentBehaviors};
pub use config::{CheckpointPolicy, EngineConfig};
pub use context::{ExecutionContext, RunResult};
pub use engine::ExecutionEngine;
pub use error::{
    ConfigError, EngineError, NodeError, NodeFailure, RouterError, RunError, RunFailure,
    ValidationError, ValidationIssue,
};
pub use events::RunEvent;
pub use graph::{Destination, Edge, GraphBuilder, GraphDefinition, Node, END, START};
pub use node::{FnNode, GraphState, NodeAdapter, NodeOutput, RoutedNode};
pub use retry::RetryPolicy;
pub use router::Router;
pub use runs::RunManager;
pub use visualization::{visualize, VisualizationFormat, VisualizationOptions};

pub use taskgraph_checkpoint::{
    CheckpointError, CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore,
    NoopCheckpointStore, RunCheckpoint, RunId, RunStatus, VisitRecord,
};

pub use tokio_util::sync::CancellationToken;
