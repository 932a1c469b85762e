//! Per-run execution context and terminal result
//!
//! An [`ExecutionContext`] is owned by exactly one run. The engine is the only
//! writer: between node invocations it replaces the state wholesale with the
//! node's output, appends a [`VisitRecord`], and moves `current_node` along.
//!
//! ```text
//! ExecutionContext
//! ├── run_id
//! ├── state          (replaced each step, never mutated in place)
//! ├── current_node   (None once routed to END)
//! ├── step_count     (successful steps)
//! ├── history        (append-only VisitRecords)
//! └── status
//! ```
//!
//! Recording `current_node` explicitly, not just history, is what lets a run
//! continue from a checkpoint instead of from the entry.

use crate::error::RunFailure;
use crate::graph::Destination;
use crate::node::{GraphState, NodeOutput};
use taskgraph_checkpoint::{RunCheckpoint, RunId, RunStatus, VisitRecord};

/// Mutable state and metadata of one run
#[derive(Debug, Clone)]
pub struct ExecutionContext<S> {
    run_id: RunId,
    state: S,
    current_node: Option<String>,
    step_count: usize,
    history: Vec<VisitRecord>,
    status: RunStatus,
}

impl<S: GraphState> ExecutionContext<S> {
    /// Fresh context positioned at `entry`
    pub fn new(run_id: impl Into<RunId>, state: S, entry: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            state,
            current_node: Some(entry.into()),
            step_count: 0,
            history: Vec::new(),
            status: RunStatus::Pending,
        }
    }

    /// Run identifier
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Current (last successful) state
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Node to invoke next
    pub fn current_node(&self) -> Option<&str> {
        self.current_node.as_deref()
    }

    /// Successful steps so far
    pub fn step_count(&self) -> usize {
        self.step_count
    }

    /// Visit history, oldest first
    pub fn history(&self) -> &[VisitRecord] {
        &self.history
    }

    /// Lifecycle status
    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: RunStatus) {
        self.status = status;
    }

    /// Record a successful invocation of `node` and move to `destination`
    pub(crate) fn advance(
        &mut self,
        node: &str,
        output: NodeOutput<S>,
        attempts: u32,
        destination: &Destination,
    ) {
        self.state = output.state;
        self.history
            .push(VisitRecord::new(node, output.label, attempts));
        self.step_count += 1;
        self.current_node = match destination {
            Destination::Node(next) => Some(next.clone()),
            Destination::End => None,
        };
    }

    /// Snapshot for the checkpoint store
    pub fn to_checkpoint(&self) -> Result<RunCheckpoint, serde_json::Error> {
        Ok(RunCheckpoint::new(
            self.run_id.clone(),
            self.current_node.clone(),
            self.step_count,
            serde_json::to_value(&self.state)?,
            self.history.clone(),
            self.status,
        ))
    }

    /// Restore a context from a snapshot
    pub fn from_checkpoint(checkpoint: RunCheckpoint) -> Result<Self, serde_json::Error> {
        Ok(Self {
            run_id: checkpoint.run_id,
            state: serde_json::from_value(checkpoint.state)?,
            current_node: checkpoint.current_node,
            step_count: checkpoint.step_count,
            history: checkpoint.history,
            status: checkpoint.status,
        })
    }

    /// Consume the context into the run's terminal snapshot
    pub fn into_result(self, failure: Option<RunFailure>) -> RunResult<S> {
        RunResult {
            run_id: self.run_id,
            status: self.status,
            state: self.state,
            history: self.history,
            step_count: self.step_count,
            failure,
        }
    }
}

/// Terminal snapshot of a run
///
/// On `Failed` and `Aborted` runs `state` is the last successfully produced
/// state and `history` covers every step up to the failure.
#[derive(Debug, Clone)]
pub struct RunResult<S> {
    /// Run identifier
    pub run_id: RunId,
    /// Terminal status
    pub status: RunStatus,
    /// Final (or last good) state
    pub state: S,
    /// Full visit history
    pub history: Vec<VisitRecord>,
    /// Successful steps
    pub step_count: usize,
    /// Why the run stopped early, if it did
    pub failure: Option<RunFailure>,
}

impl<S> RunResult<S> {
    /// Whether the run reached the terminal sentinel
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed && self.failure.is_none()
    }

    /// History rendered as `node` / `node(label)` strings
    pub fn path(&self) -> Vec<String> {
        self.history.iter().map(ToString::to_string).collect()
    }
}
