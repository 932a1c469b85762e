//! Checkpoint record for a single run
//!
//! A [`RunCheckpoint`] is the durable snapshot of one run's execution context:
//! which node runs next, how many steps have completed, the opaque state
//! payload, and the ordered visit history. It is everything needed to continue
//! a run from the next node instead of from the graph's entry.
//!
//! # Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  RunCheckpoint                                │
//! │  • run_id:       "6f1c..."                    │
//! │  • current_node: Some("action_executor")      │
//! │  • step_count:   2                            │
//! │  • state:        { ...opaque JSON... }        │
//! │  • history:      [planner, agent_reasoner]    │
//! │  • status:       Running                      │
//! │  • saved_at:     2024-01-01T12:00:00Z         │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! `current_node` is `None` once the run has routed to the terminal sentinel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Run identifier
pub type RunId = String;

/// Lifecycle of a run
///
/// ```text
/// Pending ──► Running ──┬──► Completed
///                       ├──► Failed
///                       └──► Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Created but no step has been attempted yet
    Pending,
    /// Step loop in progress
    Running,
    /// Routed to the terminal sentinel
    Completed,
    /// A node or routing failure ended the run
    Failed,
    /// Stopped by the step limit or by cancellation
    Aborted,
}

impl RunStatus {
    /// Whether the run has stopped (successfully or not)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Aborted)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// One successful node invocation in a run's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitRecord {
    /// Node that ran
    pub node: String,

    /// Outcome label the node declared, if it routes conditionally
    pub label: Option<String>,

    /// When the invocation completed
    pub timestamp: DateTime<Utc>,

    /// Attempts it took (1 when the first attempt succeeded)
    pub attempts: u32,
}

impl VisitRecord {
    /// Record a visit completed now
    pub fn new(node: impl Into<String>, label: Option<String>, attempts: u32) -> Self {
        Self {
            node: node.into(),
            label,
            timestamp: Utc::now(),
            attempts,
        }
    }
}

impl fmt::Display for VisitRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{}({})", self.node, label),
            None => f.write_str(&self.node),
        }
    }
}

/// Durable snapshot of one run's execution context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunCheckpoint {
    /// Run this snapshot belongs to
    pub run_id: RunId,

    /// Node to invoke next; `None` once the run completed
    pub current_node: Option<String>,

    /// Successful steps so far
    pub step_count: usize,

    /// Opaque state payload
    pub state: serde_json::Value,

    /// Ordered visit history
    pub history: Vec<VisitRecord>,

    /// Run status at the time of the snapshot
    pub status: RunStatus,

    /// When the snapshot was taken
    pub saved_at: DateTime<Utc>,
}

impl RunCheckpoint {
    /// Create a snapshot stamped with the current time
    pub fn new(
        run_id: impl Into<RunId>,
        current_node: Option<String>,
        step_count: usize,
        state: serde_json::Value,
        history: Vec<VisitRecord>,
        status: RunStatus,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            current_node,
            step_count,
            state,
            history,
            status,
            saved_at: Utc::now(),
        }
    }

    /// Whether continuing this run would invoke any node
    pub fn is_resumable(&self) -> bool {
        self.current_node.is_some() && self.status != RunStatus::Completed
    }
}
