//! Run progress events
//!
//! The engine publishes a [`RunEvent`] at every observable transition of every
//! run on a `tokio::sync::broadcast` channel. Subscribing is optional: with no
//! receivers, or with a receiver that lags behind, publishing still never
//! blocks the run.
//!
//! ```text
//! RunStarted ─► NodeStarted ─► NodeCompleted ─► CheckpointSaved ─► ... ─► RunFinished
//!                    │
//!                    └─► NodeRetrying ─► NodeStarted (attempt 2) ...
//! ```
//!
//! Events serialize as tagged JSON (`{"event": "node_completed", ...}`) so they
//! can be forwarded to a status stream as-is.

use serde::Serialize;
use taskgraph_checkpoint::{RunId, RunStatus};

/// Observable transition of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    /// A fresh run entered its step loop
    RunStarted {
        /// Run identifier
        run_id: RunId,
        /// Entry node
        entry: String,
    },

    /// A run continued from a checkpoint
    RunResumed {
        /// Run identifier
        run_id: RunId,
        /// Node the run continues with
        node: String,
        /// Steps completed before the resume
        step_count: usize,
    },

    /// A node invocation attempt began
    NodeStarted {
        /// Run identifier
        run_id: RunId,
        /// Node being invoked
        node: String,
        /// 1-based step number
        step: usize,
        /// 1-based attempt number
        attempt: u32,
    },

    /// A node succeeded and was routed
    NodeCompleted {
        /// Run identifier
        run_id: RunId,
        /// Node that ran
        node: String,
        /// Outcome label, if any
        label: Option<String>,
        /// 1-based step number
        step: usize,
        /// Destination name (`__end__` for the sentinel)
        next: String,
    },

    /// A node failed and will be retried
    NodeRetrying {
        /// Run identifier
        run_id: RunId,
        /// Node that failed
        node: String,
        /// Attempt that failed
        attempt: u32,
        /// Failure cause
        cause: String,
        /// Backoff before the next attempt
        delay_ms: u64,
    },

    /// A checkpoint was written
    CheckpointSaved {
        /// Run identifier
        run_id: RunId,
        /// Step count recorded
        step_count: usize,
    },

    /// A checkpoint could not be written after all retries
    CheckpointFailed {
        /// Run identifier
        run_id: RunId,
        /// Step count that was not recorded
        step_count: usize,
        /// Last store error
        error: String,
    },

    /// The run reached a terminal status
    RunFinished {
        /// Run identifier
        run_id: RunId,
        /// Terminal status
        status: RunStatus,
        /// Successful steps
        step_count: usize,
        /// Failure description for unsuccessful runs
        failure: Option<String>,
    },
}

impl RunEvent {
    /// Run this event belongs to
    pub fn run_id(&self) -> &str {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::RunResumed { run_id, .. }
            | Self::NodeStarted { run_id, .. }
            | Self::NodeCompleted { run_id, .. }
            | Self::NodeRetrying { run_id, .. }
            | Self::CheckpointSaved { run_id, .. }
            | Self::CheckpointFailed { run_id, .. }
            | Self::RunFinished { run_id, .. } => run_id,
        }
    }

    /// Snake-case event name, as used in the serialized tag
    pub fn name(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::RunResumed { .. } => "run_resumed",
            Self::NodeStarted { .. } => "node_started",
            Self::NodeCompleted { .. } => "node_completed",
            Self::NodeRetrying { .. } => "node_retrying",
            Self::CheckpointSaved { .. } => "checkpoint_saved",
            Self::CheckpointFailed { .. } => "checkpoint_failed",
            Self::RunFinished { .. } => "run_finished",
        }
    }

    /// Whether this is the last event of its run
    pub fn is_final(&self) -> bool {
        matches!(self, Self::RunFinished { .. })
    }
}
