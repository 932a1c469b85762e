//! Error types for graph construction and run execution
//!
//! Errors fall into two groups that never mix:
//!
//! - **Build time**: [`ValidationError`] is returned by
//!   [`GraphBuilder::build`](crate::graph::GraphBuilder::build) and lists every
//!   problem found in the topology. No graph value exists when it is returned.
//! - **Run time**: [`RunFailure`] ends exactly one run and is carried inside
//!   its [`RunResult`](crate::context::RunResult) together with the last good
//!   state and the full history. Other runs sharing the same graph are not
//!   affected.
//!
//! # Error Hierarchy
//!
//! ```text
//! ValidationError            - graph malformed (build time only)
//! └── ValidationIssue        - one offending node/edge
//!
//! RunFailure                 - why a run stopped early
//! ├── Node(NodeFailure)      - adapter reported failure, retries exhausted
//! ├── Router(RouterError)    - undeclared or missing outcome label
//! ├── StepLimitExceeded      - cycle ran past max_steps
//! ├── Cancelled              - caller cancelled the run
//! └── Checkpoint             - required checkpoint could not be written
//!
//! EngineError                - resume could not start (checkpoint/state problems)
//! RunError                   - run API errors (unknown run id, engine errors)
//! ConfigError                - invalid engine configuration
//! ```
//!
//! # Matching Failures
//!
//! ```rust,ignore
//! use taskgraph_core::{RunFailure, RunStatus};
//!
//! let result = engine.run(initial_state).await;
//! match (&result.status, &result.failure) {
//!     (RunStatus::Completed, _) => println!("done in {} steps", result.step_count),
//!     (_, Some(RunFailure::Node(f))) if f.retryable => println!("flaky node {}", f.node),
//!     (_, Some(RunFailure::StepLimitExceeded { next_node, .. })) => {
//!         println!("looping at {next_node}")
//!     }
//!     (_, failure) => println!("stopped: {failure:?}"),
//! }
//! ```

use std::fmt;
use taskgraph_checkpoint::CheckpointError;
use thiserror::Error;

/// One structural problem found while validating a graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    /// No entry node was designated
    MissingEntry,
    /// The entry names a node that was never added
    UnknownEntry(String),
    /// Two nodes share a name
    DuplicateNode(String),
    /// A node uses the terminal sentinel (or an empty string) as its name
    ReservedNodeName(String),
    /// An edge starts at a node that does not exist
    UnknownSource {
        /// Source named by the edge
        from: String,
    },
    /// An edge ends at a node that does not exist and is not the terminal sentinel
    UnknownTarget {
        /// Source of the edge
        from: String,
        /// Destination named by the edge
        to: String,
    },
    /// The same label is used by more than one outgoing edge of a node
    DuplicateLabel {
        /// Source node
        node: String,
        /// Repeated label
        label: String,
    },
    /// A declared outcome of a node has no outgoing edge
    MissingLabel {
        /// Source node
        node: String,
        /// Declared but uncovered outcome
        label: String,
    },
    /// An outgoing edge uses a label the node's adapter never declares
    UndeclaredLabel {
        /// Source node
        node: String,
        /// Label on the edge
        label: String,
    },
    /// A node has more than one unconditional outgoing edge
    AmbiguousUnconditional {
        /// Source node
        node: String,
        /// Number of unconditional edges
        count: usize,
    },
    /// A node mixes conditional and unconditional outgoing edges
    MixedEdges(String),
    /// A node has no outgoing edge at all, not even to the terminal sentinel
    NoOutgoingEdges(String),
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingEntry => write!(f, "no entry node designated"),
            Self::UnknownEntry(node) => write!(f, "entry node '{node}' does not exist"),
            Self::DuplicateNode(node) => write!(f, "node '{node}' is defined more than once"),
            Self::ReservedNodeName(node) => write!(f, "node name '{node}' is reserved"),
            Self::UnknownSource { from } => write!(f, "edge source '{from}' does not exist"),
            Self::UnknownTarget { from, to } => {
                write!(f, "edge '{from}' -> '{to}' targets a node that does not exist")
            }
            Self::DuplicateLabel { node, label } => {
                write!(f, "node '{node}' has more than one edge labelled '{label}'")
            }
            Self::MissingLabel { node, label } => {
                write!(f, "node '{node}' declares outcome '{label}' but has no edge for it")
            }
            Self::UndeclaredLabel { node, label } => {
                write!(f, "node '{node}' has an edge labelled '{label}' it never declares")
            }
            Self::AmbiguousUnconditional { node, count } => {
                write!(f, "node '{node}' has {count} unconditional edges")
            }
            Self::MixedEdges(node) => {
                write!(f, "node '{node}' mixes conditional and unconditional edges")
            }
            Self::NoOutgoingEdges(node) => write!(f, "node '{node}' has no outgoing edges"),
        }
    }
}

/// Graph rejected at build time
///
/// Carries every issue found, not just the first one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Graph validation failed: {}", join_issues(.issues))]
pub struct ValidationError {
    /// All problems found, in discovery order
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    /// Whether any issue matches the predicate
    pub fn has(&self, pred: impl Fn(&ValidationIssue) -> bool) -> bool {
        self.issues.iter().any(pred)
    }
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Routing could not resolve a destination
///
/// Build-time validation makes every variant except `UnmatchedLabel` and
/// `MissingLabel` unreachable for a graph built through
/// [`GraphBuilder`](crate::graph::GraphBuilder); the latter two occur when an
/// adapter violates its own declared outcome set at run time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    /// The adapter returned a label with no edge from this node
    #[error("node '{node}' returned undeclared outcome '{label}' (expected one of: {})", .expected.join(", "))]
    UnmatchedLabel {
        /// Node that produced the label
        node: String,
        /// Offending label
        label: String,
        /// Labels the node does route on
        expected: Vec<String>,
    },

    /// A conditionally routed node returned no label
    #[error("node '{node}' routes on its outcome but returned no label")]
    MissingLabel {
        /// Node that produced no label
        node: String,
    },

    /// More than one unconditional edge leaves the node
    #[error("node '{node}' has {count} unconditional edges")]
    AmbiguousUnconditional {
        /// Source node
        node: String,
        /// Number of unconditional edges
        count: usize,
    },

    /// The node has no outgoing edge
    #[error("node '{node}' has no outgoing edge")]
    NoRoute {
        /// Source node
        node: String,
    },

    /// The node is not part of the graph
    #[error("node '{node}' is not part of the graph")]
    UnknownNode {
        /// Requested node
        node: String,
    },
}

/// Failure reported by a node adapter
///
/// Adapters decide whether re-invoking the same node with the same input state
/// is safe; the engine only retries when `retryable` is set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{cause}")]
pub struct NodeError {
    /// What went wrong
    pub cause: String,
    /// Whether the same input may be retried
    pub retryable: bool,
}

impl NodeError {
    /// Failure that may succeed on a second attempt
    pub fn retryable(cause: impl Into<String>) -> Self {
        Self {
            cause: cause.into(),
            retryable: true,
        }
    }

    /// Failure that must not be retried
    pub fn fatal(cause: impl Into<String>) -> Self {
        Self {
            cause: cause.into(),
            retryable: false,
        }
    }
}

/// Node failure as seen by the run: which node, why, and after how many attempts
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("node '{node}' failed after {attempts} attempt(s): {cause}")]
pub struct NodeFailure {
    /// Node that failed
    pub node: String,
    /// Cause reported by the adapter (or the timeout)
    pub cause: String,
    /// Whether the adapter marked the last failure as retryable
    pub retryable: bool,
    /// Attempts made, including the first
    pub attempts: u32,
}

/// Why a run stopped before reaching the terminal sentinel
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunFailure {
    /// A node failed and no retry budget remained
    #[error(transparent)]
    Node(#[from] NodeFailure),

    /// A node's outcome could not be routed
    #[error(transparent)]
    Router(#[from] RouterError),

    /// The step limit was reached with a node still pending
    #[error("step limit of {max_steps} exceeded before running '{next_node}'")]
    StepLimitExceeded {
        /// Configured limit
        max_steps: usize,
        /// Node that would have run next
        next_node: String,
    },

    /// The run's cancellation token fired
    #[error("run cancelled after {step_count} step(s)")]
    Cancelled {
        /// Steps completed before cancellation was observed
        step_count: usize,
    },

    /// A checkpoint could not be written and checkpoints are required
    #[error("checkpoint could not be written: {0}")]
    Checkpoint(String),
}

/// Resume could not start
#[derive(Error, Debug)]
pub enum EngineError {
    /// Loading the checkpoint failed
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// The checkpointed state does not deserialize into the graph's state type
    #[error("Checkpointed state is incompatible: {0}")]
    State(#[source] serde_json::Error),

    /// The checkpoint points at a node this graph does not have
    #[error("Run '{run_id}' is positioned at unknown node '{node}'")]
    UnknownNode {
        /// Run being resumed
        run_id: String,
        /// Node recorded in the checkpoint
        node: String,
    },
}

/// Run API errors
#[derive(Error, Debug)]
pub enum RunError {
    /// No live run and no checkpoint for this id
    #[error("Run not found: {0}")]
    NotFound(String),

    /// Resuming from a checkpoint failed
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The task driving the run ended without producing a result (panic or abort)
    #[error("Run '{0}' stopped without a result")]
    Interrupted(String),
}

/// Invalid engine configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A value is out of range
    #[error("Configuration error: {0}")]
    Invalid(String),

    /// An environment override could not be parsed
    #[error("Environment variable {key} has invalid value '{value}'")]
    Env {
        /// Variable name
        key: String,
        /// Raw value
        value: String,
    },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
