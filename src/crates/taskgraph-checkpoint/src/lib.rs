//! # taskgraph-checkpoint - Run Persistence for Graph Execution
//!
//! Checkpoint record and storage backends used by `taskgraph-core` to persist
//! a run after each step and to resume it after the process restarts.
//!
//! ## Core Types
//!
//! - [`RunCheckpoint`] - latest snapshot of one run (current node, step count,
//!   opaque state, visit history, status)
//! - [`VisitRecord`] - one entry of the ordered visit history
//! - [`RunStatus`] - `Pending`, `Running`, `Completed`, `Failed`, `Aborted`
//! - [`CheckpointStore`] - async, object-safe storage trait
//!
//! ## Backends
//!
//! | Backend | Durable | Use |
//! |---------|---------|-----|
//! | [`InMemoryCheckpointStore`] | no | tests, single-process runs |
//! | [`FileCheckpointStore`] | yes | local resume after restart |
//! | [`NoopCheckpointStore`] | no | checkpointing disabled |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use taskgraph_checkpoint::{
//!     CheckpointStore, InMemoryCheckpointStore, RunCheckpoint, RunStatus,
//! };
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = InMemoryCheckpointStore::new();
//!
//!     let checkpoint = RunCheckpoint::new(
//!         "run-1",
//!         Some("agent_reasoner".to_string()),
//!         1,
//!         json!({"taskDone": false}),
//!         vec![],
//!         RunStatus::Running,
//!     );
//!     store.save(&checkpoint).await?;
//!
//!     let loaded = store.load("run-1").await?;
//!     assert_eq!(loaded.step_count, 1);
//!     Ok(())
//! }
//! ```

pub mod checkpoint;
pub mod error;
pub mod file;
pub mod memory;
pub mod traits;

pub use checkpoint::{RunCheckpoint, RunId, RunStatus, VisitRecord};
pub use error::{CheckpointError, Result};
pub use file::FileCheckpointStore;
pub use memory::InMemoryCheckpointStore;
pub use traits::{CheckpointStore, NoopCheckpointStore};
