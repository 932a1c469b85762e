//! Checkpoint storage trait
//!
//! [`CheckpointStore`] is the collaborator contract the execution engine
//! writes to after every step and reads from on resume. Backends keep exactly
//! one snapshot per run id (the latest); a `save` for an existing run replaces
//! the previous snapshot.
//!
//! # Requirements
//!
//! - **`Send + Sync`**: one store is shared by every concurrent run
//! - **At-least-once writes**: a successful `save` must survive a process
//!   restart for durable backends; the engine may write the same snapshot
//!   more than once after a retry
//! - **Per-run isolation**: writes for one run id never affect another
//!
//! No cross-run transactions are required.
//!
//! # Implementing a Backend
//!
//! ```rust,ignore
//! use async_trait::async_trait;
//! use taskgraph_checkpoint::{CheckpointError, CheckpointStore, Result, RunCheckpoint};
//!
//! struct RedisStore { client: redis::Client }
//!
//! #[async_trait]
//! impl CheckpointStore for RedisStore {
//!     async fn save(&self, checkpoint: &RunCheckpoint) -> Result<()> {
//!         let payload = serde_json::to_string(checkpoint)?;
//!         // SET run:<id> payload
//!         Ok(())
//!     }
//!
//!     async fn load(&self, run_id: &str) -> Result<RunCheckpoint> {
//!         // GET run:<id>
//!         Err(CheckpointError::NotFound(run_id.to_string()))
//!     }
//!
//!     async fn delete(&self, run_id: &str) -> Result<()> { Ok(()) }
//!
//!     async fn list(&self) -> Result<Vec<String>> { Ok(vec![]) }
//! }
//! ```

use crate::{
    checkpoint::RunCheckpoint,
    error::{CheckpointError, Result},
};
use async_trait::async_trait;

/// Storage backend for run checkpoints
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist the latest snapshot for `checkpoint.run_id`
    async fn save(&self, checkpoint: &RunCheckpoint) -> Result<()>;

    /// Load the latest snapshot for a run
    ///
    /// Returns [`CheckpointError::NotFound`] when nothing was stored.
    async fn load(&self, run_id: &str) -> Result<RunCheckpoint>;

    /// Remove a run's snapshot. Removing an unknown run is not an error.
    async fn delete(&self, run_id: &str) -> Result<()>;

    /// Ids of all runs with a stored snapshot, sorted
    async fn list(&self) -> Result<Vec<String>>;

    /// Load a snapshot, mapping "not found" to `None`
    async fn try_load(&self, run_id: &str) -> Result<Option<RunCheckpoint>> {
        match self.load(run_id).await {
            Ok(checkpoint) => Ok(Some(checkpoint)),
            Err(CheckpointError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Store that discards every write
///
/// Used when checkpointing is disabled; `load` always reports not found.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCheckpointStore;

#[async_trait]
impl CheckpointStore for NoopCheckpointStore {
    async fn save(&self, _checkpoint: &RunCheckpoint) -> Result<()> {
        Ok(())
    }

    async fn load(&self, run_id: &str) -> Result<RunCheckpoint> {
        Err(CheckpointError::NotFound(run_id.to_string()))
    }

    async fn delete(&self, _run_id: &str) -> Result<()> {
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::RunStatus;
    use serde_json::json;

    #[tokio::test]
    async fn test_noop_store_forgets_everything() {
        let store = NoopCheckpointStore;
        let checkpoint =
            RunCheckpoint::new("run-1", None, 0, json!({}), vec![], RunStatus::Pending);

        store.save(&checkpoint).await.unwrap();
        assert!(store.load("run-1").await.unwrap_err().is_not_found());
        assert!(store.try_load("run-1").await.unwrap().is_none());
        assert!(store.list().await.unwrap().is_empty());
    }
}
