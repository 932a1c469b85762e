//! In-memory checkpoint storage for development and testing
//!
//! [`InMemoryCheckpointStore`] keeps the latest snapshot of every run in a
//! `Arc<RwLock<HashMap>>`. Clones share the same map, so a store handed to an
//! engine can be inspected from a test after the run.
//!
//! Data does not survive a process restart. Use
//! [`FileCheckpointStore`](crate::file::FileCheckpointStore) when resume after
//! a crash is required.

use crate::{
    checkpoint::RunCheckpoint,
    error::{CheckpointError, Result},
    traits::CheckpointStore,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

type CheckpointStorage = Arc<RwLock<HashMap<String, RunCheckpoint>>>;

/// Thread-safe in-memory checkpoint store
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckpointStore {
    storage: CheckpointStorage,
}

impl InMemoryCheckpointStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of runs with a stored snapshot
    pub async fn run_count(&self) -> usize {
        self.storage.read().await.len()
    }

    /// Drop every snapshot
    pub async fn clear(&self) {
        self.storage.write().await.clear();
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, checkpoint: &RunCheckpoint) -> Result<()> {
        if checkpoint.run_id.is_empty() {
            return Err(CheckpointError::Invalid("run_id is required".to_string()));
        }

        let mut storage = self.storage.write().await;
        storage.insert(checkpoint.run_id.clone(), checkpoint.clone());
        Ok(())
    }

    async fn load(&self, run_id: &str) -> Result<RunCheckpoint> {
        let storage = self.storage.read().await;
        storage
            .get(run_id)
            .cloned()
            .ok_or_else(|| CheckpointError::NotFound(run_id.to_string()))
    }

    async fn delete(&self, run_id: &str) -> Result<()> {
        self.storage.write().await.remove(run_id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>> {
        let storage = self.storage.read().await;
        let mut ids: Vec<String> = storage.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
