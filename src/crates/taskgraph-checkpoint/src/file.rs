//! Directory-backed checkpoint storage
//!
//! [`FileCheckpointStore`] writes one pretty-printed JSON document per run,
//! named `<run_id>.json`, into a directory. Each save goes to a temporary
//! sibling file first and is then renamed over the previous snapshot, so a
//! crash mid-write leaves the last complete snapshot in place.

use crate::{
    checkpoint::RunCheckpoint,
    error::{CheckpointError, Result},
    traits::CheckpointStore,
};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const EXTENSION: &str = "json";

/// Checkpoint store keeping one JSON file per run
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    /// Use `dir` for snapshots, creating it if needed
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    /// Directory holding the snapshots
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, run_id: &str) -> Result<PathBuf> {
        validate_run_id(run_id)?;
        Ok(self.dir.join(format!("{run_id}.{EXTENSION}")))
    }
}

/// Run ids become file names; refuse anything that could escape the directory
fn validate_run_id(run_id: &str) -> Result<()> {
    if run_id.is_empty() {
        return Err(CheckpointError::Invalid("run_id is required".to_string()));
    }
    if run_id.starts_with('.')
        || run_id
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_control())
    {
        return Err(CheckpointError::Invalid(format!(
            "run_id '{run_id}' cannot be used as a file name"
        )));
    }
    Ok(())
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, checkpoint: &RunCheckpoint) -> Result<()> {
        let path = self.path_for(&checkpoint.run_id)?;
        let tmp = path.with_extension(format!("{EXTENSION}.tmp"));
        let payload = serde_json::to_vec_pretty(checkpoint)?;

        tokio::fs::write(&tmp, payload).await?;
        tokio::fs::rename(&tmp, &path).await?;

        tracing::trace!(run_id = %checkpoint.run_id, path = %path.display(), "Checkpoint written");
        Ok(())
    }

    async fn load(&self, run_id: &str) -> Result<RunCheckpoint> {
        let path = self.path_for(run_id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(CheckpointError::NotFound(run_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, run_id: &str) -> Result<()> {
        let path = self.path_for(run_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}
