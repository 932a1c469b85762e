//! Run API - start, resume, status, and cancel runs by id
//!
//! [`RunManager`] spawns each run onto the tokio runtime and tracks it by run
//! id. Runs are independent: each owns its context, its cancellation token,
//! and its result slot; the only thing they share is the engine (and through
//! it the graph and the checkpoint store).
//!
//! ```text
//! start(state) ──► run_id          spawn ──► ExecutionEngine::execute
//! status(run_id) ──► RunStatus     live watch channel, else checkpoint store
//! cancel(run_id)                   trips the run's CancellationToken
//! resume(run_id) ──► RunResult     await a live run, or continue an aborted
//!                                  one from its last checkpoint
//! forget(run_id) ──► RunResult     drop a finished run's entry
//! ```

use crate::context::{ExecutionContext, RunResult};
use crate::engine::ExecutionEngine;
use crate::error::{EngineError, RunError};
use crate::events::RunEvent;
use crate::node::GraphState;
use std::collections::HashMap;
use std::sync::Arc;
use taskgraph_checkpoint::{CheckpointError, RunId, RunStatus};
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct RunEntry<S> {
    status: watch::Receiver<RunStatus>,
    cancel: CancellationToken,
    result: Arc<Mutex<Option<RunResult<S>>>>,
    handle: JoinHandle<()>,
}

/// Tracks runs executing on the tokio runtime
///
/// Dropping the manager cancels runs still in flight.
pub struct RunManager<S> {
    engine: Arc<ExecutionEngine<S>>,
    runs: Arc<RwLock<HashMap<RunId, RunEntry<S>>>>,
}

impl<S: GraphState> RunManager<S> {
    /// Manage runs of `engine`
    pub fn new(engine: Arc<ExecutionEngine<S>>) -> Self {
        Self {
            engine,
            runs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Underlying engine
    pub fn engine(&self) -> &Arc<ExecutionEngine<S>> {
        &self.engine
    }

    /// Events of every run managed here
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.engine.subscribe()
    }

    /// Start a run from the entry node and return its id immediately
    pub async fn start(&self, initial: S) -> RunId {
        let ctx = self.engine.new_context(initial);
        let run_id = ctx.run_id().to_string();
        self.spawn(ctx).await;
        tracing::debug!(run_id = %run_id, "Run spawned");
        run_id
    }

    /// Result of a run, continuing it from its checkpoint when it was stopped
    ///
    /// - a live run is awaited
    /// - an `Aborted` run, or a run known only to the checkpoint store, is
    ///   continued from its last checkpoint and awaited
    /// - a `Completed` or `Failed` run returns its result unchanged
    ///
    /// # Errors
    ///
    /// [`RunError::NotFound`] when the id is unknown here and in the store.
    pub async fn resume(&self, run_id: &str) -> Result<RunResult<S>, RunError> {
        if let Some(result) = self.wait(run_id).await? {
            if result.status != RunStatus::Aborted {
                return Ok(result);
            }
            return match self.restart(run_id).await {
                Ok(result) => Ok(result),
                Err(RunError::NotFound(_)) => Ok(result),
                Err(e) => Err(e),
            };
        }
        self.restart(run_id).await
    }

    /// Current status of a run
    pub async fn status(&self, run_id: &str) -> Result<RunStatus, RunError> {
        if let Some(entry) = self.runs.read().await.get(run_id) {
            return Ok(*entry.status.borrow());
        }

        match self.engine.checkpoint_store().load(run_id).await {
            Ok(checkpoint) => Ok(checkpoint.status),
            Err(CheckpointError::NotFound(_)) => Err(RunError::NotFound(run_id.to_string())),
            Err(e) => Err(RunError::Engine(e.into())),
        }
    }

    /// Ask a live run to stop at the top of its next step
    ///
    /// Cancelling a run that already finished has no effect.
    pub async fn cancel(&self, run_id: &str) -> Result<(), RunError> {
        let runs = self.runs.read().await;
        let entry = runs
            .get(run_id)
            .ok_or_else(|| RunError::NotFound(run_id.to_string()))?;
        tracing::info!(run_id, "Cancelling run");
        entry.cancel.cancel();
        Ok(())
    }

    /// Stop tracking a finished run and hand back its result
    ///
    /// Live runs are left alone and yield `None`, as do unknown ids. The
    /// checkpoint store is untouched, so `status` and `resume` still find a
    /// forgotten run there.
    pub async fn forget(&self, run_id: &str) -> Option<RunResult<S>> {
        let mut runs = self.runs.write().await;
        let terminal = runs
            .get(run_id)
            .is_some_and(|entry| entry.status.borrow().is_terminal());
        if !terminal {
            return None;
        }
        let entry = runs.remove(run_id)?;
        drop(runs);

        tracing::debug!(run_id, "Forgetting finished run");
        let result = entry.result.lock().await.take();
        result
    }

    /// Ids of runs started or resumed through this manager
    pub async fn run_ids(&self) -> Vec<RunId> {
        let mut ids: Vec<RunId> = self.runs.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Wait for a live run to finish; `None` when the id is not tracked
    async fn wait(&self, run_id: &str) -> Result<Option<RunResult<S>>, RunError> {
        let (mut status, result) = {
            let runs = self.runs.read().await;
            match runs.get(run_id) {
                Some(entry) => (entry.status.clone(), Arc::clone(&entry.result)),
                None => return Ok(None),
            }
        };

        if status.wait_for(RunStatus::is_terminal).await.is_err() {
            return Err(RunError::Interrupted(run_id.to_string()));
        }

        let result = result.lock().await.clone();
        result
            .map(Some)
            .ok_or_else(|| RunError::Interrupted(run_id.to_string()))
    }

    /// Continue a run from its checkpoint on a fresh task and await it
    ///
    /// When another caller restarted the run first, awaits that task instead.
    async fn restart(&self, run_id: &str) -> Result<RunResult<S>, RunError> {
        let ctx = match self.engine.load_context(run_id).await {
            Ok(ctx) => ctx,
            Err(EngineError::Checkpoint(e)) if e.is_not_found() => {
                return Err(RunError::NotFound(run_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        if !self.spawn(ctx).await {
            tracing::debug!(run_id, "Run already restarted, joining it");
        }
        self.wait(run_id)
            .await?
            .ok_or_else(|| RunError::NotFound(run_id.to_string()))
    }

    /// Spawn `ctx` unless its run id is tracked and not `Aborted`
    ///
    /// The check and the insert happen under one write lock, so at most one
    /// task drives a run id and a replaced task has always finished.
    async fn spawn(&self, ctx: ExecutionContext<S>) -> bool {
        let run_id = ctx.run_id().to_string();
        let mut runs = self.runs.write().await;
        if let Some(existing) = runs.get(&run_id) {
            if *existing.status.borrow() != RunStatus::Aborted {
                return false;
            }
        }

        // Restored contexts carry their old terminal status; waiters must not see it
        let (status_tx, status_rx) = watch::channel(RunStatus::Pending);
        let cancel = CancellationToken::new();
        let result = Arc::new(Mutex::new(None));

        let engine = Arc::clone(&self.engine);
        let token = cancel.clone();
        let slot = Arc::clone(&result);
        let handle = tokio::spawn(async move {
            status_tx.send_replace(RunStatus::Running);
            let outcome = engine.execute(ctx, token).await;
            let terminal = outcome.status;
            *slot.lock().await = Some(outcome);
            status_tx.send_replace(terminal);
        });

        let entry = RunEntry {
            status: status_rx,
            cancel,
            result,
            handle,
        };
        if let Some(previous) = runs.insert(run_id, entry) {
            previous.handle.abort();
        }
        true
    }
}

impl<S> Drop for RunManager<S> {
    fn drop(&mut self) {
        if let Ok(runs) = self.runs.try_read() {
            for entry in runs.values() {
                entry.cancel.cancel();
            }
        }
    }
}
