//! Execution engine - the per-run step loop
//!
//! The engine drives one run at a time per call, but holds no per-run state
//! itself: any number of runs may execute concurrently against the same
//! engine and the same shared [`GraphDefinition`].
//!
//! # Run Loop
//!
//! ```text
//!            ┌──────────────────────────────────────────────────────┐
//!            │                                                      │
//!            ▼                                                      │
//! ┌─────────────────────┐   cancelled?     ┌─────────────┐          │
//! │ top of step         │ ───────────────► │  Aborted    │          │
//! │ (current_node)      │   step limit?    │             │          │
//! └─────────┬───────────┘ ───────────────► └─────────────┘          │
//!           │ invoke (timeout, retries)                             │
//!           ▼                                                       │
//! ┌─────────────────────┐   NodeFailure    ┌─────────────┐          │
//! │ NodeAdapter::invoke │ ───────────────► │  Failed     │          │
//! └─────────┬───────────┘                  └─────────────┘          │
//!           │ (state, label)                      ▲                 │
//!           ▼                                     │ RouterError     │
//! ┌─────────────────────┐ ────────────────────────┘                 │
//! │ Router::next        │                                           │
//! └─────────┬───────────┘   END            ┌─────────────┐          │
//!           │ ───────────────────────────► │  Completed  │          │
//!           │ node                         └─────────────┘          │
//!           ▼                                                       │
//!   advance context, checkpoint ────────────────────────────────────┘
//! ```
//!
//! - The loop is iterative; cycles in the topology never grow the stack.
//! - State is replaced only after a node succeeds *and* its outcome routes,
//!   so a failed, timed-out, or misrouted attempt never leaks into the
//!   context or into a retry.
//! - Cancellation is observed at the top of each step and during retry
//!   backoff, never in the middle of a node invocation.
//!
//! # Examples
//!
//! ```rust,ignore
//! use taskgraph_core::{EngineConfig, ExecutionEngine, InMemoryCheckpointStore};
//! use std::sync::Arc;
//!
//! let engine = ExecutionEngine::new(graph, EngineConfig::default().with_max_steps(25))
//!     .with_checkpoint_store(Arc::new(InMemoryCheckpointStore::new()));
//!
//! let result = engine.run(initial_state).await;
//! if !result.is_success() {
//!     eprintln!("run {} stopped: {:?}", result.run_id, result.failure);
//! }
//!
//! // Later, possibly in a new process with a durable store:
//! let resumed = engine.resume(&result.run_id).await?;
//! ```

use crate::config::{CheckpointPolicy, EngineConfig};
use crate::context::{ExecutionContext, RunResult};
use crate::error::{EngineError, NodeError, NodeFailure, RouterError, RunFailure};
use crate::events::RunEvent;
use crate::graph::{GraphDefinition, Node};
use crate::node::{GraphState, NodeOutput};
use std::sync::Arc;
use taskgraph_checkpoint::{CheckpointStore, NoopCheckpointStore, RunStatus};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Drives runs over a shared graph definition
pub struct ExecutionEngine<S> {
    graph: Arc<GraphDefinition<S>>,
    config: EngineConfig,
    store: Arc<dyn CheckpointStore>,
    events: broadcast::Sender<RunEvent>,
}

impl<S: GraphState> ExecutionEngine<S> {
    /// Engine over `graph` with checkpointing to a no-op store
    pub fn new(graph: impl Into<Arc<GraphDefinition<S>>>, config: EngineConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            graph: graph.into(),
            config,
            store: Arc::new(NoopCheckpointStore),
            events,
        }
    }

    /// Use `store` for checkpoints and resume
    pub fn with_checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.store = store;
        self
    }

    /// Graph this engine executes
    pub fn graph(&self) -> &Arc<GraphDefinition<S>> {
        &self.graph
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Checkpoint store in use
    pub fn checkpoint_store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    /// Receive events of every run started after this call
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.events.subscribe()
    }

    /// Fresh context with a new run id, positioned at the entry node
    pub fn new_context(&self, initial: S) -> ExecutionContext<S> {
        ExecutionContext::new(Uuid::new_v4().to_string(), initial, self.graph.entry())
    }

    /// Run from the entry node to a terminal status
    pub async fn run(&self, initial: S) -> RunResult<S> {
        self.run_with_cancel(initial, CancellationToken::new()).await
    }

    /// Run from the entry node, stopping early when `cancel` fires
    pub async fn run_with_cancel(&self, initial: S, cancel: CancellationToken) -> RunResult<S> {
        let ctx = self.new_context(initial);
        self.execute(ctx, cancel).await
    }

    /// Continue a run from its last checkpoint
    ///
    /// # Errors
    ///
    /// Fails when the store has no checkpoint for `run_id`, the stored state
    /// does not fit `S`, or the checkpoint points at a node this graph lacks.
    pub async fn resume(&self, run_id: &str) -> Result<RunResult<S>, EngineError> {
        self.resume_with_cancel(run_id, CancellationToken::new())
            .await
    }

    /// Continue a run from its last checkpoint, stopping early when `cancel` fires
    pub async fn resume_with_cancel(
        &self,
        run_id: &str,
        cancel: CancellationToken,
    ) -> Result<RunResult<S>, EngineError> {
        let ctx = self.load_context(run_id).await?;
        Ok(self.execute(ctx, cancel).await)
    }

    /// Rebuild a run's context from its last checkpoint
    pub async fn load_context(&self, run_id: &str) -> Result<ExecutionContext<S>, EngineError> {
        let checkpoint = self.store.load(run_id).await?;
        let ctx = ExecutionContext::from_checkpoint(checkpoint).map_err(EngineError::State)?;

        if let Some(node) = ctx.current_node() {
            if !self.graph.contains(node) {
                return Err(EngineError::UnknownNode {
                    run_id: run_id.to_string(),
                    node: node.to_string(),
                });
            }
        }
        Ok(ctx)
    }

    /// Drive `ctx` until it reaches a terminal status
    ///
    /// A context that already routed to the terminal sentinel is returned as
    /// `Completed` without invoking any node.
    #[tracing::instrument(skip_all, fields(run_id = %ctx.run_id()))]
    pub async fn execute(
        &self,
        mut ctx: ExecutionContext<S>,
        cancel: CancellationToken,
    ) -> RunResult<S> {
        let Some(start) = ctx.current_node().map(str::to_string) else {
            tracing::info!(steps = ctx.step_count(), "Run already completed");
            ctx.set_status(RunStatus::Completed);
            self.publish(RunEvent::RunFinished {
                run_id: ctx.run_id().to_string(),
                status: RunStatus::Completed,
                step_count: ctx.step_count(),
                failure: None,
            });
            return ctx.into_result(None);
        };

        let resumed = ctx.status() != RunStatus::Pending;
        ctx.set_status(RunStatus::Running);
        if resumed {
            tracing::info!(node = %start, steps = ctx.step_count(), "Resuming run");
            self.publish(RunEvent::RunResumed {
                run_id: ctx.run_id().to_string(),
                node: start,
                step_count: ctx.step_count(),
            });
        } else {
            tracing::info!(entry = %start, max_steps = self.config.max_steps, "Starting run");
            self.publish(RunEvent::RunStarted {
                run_id: ctx.run_id().to_string(),
                entry: start,
            });
        }

        if let Err(failure) = self.checkpoint(&ctx).await {
            return self.finish(ctx, RunStatus::Failed, Some(failure)).await;
        }

        loop {
            let Some(node_name) = ctx.current_node().map(str::to_string) else {
                return self.finish(ctx, RunStatus::Completed, None).await;
            };

            if cancel.is_cancelled() {
                let failure = RunFailure::Cancelled {
                    step_count: ctx.step_count(),
                };
                return self.finish(ctx, RunStatus::Aborted, Some(failure)).await;
            }

            if ctx.step_count() >= self.config.max_steps {
                let failure = RunFailure::StepLimitExceeded {
                    max_steps: self.config.max_steps,
                    next_node: node_name,
                };
                return self.finish(ctx, RunStatus::Aborted, Some(failure)).await;
            }

            let Some(node) = self.graph.node(&node_name) else {
                let failure: RunFailure = RouterError::UnknownNode { node: node_name }.into();
                return self.finish(ctx, RunStatus::Failed, Some(failure)).await;
            };

            let (output, attempts) = match self.invoke_node(&ctx, node, &cancel).await {
                Ok(invoked) => invoked,
                Err(failure @ RunFailure::Cancelled { .. }) => {
                    return self.finish(ctx, RunStatus::Aborted, Some(failure)).await;
                }
                Err(failure) => {
                    return self.finish(ctx, RunStatus::Failed, Some(failure)).await;
                }
            };

            let destination = match self
                .graph
                .router()
                .next(&node_name, output.label.as_deref())
            {
                Ok(destination) => destination,
                Err(err) => {
                    return self.finish(ctx, RunStatus::Failed, Some(err.into())).await;
                }
            };

            let label = output.label.clone();
            ctx.advance(&node_name, output, attempts, &destination);
            tracing::debug!(
                node = %node_name,
                label = ?label,
                next = %destination,
                step = ctx.step_count(),
                "Step completed"
            );
            self.publish(RunEvent::NodeCompleted {
                run_id: ctx.run_id().to_string(),
                node: node_name,
                label,
                step: ctx.step_count(),
                next: destination.to_string(),
            });

            if let Err(failure) = self.checkpoint(&ctx).await {
                return self.finish(ctx, RunStatus::Failed, Some(failure)).await;
            }
        }
    }

    /// Invoke one node with timeout and retry budget
    ///
    /// Every attempt receives the same input state. Returns the output and the
    /// number of attempts it took.
    async fn invoke_node(
        &self,
        ctx: &ExecutionContext<S>,
        node: &Node<S>,
        cancel: &CancellationToken,
    ) -> Result<(NodeOutput<S>, u32), RunFailure> {
        let budget = self.config.retries_for(&node.name);
        let step = ctx.step_count() + 1;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            tracing::debug!(
                node = %node.name,
                step,
                attempt,
                max_attempts = budget + 1,
                "Invoking node"
            );
            self.publish(RunEvent::NodeStarted {
                run_id: ctx.run_id().to_string(),
                node: node.name.clone(),
                step,
                attempt,
            });

            let result = match self.config.per_node_timeout {
                Some(limit) => {
                    match tokio::time::timeout(limit, node.adapter.invoke(ctx.state())).await {
                        Ok(result) => result,
                        Err(_) => Err(NodeError::retryable(format!(
                            "timed out after {} ms",
                            limit.as_millis()
                        ))),
                    }
                }
                None => node.adapter.invoke(ctx.state()).await,
            };

            let err = match result {
                Ok(output) => {
                    if attempt > 1 {
                        tracing::info!(node = %node.name, attempts = attempt, "Node succeeded after retry");
                    }
                    return Ok((output, attempt));
                }
                Err(err) => err,
            };

            let retries_used = attempt - 1;
            if !err.retryable || retries_used >= budget {
                tracing::error!(
                    node = %node.name,
                    attempts = attempt,
                    retryable = err.retryable,
                    cause = %err.cause,
                    "Node failed"
                );
                return Err(NodeFailure {
                    node: node.name.clone(),
                    cause: err.cause,
                    retryable: err.retryable,
                    attempts: attempt,
                }
                .into());
            }

            let delay = self.config.retry_policy.calculate_delay(retries_used);
            tracing::warn!(
                node = %node.name,
                attempt,
                max_attempts = budget + 1,
                delay_ms = delay.as_millis() as u64,
                cause = %err.cause,
                "Node failed, retrying after delay"
            );
            self.publish(RunEvent::NodeRetrying {
                run_id: ctx.run_id().to_string(),
                node: node.name.clone(),
                attempt,
                cause: err.cause,
                delay_ms: delay.as_millis() as u64,
            });

            if !delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        tracing::info!(node = %node.name, "Run cancelled during retry backoff");
                        return Err(RunFailure::Cancelled {
                            step_count: ctx.step_count(),
                        });
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    /// Offer the context to the store according to the checkpoint policy
    ///
    /// Errors only when checkpoints are required and the write kept failing.
    async fn checkpoint(&self, ctx: &ExecutionContext<S>) -> Result<(), RunFailure> {
        if self.config.checkpoint_every == CheckpointPolicy::Never {
            return Ok(());
        }

        match self.save_checkpoint(ctx).await {
            Ok(()) => Ok(()),
            Err(error) if self.config.require_checkpoints => Err(RunFailure::Checkpoint(error)),
            Err(error) => {
                tracing::warn!(
                    step = ctx.step_count(),
                    error = %error,
                    "Continuing without checkpoint"
                );
                Ok(())
            }
        }
    }

    /// Write a snapshot, retrying `checkpoint_retries` times
    async fn save_checkpoint(&self, ctx: &ExecutionContext<S>) -> Result<(), String> {
        let checkpoint = match ctx.to_checkpoint() {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                let error = format!("state could not be serialized: {e}");
                self.publish_checkpoint_failed(ctx, &error);
                return Err(error);
            }
        };

        let mut retries: u32 = 0;
        loop {
            match self.store.save(&checkpoint).await {
                Ok(()) => {
                    tracing::debug!(step = ctx.step_count(), status = %ctx.status(), "Checkpoint saved");
                    self.publish(RunEvent::CheckpointSaved {
                        run_id: ctx.run_id().to_string(),
                        step_count: ctx.step_count(),
                    });
                    return Ok(());
                }
                Err(e) if retries < self.config.checkpoint_retries => {
                    let delay = self.config.retry_policy.calculate_delay(retries);
                    retries += 1;
                    tracing::warn!(
                        attempt = retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Checkpoint write failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    let error = e.to_string();
                    tracing::warn!(attempts = retries + 1, error = %error, "Checkpoint write failed");
                    self.publish_checkpoint_failed(ctx, &error);
                    return Err(error);
                }
            }
        }
    }

    fn publish_checkpoint_failed(&self, ctx: &ExecutionContext<S>, error: &str) {
        self.publish(RunEvent::CheckpointFailed {
            run_id: ctx.run_id().to_string(),
            step_count: ctx.step_count(),
            error: error.to_string(),
        });
    }

    /// Record the terminal status and build the result
    async fn finish(
        &self,
        mut ctx: ExecutionContext<S>,
        status: RunStatus,
        failure: Option<RunFailure>,
    ) -> RunResult<S> {
        ctx.set_status(status);

        // The final snapshot is best-effort; failures were already reported
        if self.config.checkpoint_every != CheckpointPolicy::Never {
            let _ = self.save_checkpoint(&ctx).await;
        }

        match &failure {
            None => tracing::info!(steps = ctx.step_count(), "Run completed"),
            Some(f @ RunFailure::Cancelled { .. }) | Some(f @ RunFailure::StepLimitExceeded { .. }) => {
                tracing::warn!(steps = ctx.step_count(), failure = %f, "Run aborted")
            }
            Some(f) => tracing::error!(steps = ctx.step_count(), failure = %f, "Run failed"),
        }

        self.publish(RunEvent::RunFinished {
            run_id: ctx.run_id().to_string(),
            status,
            step_count: ctx.step_count(),
            failure: failure.as_ref().map(ToString::to_string),
        });
        ctx.into_result(failure)
    }

    fn publish(&self, event: RunEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

impl<S> std::fmt::Debug for ExecutionEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("graph", &self.graph)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphBuilder, END};
    use crate::node::FnNode;
    use serde_json::{json, Value};

    fn counting_graph() -> GraphDefinition<Value> {
        let mut builder = GraphBuilder::new();
        builder
            .add_node(
                "count",
                FnNode::new(|mut state: Value| async move {
                    let n = state["n"].as_i64().unwrap_or(0) + 1;
                    state["n"] = json!(n);
                    let label = if n >= 3 { "end" } else { "continue" };
                    Ok(NodeOutput::with_label(state, label))
                })
                .with_outcomes(["end", "continue"]),
            )
            .add_conditional_edge("count", "end", END)
            .add_conditional_edge("count", "continue", "count")
            .set_entry("count");
        builder.build().unwrap()
    }

    #[tokio::test]
    async fn test_self_loop_runs_to_completion() {
        let engine = ExecutionEngine::new(counting_graph(), EngineConfig::default());
        let result = engine.run(json!({"n": 0})).await;

        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.state, json!({"n": 3}));
        assert_eq!(
            result.path(),
            vec!["count(continue)", "count(continue)", "count(end)"]
        );
    }

    #[tokio::test]
    async fn test_events_are_published_in_order() {
        let engine = ExecutionEngine::new(counting_graph(), EngineConfig::default());
        let mut events = engine.subscribe();
        let result = engine.run(json!({"n": 2})).await;

        let mut names = Vec::new();
        while let Ok(event) = events.try_recv() {
            assert_eq!(event.run_id(), result.run_id);
            names.push(event.name());
        }
        assert_eq!(
            names,
            vec![
                "run_started",
                "checkpoint_saved",
                "node_started",
                "node_completed",
                "checkpoint_saved",
                "checkpoint_saved",
                "run_finished",
            ]
        );
    }

    #[tokio::test]
    async fn test_pre_cancelled_run_aborts_before_first_step() {
        let engine = ExecutionEngine::new(counting_graph(), EngineConfig::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = engine.run_with_cancel(json!({"n": 0}), cancel).await;
        assert_eq!(result.status, RunStatus::Aborted);
        assert_eq!(result.failure, Some(RunFailure::Cancelled { step_count: 0 }));
        assert!(result.history.is_empty());
    }

    #[tokio::test]
    async fn test_resume_unknown_run() {
        let engine = ExecutionEngine::new(counting_graph(), EngineConfig::default());
        let err = engine.resume("missing").await.unwrap_err();
        assert!(matches!(err, EngineError::Checkpoint(ref e) if e.is_not_found()));
    }
}
