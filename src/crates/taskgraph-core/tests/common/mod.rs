//! Common test fixtures: a typed agent task and deterministic behaviors

#![allow(dead_code)]

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use taskgraph_core::agent::ACTION_OUTCOMES;
use taskgraph_core::{
    agent_graph, AgentBehaviors, CheckpointError, CheckpointStore, CancellationToken, EngineConfig,
    ExecutionEngine, FnNode, NodeAdapter, NodeError, NodeOutput, RetryPolicy, RunCheckpoint,
    RunResult,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub task_done: bool,
    pub plan: Vec<String>,
    pub trace: Vec<String>,
    pub retry_count: u32,
}

pub fn plan(mut task: Task) -> Task {
    task.plan = vec!["open page".to_string(), "extract table".to_string()];
    task.trace.push("planned".to_string());
    task
}

pub fn reason(mut task: Task) -> Task {
    let note = format!("reasoned over {} step(s)", task.plan.len());
    task.trace.push(note);
    task
}

/// Fails once (label `retry`), then finishes
pub fn act_retry_once(mut task: Task) -> (Task, &'static str) {
    if task.retry_count == 0 {
        task.retry_count += 1;
        task.trace.push("action failed".to_string());
        (task, "retry")
    } else {
        task.task_done = true;
        task.trace.push("action succeeded".to_string());
        (task, "end")
    }
}

pub fn act_finish(mut task: Task) -> (Task, &'static str) {
    task.task_done = true;
    task.trace.push("action succeeded".to_string());
    (task, "end")
}

pub fn act_continue(mut task: Task) -> (Task, &'static str) {
    task.trace.push("action pending".to_string());
    (task, "continue")
}

pub fn research(mut task: Task) -> Task {
    task.trace.push("researched".to_string());
    task
}

pub fn update_plan(mut task: Task) -> Task {
    task.plan.push("verify result".to_string());
    task.trace.push("replanned".to_string());
    task
}

pub fn node(f: fn(Task) -> Task) -> Arc<dyn NodeAdapter<Task>> {
    Arc::new(FnNode::new(move |task: Task| async move {
        Ok(NodeOutput::new(f(task)))
    }))
}

pub fn executor(f: fn(Task) -> (Task, &'static str)) -> Arc<dyn NodeAdapter<Task>> {
    Arc::new(
        FnNode::new(move |task: Task| async move {
            let (task, label) = f(task);
            Ok(NodeOutput::with_label(task, label))
        })
        .with_outcomes(ACTION_OUTCOMES),
    )
}

pub fn behaviors(act: fn(Task) -> (Task, &'static str)) -> AgentBehaviors<Task> {
    AgentBehaviors {
        planner: node(plan),
        reasoner: node(reason),
        executor: executor(act),
        researcher: node(research),
        plan_updater: node(update_plan),
    }
}

/// Config that never sleeps between retries
pub fn fast_config() -> EngineConfig {
    EngineConfig::default().with_retry_policy(RetryPolicy::immediate())
}

pub fn engine(act: fn(Task) -> (Task, &'static str), config: EngineConfig) -> ExecutionEngine<Task> {
    ExecutionEngine::new(agent_graph(behaviors(act)).unwrap(), config)
}

pub fn visits(result: &RunResult<Task>) -> Vec<(String, Option<String>)> {
    result
        .history
        .iter()
        .map(|visit| (visit.node.clone(), visit.label.clone()))
        .collect()
}

pub fn scenario_path() -> Vec<&'static str> {
    vec![
        "planner",
        "agent_reasoner",
        "action_executor(retry)",
        "researcher",
        "plan_updater",
        "agent_reasoner",
        "action_executor(end)",
    ]
}

/// Planner that fails `failures` times before planning
///
/// Each failing attempt scribbles on its own copy of the state first.
pub struct FlakyPlanner {
    pub failures: usize,
    pub retryable: bool,
    pub calls: AtomicUsize,
}

impl FlakyPlanner {
    pub fn new(failures: usize, retryable: bool) -> Self {
        Self {
            failures,
            retryable,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl NodeAdapter<Task> for FlakyPlanner {
    async fn invoke(&self, state: &Task) -> Result<NodeOutput<Task>, NodeError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let mut scratch = state.clone();
        scratch.trace.push(format!("partial write {call}"));

        if call < self.failures {
            let cause = format!("transient failure {call} after {} writes", scratch.trace.len());
            return Err(if self.retryable {
                NodeError::retryable(cause)
            } else {
                NodeError::fatal(cause)
            });
        }
        Ok(NodeOutput::new(plan(state.clone())))
    }
}

/// Store wrapper that cancels a run once the snapshot for `step` is written
pub struct CrashAfter {
    pub inner: Arc<dyn CheckpointStore>,
    pub step: usize,
    pub token: CancellationToken,
}

#[async_trait]
impl CheckpointStore for CrashAfter {
    async fn save(&self, checkpoint: &RunCheckpoint) -> Result<(), CheckpointError> {
        self.inner.save(checkpoint).await?;
        if checkpoint.step_count == self.step {
            self.token.cancel();
        }
        Ok(())
    }

    async fn load(&self, run_id: &str) -> Result<RunCheckpoint, CheckpointError> {
        self.inner.load(run_id).await
    }

    async fn delete(&self, run_id: &str) -> Result<(), CheckpointError> {
        self.inner.delete(run_id).await
    }

    async fn list(&self) -> Result<Vec<String>, CheckpointError> {
        self.inner.list().await
    }
}

/// Store whose writes always fail
#[derive(Default)]
pub struct FailingStore {
    pub saves: AtomicUsize,
}

#[async_trait]
impl CheckpointStore for FailingStore {
    async fn save(&self, _checkpoint: &RunCheckpoint) -> Result<(), CheckpointError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        Err(CheckpointError::Storage("disk full".to_string()))
    }

    async fn load(&self, run_id: &str) -> Result<RunCheckpoint, CheckpointError> {
        Err(CheckpointError::NotFound(run_id.to_string()))
    }

    async fn delete(&self, _run_id: &str) -> Result<(), CheckpointError> {
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, CheckpointError> {
        Ok(Vec::new())
    }
}
