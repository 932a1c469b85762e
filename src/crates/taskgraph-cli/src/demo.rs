//! Simulated agent behaviors for the reference topology
//!
//! Each behavior is deterministic so a run can be replayed, interrupted, and
//! resumed from the command line. The action executor is a [`RoutedNode`]:
//! it performs the current plan step, records the outcome in the state, and
//! a routing function classifies that outcome.
//!
//! ```text
//! Success, plan steps left    -> continue
//! Success, plan exhausted     -> end
//! Failed,  retries left       -> retry   (research, then revise the plan)
//! Failed,  retries exhausted  -> end     (job halted)
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use taskgraph_core::agent::{ACTION_OUTCOMES, OUTCOME_CONTINUE, OUTCOME_END, OUTCOME_RETRY};
use taskgraph_core::{AgentBehaviors, FnNode, NodeAdapter, NodeOutput, RoutedNode};

/// Consecutive failed actions on one plan step before the job halts
pub const MAX_ACTION_RETRIES: u32 = 2;

/// Result of the last action
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionOutcome {
    /// No action has run yet
    #[default]
    Pending,
    /// The action did what the step asked
    Success,
    /// The action failed and the step is still open
    Failed,
}

/// Agent task state threaded through the graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentTask {
    pub query: String,
    pub plan: Vec<String>,
    pub current_task: String,
    /// 1-based index of the plan step being worked on
    pub step: usize,
    pub results: Vec<String>,
    pub history: Vec<String>,
    pub execution_summary: Vec<String>,
    pub last_action_outcome: ActionOutcome,
    pub last_error: Option<String>,
    pub retry_count: u32,
    pub research_summary: Option<String>,
}

impl AgentTask {
    /// Fresh task for `query`
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            step: 1,
            ..Default::default()
        }
    }
}

/// Failure injection and pacing for the simulated executor
#[derive(Debug, Clone, Default)]
pub struct Simulation {
    /// Plan step whose action fails
    pub fail_step: Option<usize>,
    /// How many times that action fails before succeeding
    pub failures: u32,
    /// Artificial latency of each reasoning step
    pub latency: Duration,
}

/// Split a query into plan steps on commas and "then"
pub fn plan_query(query: &str) -> Vec<String> {
    let steps: Vec<String> = query
        .split(',')
        .flat_map(|part| part.split(" then "))
        .map(str::trim)
        .filter(|step| !step.is_empty())
        .map(str::to_string)
        .collect();
    if steps.is_empty() {
        vec![query.trim().to_string()]
    } else {
        steps
    }
}

/// Classify the executor's result into an outcome label
pub fn route_action(task: &AgentTask) -> String {
    let label = match task.last_action_outcome {
        ActionOutcome::Failed if task.retry_count <= MAX_ACTION_RETRIES => OUTCOME_RETRY,
        ActionOutcome::Failed => OUTCOME_END,
        _ if task.step > task.plan.len() => OUTCOME_END,
        _ => OUTCOME_CONTINUE,
    };
    label.to_string()
}

fn plan(mut task: AgentTask) -> AgentTask {
    task.plan = plan_query(&task.query);
    task.execution_summary.push(format!(
        "[Plan] {} step(s): {}",
        task.plan.len(),
        task.plan.join("; ")
    ));
    task
}

fn reason(mut task: AgentTask) -> AgentTask {
    task.current_task = match task.plan.get(task.step.saturating_sub(1)) {
        Some(step) => step.clone(),
        None => "All plan steps are complete. Finish the job.".to_string(),
    };
    task.execution_summary
        .push(format!("[Step {}] Task: {}", task.step, task.current_task));
    task
}

fn act(mut task: AgentTask, sim: &Simulation) -> AgentTask {
    let failing = sim.fail_step == Some(task.step) && task.retry_count < sim.failures;

    if failing {
        let error = format!("element for '{}' not found", task.current_task);
        task.retry_count += 1;
        task.last_action_outcome = ActionOutcome::Failed;
        task.history.push(format!(
            "Step {} (Task: {}) -> FAILED ({error})",
            task.step, task.current_task
        ));
        task.last_error = Some(error);
    } else {
        task.results.push(format!("completed: {}", task.current_task));
        task.history
            .push(format!("Step {} (Task: {}) -> SUCCESS", task.step, task.current_task));
        task.last_action_outcome = ActionOutcome::Success;
        task.last_error = None;
        task.retry_count = 0;
        task.step += 1;
    }

    if task.last_action_outcome == ActionOutcome::Failed && task.retry_count > MAX_ACTION_RETRIES {
        task.execution_summary
            .push("[Job Halted] Maximum retries reached for a failing step.".to_string());
    }
    task
}

fn research(mut task: AgentTask) -> AgentTask {
    let summary = format!(
        "'{}' failed with: {}. Try waiting for the page to settle and use a broader selector.",
        task.current_task,
        task.last_error.as_deref().unwrap_or("unknown error")
    );
    task.research_summary = Some(summary);
    task
}

fn update_plan(mut task: AgentTask) -> AgentTask {
    if let Some(step) = task.plan.get_mut(task.step.saturating_sub(1)) {
        if !step.ends_with("(revised)") {
            step.push_str(" (revised)");
        }
    }
    task.execution_summary.push(format!(
        "[Plan Updated after Research] {}",
        task.plan.join("; ")
    ));
    task
}

fn sync_node(f: fn(AgentTask) -> AgentTask) -> Arc<dyn NodeAdapter<AgentTask>> {
    Arc::new(FnNode::new(move |task: AgentTask| async move {
        Ok(NodeOutput::new(f(task)))
    }))
}

/// The five behaviors of the agent loop under `sim`
pub fn behaviors(sim: Simulation) -> AgentBehaviors<AgentTask> {
    let latency = sim.latency;
    let reasoner = FnNode::new(move |task: AgentTask| async move {
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        Ok(NodeOutput::new(reason(task)))
    });

    let sim = Arc::new(sim);
    let action = FnNode::new(move |task: AgentTask| {
        let sim = Arc::clone(&sim);
        async move { Ok(NodeOutput::new(act(task, &sim))) }
    });

    AgentBehaviors {
        planner: sync_node(plan),
        reasoner: Arc::new(reasoner),
        executor: Arc::new(RoutedNode::new(action, ACTION_OUTCOMES, route_action)),
        researcher: sync_node(research),
        plan_updater: sync_node(update_plan),
    }
}
