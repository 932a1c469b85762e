//! Reference agent topology
//!
//! The five-stage plan / reason / act / research / revise loop, wired from
//! caller-supplied behaviors:
//!
//! ```text
//! entry: planner
//! planner          -> agent_reasoner
//! agent_reasoner   -> action_executor
//! action_executor  -> END             (end)
//! action_executor  -> agent_reasoner  (continue)
//! action_executor  -> researcher      (retry)
//! researcher       -> plan_updater
//! plan_updater     -> agent_reasoner
//! ```
//!
//! `action_executor` must declare exactly the outcomes
//! [`ACTION_OUTCOMES`]; building fails otherwise.

use crate::error::ValidationError;
use crate::graph::{GraphBuilder, GraphDefinition, END};
use crate::node::{GraphState, NodeAdapter};
use std::sync::Arc;

/// Builds the initial plan
pub const PLANNER: &str = "planner";
/// Chooses the next action
pub const AGENT_REASONER: &str = "agent_reasoner";
/// Performs the action and classifies the result
pub const ACTION_EXECUTOR: &str = "action_executor";
/// Gathers information after a failed action
pub const RESEARCHER: &str = "researcher";
/// Revises the plan with research findings
pub const PLAN_UPDATER: &str = "plan_updater";

/// Task finished
pub const OUTCOME_END: &str = "end";
/// Take another reasoning step
pub const OUTCOME_CONTINUE: &str = "continue";
/// Research and re-plan
pub const OUTCOME_RETRY: &str = "retry";

/// Outcome vocabulary of the action executor
pub const ACTION_OUTCOMES: [&str; 3] = [OUTCOME_END, OUTCOME_CONTINUE, OUTCOME_RETRY];

/// The five pluggable behaviors of the agent loop
pub struct AgentBehaviors<S> {
    /// Planning behavior
    pub planner: Arc<dyn NodeAdapter<S>>,
    /// Reasoning behavior
    pub reasoner: Arc<dyn NodeAdapter<S>>,
    /// Action-invocation behavior; must declare [`ACTION_OUTCOMES`]
    pub executor: Arc<dyn NodeAdapter<S>>,
    /// Research behavior
    pub researcher: Arc<dyn NodeAdapter<S>>,
    /// Plan-revision behavior
    pub plan_updater: Arc<dyn NodeAdapter<S>>,
}

/// Build the reference topology over `behaviors`
pub fn agent_graph<S: GraphState>(
    behaviors: AgentBehaviors<S>,
) -> Result<GraphDefinition<S>, ValidationError> {
    let mut builder = GraphBuilder::new();
    builder
        .add_node_arc(PLANNER, behaviors.planner)
        .add_node_arc(AGENT_REASONER, behaviors.reasoner)
        .add_node_arc(ACTION_EXECUTOR, behaviors.executor)
        .add_node_arc(RESEARCHER, behaviors.researcher)
        .add_node_arc(PLAN_UPDATER, behaviors.plan_updater)
        .add_edge(PLANNER, AGENT_REASONER)
        .add_edge(AGENT_REASONER, ACTION_EXECUTOR)
        .add_conditional_edge(ACTION_EXECUTOR, OUTCOME_END, END)
        .add_conditional_edge(ACTION_EXECUTOR, OUTCOME_CONTINUE, AGENT_REASONER)
        .add_conditional_edge(ACTION_EXECUTOR, OUTCOME_RETRY, RESEARCHER)
        .add_edge(RESEARCHER, PLAN_UPDATER)
        .add_edge(PLAN_UPDATER, AGENT_REASONER)
        .set_entry(PLANNER);
    builder.build()
}
