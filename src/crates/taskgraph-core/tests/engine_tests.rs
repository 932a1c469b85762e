//! End-to-end tests for the execution engine over the agent topology

mod common;

use common::*;
use proptest::prelude::*;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use taskgraph_core::agent::{ACTION_EXECUTOR, AGENT_REASONER, PLANNER};
use taskgraph_core::{
    agent_graph, CancellationToken, CheckpointPolicy, CheckpointStore, ExecutionEngine,
    FileCheckpointStore, FnNode, GraphBuilder, InMemoryCheckpointStore, NodeAdapter, NodeError,
    NodeOutput, RetryPolicy, RouterError, RunEvent, RunFailure, RunStatus, ValidationIssue, END,
};

const LABELS: [&str; 4] = ["a", "b", "c", "d"];

fn labels(mask: u8) -> Vec<&'static str> {
    LABELS
        .iter()
        .enumerate()
        .filter(|(i, _)| mask & (1 << i) != 0)
        .map(|(_, label)| *label)
        .collect()
}

proptest! {
    /// A conditional node builds only when its edges cover exactly its declared outcomes
    #[test]
    fn prop_declared_outcomes_match_edges(declared in 0u8..16, routed in 0u8..16) {
        let mut builder = GraphBuilder::<Task>::new();
        builder
            .add_node(
                "act",
                FnNode::new(|task: Task| async move { Ok(NodeOutput::new(task)) })
                    .with_outcomes(labels(declared)),
            )
            .set_entry("act");
        for label in labels(routed) {
            builder.add_conditional_edge("act", label, END);
        }

        let built = builder.build();
        prop_assert_eq!(built.is_ok(), declared == routed && declared != 0);

        if let Err(err) = built {
            for label in labels(declared & !routed) {
                let missing = err.has(|issue| {
                    matches!(issue, ValidationIssue::MissingLabel { label: l, .. } if l == label)
                });
                prop_assert!(missing);
            }
            for label in labels(routed & !declared) {
                let undeclared = err.has(|issue| {
                    matches!(issue, ValidationIssue::UndeclaredLabel { label: l, .. } if l == label)
                });
                prop_assert!(undeclared);
            }
        }
    }
}

#[tokio::test]
async fn test_state_threads_through_each_node() {
    let engine = engine(act_finish, fast_config());
    let result = engine.run(Task::default()).await;

    assert!(result.is_success());
    assert_eq!(result.state, act_finish(reason(plan(Task::default()))).0);
    assert_eq!(
        result.path(),
        vec!["planner", "agent_reasoner", "action_executor(end)"]
    );
    assert_eq!(result.step_count, 3);
}

#[tokio::test]
async fn test_reference_scenario_path() {
    let engine = engine(act_retry_once, fast_config());
    let mut events = engine.subscribe();

    let result = engine.run(Task::default()).await;

    assert_eq!(result.status, RunStatus::Completed);
    assert!(result.failure.is_none());
    assert_eq!(result.path(), scenario_path());
    assert!(result.state.task_done);
    assert_eq!(result.state.retry_count, 1);
    assert_eq!(
        result.state.plan,
        vec!["open page", "extract table", "verify result"]
    );

    let mut started = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let RunEvent::NodeStarted { node, .. } = event {
            started.push(node);
        }
    }
    assert_eq!(started.len(), 7);
    assert_eq!(started.first().map(String::as_str), Some(PLANNER));
}

#[tokio::test]
async fn test_step_limit_aborts_endless_loop() {
    let engine = engine(act_continue, fast_config().with_max_steps(5));
    let result = engine.run(Task::default()).await;

    assert_eq!(result.status, RunStatus::Aborted);
    assert_eq!(result.history.len(), 5);
    assert_eq!(result.step_count, 5);
    assert_eq!(
        result.failure,
        Some(RunFailure::StepLimitExceeded {
            max_steps: 5,
            next_node: AGENT_REASONER.to_string(),
        })
    );
    assert_eq!(
        result.path(),
        vec![
            "planner",
            "agent_reasoner",
            "action_executor(continue)",
            "agent_reasoner",
            "action_executor(continue)",
        ]
    );
}

fn flaky_engine(planner: Arc<FlakyPlanner>, retries: u32) -> ExecutionEngine<Task> {
    let mut behaviors = behaviors(act_finish);
    behaviors.planner = planner;
    ExecutionEngine::new(
        agent_graph(behaviors).unwrap(),
        fast_config().with_retry_budget(PLANNER, retries),
    )
}

#[tokio::test]
async fn test_retry_recovers_with_clean_state() {
    let planner = Arc::new(FlakyPlanner::new(2, true));
    let result = flaky_engine(planner.clone(), 3).run(Task::default()).await;

    let clean = engine(act_finish, fast_config()).run(Task::default()).await;

    assert!(result.is_success());
    assert_eq!(result.state, clean.state);
    assert_eq!(result.history[0].attempts, 3);
    assert_eq!(result.history[1].attempts, 1);
    assert_eq!(planner.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retry_budget_exhausted() {
    let planner = Arc::new(FlakyPlanner::new(2, true));
    let result = flaky_engine(planner.clone(), 1).run(Task::default()).await;

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.state, Task::default());
    assert!(result.history.is_empty());
    match result.failure {
        Some(RunFailure::Node(failure)) => {
            assert_eq!(failure.node, PLANNER);
            assert_eq!(failure.attempts, 2);
            assert!(failure.retryable);
        }
        other => panic!("expected node failure, got {other:?}"),
    }
    assert_eq!(planner.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_fatal_error_is_not_retried() {
    let planner = Arc::new(FlakyPlanner::new(1, false));
    let result = flaky_engine(planner.clone(), 5).run(Task::default()).await;

    assert_eq!(result.status, RunStatus::Failed);
    match result.failure {
        Some(RunFailure::Node(failure)) => {
            assert_eq!(failure.attempts, 1);
            assert!(!failure.retryable);
        }
        other => panic!("expected node failure, got {other:?}"),
    }
    assert_eq!(planner.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_retry_events_published() {
    let planner = Arc::new(FlakyPlanner::new(1, true));
    let engine = flaky_engine(planner, 2);
    let mut events = engine.subscribe();

    engine.run(Task::default()).await;

    let mut retries = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let RunEvent::NodeRetrying { node, attempt, delay_ms, .. } = event {
            retries.push((node, attempt, delay_ms));
        }
    }
    assert_eq!(retries, vec![(PLANNER.to_string(), 1, 0)]);
}

#[tokio::test]
async fn test_oversized_backoff_saturates_and_stays_cancellable() {
    let policy = RetryPolicy::default()
        .with_initial_interval(1e20)
        .with_max_interval(1e20);
    let config = fast_config()
        .with_retry_policy(policy)
        .with_default_retry_budget(1);
    config.validate().unwrap();

    let mut behaviors = behaviors(act_finish);
    behaviors.planner = Arc::new(FlakyPlanner::new(1, true));
    let engine = ExecutionEngine::new(agent_graph(behaviors).unwrap(), config);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });
    let result = engine.run_with_cancel(Task::default(), cancel).await;

    assert_eq!(result.status, RunStatus::Aborted);
    assert_eq!(result.failure, Some(RunFailure::Cancelled { step_count: 0 }));
}

#[tokio::test(start_paused = true)]
async fn test_node_timeout_is_a_retryable_failure() {
    let mut behaviors = behaviors(act_finish);
    behaviors.reasoner = Arc::new(FnNode::new(|task: Task| async move {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok(NodeOutput::new(task))
    }));
    let config = fast_config()
        .with_node_timeout(Some(Duration::from_millis(100)))
        .with_retry_budget(AGENT_REASONER, 1);
    let engine = ExecutionEngine::new(agent_graph(behaviors).unwrap(), config);

    let result = engine.run(Task::default()).await;

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.path(), vec!["planner"]);
    match result.failure {
        Some(RunFailure::Node(failure)) => {
            assert_eq!(failure.node, AGENT_REASONER);
            assert_eq!(failure.attempts, 2);
            assert!(failure.retryable);
            assert!(failure.cause.contains("timed out after 100 ms"));
        }
        other => panic!("expected timeout failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_undeclared_label_fails_and_keeps_last_good_state() {
    fn escalate(task: Task) -> (Task, &'static str) {
        (task, "escalate")
    }
    let engine = engine(escalate, fast_config());

    let result = engine.run(Task::default()).await;

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.state, reason(plan(Task::default())));
    assert_eq!(result.path(), vec!["planner", "agent_reasoner"]);
    assert_eq!(
        result.failure,
        Some(RunFailure::Router(RouterError::UnmatchedLabel {
            node: ACTION_EXECUTOR.to_string(),
            label: "escalate".to_string(),
            expected: vec![
                "continue".to_string(),
                "end".to_string(),
                "retry".to_string()
            ],
        }))
    );
}

#[tokio::test]
async fn test_resume_matches_uninterrupted_run() {
    let dir = tempfile::tempdir().unwrap();
    let files: Arc<dyn CheckpointStore> =
        Arc::new(FileCheckpointStore::open(dir.path()).await.unwrap());

    let token = CancellationToken::new();
    let crashing: Arc<dyn CheckpointStore> = Arc::new(CrashAfter {
        inner: files.clone(),
        step: 2,
        token: token.clone(),
    });
    let first = engine(act_retry_once, fast_config()).with_checkpoint_store(crashing);
    let interrupted = first.run_with_cancel(Task::default(), token).await;

    assert_eq!(interrupted.status, RunStatus::Aborted);
    assert_eq!(interrupted.step_count, 2);
    assert_eq!(
        interrupted.failure,
        Some(RunFailure::Cancelled { step_count: 2 })
    );

    let stored = files.load(&interrupted.run_id).await.unwrap();
    assert_eq!(stored.current_node.as_deref(), Some(ACTION_EXECUTOR));
    assert!(stored.is_resumable());

    // A fresh engine over the same directory stands in for a restarted process
    let second = engine(act_retry_once, fast_config()).with_checkpoint_store(files.clone());
    let resumed = second.resume(&interrupted.run_id).await.unwrap();

    let single = engine(act_retry_once, fast_config()).run(Task::default()).await;

    assert_eq!(resumed.status, RunStatus::Completed);
    assert_eq!(resumed.run_id, interrupted.run_id);
    assert_eq!(resumed.state, single.state);
    assert_eq!(visits(&resumed), visits(&single));
    assert_eq!(resumed.step_count, single.step_count);
}

#[tokio::test]
async fn test_completed_run_checkpoint_and_resume() {
    let store = InMemoryCheckpointStore::new();
    let engine = engine(act_retry_once, fast_config()).with_checkpoint_store(Arc::new(store.clone()));

    let result = engine.run(Task::default()).await;
    let stored = store.load(&result.run_id).await.unwrap();
    assert_eq!(stored.status, RunStatus::Completed);
    assert_eq!(stored.current_node, None);
    assert_eq!(stored.step_count, 7);
    assert!(!stored.is_resumable());

    let mut events = engine.subscribe();
    let again = engine.resume(&result.run_id).await.unwrap();
    assert_eq!(again.status, RunStatus::Completed);
    assert_eq!(again.state, result.state);
    assert_eq!(again.history.len(), 7);

    let mut finished = Vec::new();
    while let Ok(event) = events.try_recv() {
        assert!(!matches!(event, RunEvent::NodeStarted { .. }));
        if let RunEvent::RunFinished { run_id, status, step_count, failure } = event {
            finished.push((run_id, status, step_count, failure));
        }
    }
    assert_eq!(
        finished,
        vec![(result.run_id.clone(), RunStatus::Completed, 7, None)]
    );
}

#[tokio::test]
async fn test_concurrent_runs_are_isolated() {
    let engine = Arc::new(engine(act_retry_once, fast_config()));

    let runs = (0..8).map(|i| {
        let engine = engine.clone();
        async move {
            let initial = Task {
                trace: vec![format!("run {i}")],
                ..Task::default()
            };
            engine.run(initial).await
        }
    });
    let results = futures::future::join_all(runs).await;

    let mut ids: Vec<&str> = results.iter().map(|r| r.run_id.as_str()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 8);

    for (i, result) in results.iter().enumerate() {
        assert!(result.is_success());
        assert_eq!(result.path(), scenario_path());
        assert_eq!(result.state.trace[0], format!("run {i}"));
        assert_eq!(result.state.retry_count, 1);
    }
}

#[tokio::test]
async fn test_checkpoint_failure_tolerated_by_default() {
    let store = Arc::new(FailingStore::default());
    let engine = engine(act_finish, fast_config().with_checkpoint_retries(0))
        .with_checkpoint_store(store.clone());
    let mut events = engine.subscribe();

    let result = engine.run(Task::default()).await;

    assert!(result.is_success());
    // initial, three steps, final
    assert_eq!(store.saves.load(Ordering::SeqCst), 5);

    let mut failed = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, RunEvent::CheckpointFailed { .. }) {
            failed += 1;
        }
    }
    assert_eq!(failed, 5);
}

#[tokio::test]
async fn test_required_checkpoint_failure_fails_run() {
    let store = Arc::new(FailingStore::default());
    let config = fast_config()
        .with_checkpoint_retries(2)
        .with_required_checkpoints(true);
    let engine = engine(act_finish, config).with_checkpoint_store(store.clone());

    let result = engine.run(Task::default()).await;

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.step_count, 0);
    assert!(matches!(result.failure, Some(RunFailure::Checkpoint(ref e)) if e.contains("disk full")));
    // three writes for the initial snapshot, three for the final one
    assert_eq!(store.saves.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn test_checkpoint_policy_never_skips_store() {
    let store = Arc::new(FailingStore::default());
    let config = fast_config()
        .with_checkpoint_every(CheckpointPolicy::Never)
        .with_required_checkpoints(true);
    let engine = engine(act_finish, config).with_checkpoint_store(store.clone());

    let result = engine.run(Task::default()).await;

    assert!(result.is_success());
    assert_eq!(store.saves.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_node_sees_only_its_input_state() {
    let mut behaviors = behaviors(act_finish);
    let seen: Arc<tokio::sync::Mutex<Vec<usize>>> = Arc::default();
    let record = seen.clone();
    let reasoner: Arc<dyn NodeAdapter<Task>> = Arc::new(FnNode::new(move |task: Task| {
        let record = record.clone();
        async move {
            record.lock().await.push(task.trace.len());
            if record.lock().await.len() == 1 {
                return Err(NodeError::retryable("first try"));
            }
            Ok(NodeOutput::new(reason(task)))
        }
    }));
    behaviors.reasoner = reasoner;
    let engine = ExecutionEngine::new(
        agent_graph(behaviors).unwrap(),
        fast_config().with_default_retry_budget(1),
    );

    let result = engine.run(Task::default()).await;

    assert!(result.is_success());
    assert_eq!(*seen.lock().await, vec![1, 1]);
}
