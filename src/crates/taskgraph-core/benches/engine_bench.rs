use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::{json, Value};
use std::sync::Arc;
use taskgraph_core::{
    CheckpointPolicy, EngineConfig, ExecutionEngine, FnNode, GraphBuilder, GraphDefinition,
    InMemoryCheckpointStore, NodeOutput, END,
};

/// Single node looping on itself until `n` reaches `target`
fn loop_graph() -> GraphDefinition<Value> {
    let mut builder = GraphBuilder::new();
    builder
        .add_node(
            "step",
            FnNode::new(|mut state: Value| async move {
                let n = state["n"].as_u64().unwrap_or(0) + 1;
                state["n"] = json!(n);
                let label = if n >= state["target"].as_u64().unwrap_or(0) {
                    "end"
                } else {
                    "continue"
                };
                Ok(NodeOutput::with_label(state, label))
            })
            .with_outcomes(["end", "continue"]),
        )
        .add_conditional_edge("step", "end", END)
        .add_conditional_edge("step", "continue", "step")
        .set_entry("step");
    builder.build().unwrap()
}

fn run_loop_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let graph = Arc::new(loop_graph());

    let mut group = c.benchmark_group("engine loop");
    for steps in [10u64, 100] {
        let config = EngineConfig::default()
            .with_max_steps(1_000)
            .with_checkpoint_every(CheckpointPolicy::Never);
        let engine = ExecutionEngine::new(Arc::clone(&graph), config);

        group.bench_with_input(BenchmarkId::new("no checkpoints", steps), &steps, |b, &steps| {
            b.to_async(&runtime).iter(|| async {
                engine.run(black_box(json!({"n": 0, "target": steps}))).await
            });
        });

        let engine = ExecutionEngine::new(Arc::clone(&graph), EngineConfig::default().with_max_steps(1_000))
            .with_checkpoint_store(Arc::new(InMemoryCheckpointStore::new()));

        group.bench_with_input(BenchmarkId::new("memory checkpoints", steps), &steps, |b, &steps| {
            b.to_async(&runtime).iter(|| async {
                engine.run(black_box(json!({"n": 0, "target": steps}))).await
            });
        });
    }
    group.finish();
}

criterion_group!(benches, run_loop_benchmark);
criterion_main!(benches);
