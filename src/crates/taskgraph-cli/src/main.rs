//! taskgraph CLI - drive the reference agent loop from the command line
//!
//! ```text
//! taskgraph graph --format ascii
//! taskgraph run "open the store, search for lamps then add one to cart" --fail-step 2
//! taskgraph status <run-id>
//! taskgraph resume <run-id>
//! ```
//!
//! Runs checkpoint to `--checkpoint-dir` after every step; Ctrl-C aborts a
//! run at its next step boundary and leaves it resumable.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use taskgraph_checkpoint::{CheckpointStore, FileCheckpointStore};
use taskgraph_cli::demo::{behaviors, AgentTask, Simulation};
use taskgraph_core::{
    agent_graph, visualize, CancellationToken, EngineConfig, ExecutionEngine, RunEvent, RunResult,
    RunStatus, VisualizationOptions,
};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

/// How long to keep streaming events once the run has returned
const EVENT_DRAIN: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(name = "taskgraph")]
#[command(about = "Run the plan / reason / act / research agent loop", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Engine configuration file (YAML)
    #[arg(short, long, global = true, env = "TASKGRAPH_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding one checkpoint file per run
    #[arg(long, global = true, default_value = ".taskgraph/checkpoints")]
    checkpoint_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the reference topology
    Graph {
        /// Output format
        #[arg(short, long, value_enum, default_value = "mermaid")]
        format: Format,

        /// Show declared outcome labels
        #[arg(long)]
        details: bool,

        /// Diagram title
        #[arg(long)]
        title: Option<String>,
    },

    /// Start a new run
    Run {
        /// Task description; commas and "then" separate plan steps
        query: String,

        /// Override the step limit
        #[arg(long)]
        max_steps: Option<usize>,

        #[command(flatten)]
        sim: SimArgs,
    },

    /// Continue a run from its last checkpoint
    Resume {
        /// Run ID
        run_id: String,

        #[command(flatten)]
        sim: SimArgs,
    },

    /// Show a run's checkpointed status
    Status {
        /// Run ID
        run_id: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Mermaid,
    Ascii,
}

#[derive(Args)]
struct SimArgs {
    /// Plan step (1-based) whose action fails
    #[arg(long)]
    fail_step: Option<usize>,

    /// Times the failing action fails before succeeding
    #[arg(long, default_value_t = 1)]
    failures: u32,

    /// Latency of each reasoning step in milliseconds
    #[arg(long, default_value_t = 0)]
    latency_ms: u64,
}

impl From<SimArgs> for Simulation {
    fn from(args: SimArgs) -> Self {
        Simulation {
            fail_step: args.fail_step,
            failures: args.failures,
            latency: Duration::from_millis(args.latency_ms),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Graph { format, details, title } => {
            let graph = agent_graph(behaviors(Simulation::default()))?;
            let mut options = match format {
                Format::Mermaid => VisualizationOptions::mermaid(),
                Format::Ascii => VisualizationOptions::ascii(),
            };
            if details {
                options = options.with_details();
            }
            if let Some(title) = title {
                options = options.with_title(title);
            }
            print!("{}", visualize(&graph, &options));
            Ok(())
        }
        Commands::Run { query, max_steps, sim } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(max_steps) = max_steps {
                config = config.with_max_steps(max_steps);
            }
            config.validate()?;

            let engine = build_engine(config, sim.into(), &cli.checkpoint_dir).await?;
            let ctx = engine.new_context(AgentTask::new(query));
            println!("Run ID: {}", ctx.run_id());

            let cancel = cancel_on_ctrl_c();
            let printer = print_events(engine.subscribe());
            let result = engine.execute(ctx, cancel).await;
            let _ = tokio::time::timeout(EVENT_DRAIN, printer).await;
            report(&result)
        }
        Commands::Resume { run_id, sim } => {
            let config = load_config(cli.config.as_deref())?;
            config.validate()?;

            let engine = build_engine(config, sim.into(), &cli.checkpoint_dir).await?;
            let ctx = engine
                .load_context(&run_id)
                .await
                .with_context(|| format!("cannot resume run '{run_id}'"))?;

            let cancel = cancel_on_ctrl_c();
            let printer = print_events(engine.subscribe());
            let result = engine.execute(ctx, cancel).await;
            let _ = tokio::time::timeout(EVENT_DRAIN, printer).await;
            report(&result)
        }
        Commands::Status { run_id } => {
            let store = FileCheckpointStore::open(&cli.checkpoint_dir).await?;
            let checkpoint = store
                .load(&run_id)
                .await
                .with_context(|| format!("no checkpoint for run '{run_id}'"))?;
            let summary = json!({
                "runId": checkpoint.run_id,
                "status": checkpoint.status,
                "currentNode": checkpoint.current_node,
                "stepCount": checkpoint.step_count,
                "path": checkpoint.history.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "savedAt": checkpoint.saved_at,
                "resumable": checkpoint.is_resumable(),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
    }
}

/// Defaults, then the config file, then `TASKGRAPH_*` variables
fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => EngineConfig::default(),
    };
    Ok(config.apply_env()?)
}

async fn build_engine(
    config: EngineConfig,
    sim: Simulation,
    checkpoint_dir: &Path,
) -> Result<ExecutionEngine<AgentTask>> {
    let store = FileCheckpointStore::open(checkpoint_dir)
        .await
        .with_context(|| format!("cannot open checkpoint dir {}", checkpoint_dir.display()))?;
    let graph = agent_graph(behaviors(sim))?;
    Ok(ExecutionEngine::new(graph, config).with_checkpoint_store(Arc::new(store)))
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping at the next step");
            trigger.cancel();
        }
    });
    token
}

/// Stream events to stderr until the run finishes
fn print_events(mut events: broadcast::Receiver<RunEvent>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Ok(line) = serde_json::to_string(&event) {
                        eprintln!("{line}");
                    }
                    if event.is_final() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn report(result: &RunResult<AgentTask>) -> Result<()> {
    let summary = json!({
        "runId": result.run_id,
        "status": result.status,
        "stepCount": result.step_count,
        "path": result.path(),
        "failure": result.failure.as_ref().map(ToString::to_string),
        "state": result.state,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    match result.status {
        RunStatus::Completed => Ok(()),
        RunStatus::Aborted => bail!(
            "run {} aborted; continue it with `taskgraph resume {}`",
            result.run_id,
            result.run_id
        ),
        status => bail!("run {} ended {status}", result.run_id),
    }
}
