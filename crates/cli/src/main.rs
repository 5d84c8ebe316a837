//! `sail-planner` CLI entry-point.
//!
//! Available sub-commands:
//! - `plan`     — decide go/no-go for a trip.
//! - `validate` — validate a workflow JSON file.
//! - `graph`    — print the built-in sailing workflow.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use engine::{FailurePolicy, SailPlan, SailPlanner, SchedulerConfig, Workflow, WorkflowGraph};
use nodes::sailing::TripInput;
use providers::{noaa, openai, ChatOracle, ChatOracleConfig, NoaaTides};

#[derive(Parser)]
#[command(
    name = "sail-planner",
    about = "Go/no-go sailing decisions from wind, weather and tidal current",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the sailing workflow for one trip.
    Plan(PlanArgs),
    /// Validate a workflow definition JSON file.
    Validate {
        /// Path to the workflow JSON file.
        path: PathBuf,
    },
    /// Print the built-in sailing workflow.
    Graph,
}

#[derive(clap::Args)]
struct PlanArgs {
    /// Departure location, e.g. "Port Orchard Marina, Port Orchard, Washington".
    #[arg(long)]
    location: String,
    /// Departure date as MM/DD/YYYY.
    #[arg(long)]
    date: String,
    /// Destination; defaults to a round trip.
    #[arg(long)]
    end_location: Option<String>,
    /// Print each analyst's reasoning under the decision.
    #[arg(long)]
    show_reasoning: bool,
    /// Print the full plan as JSON.
    #[arg(long)]
    json: bool,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: String,
    #[arg(long, env = "SAIL_PLANNER_MODEL", default_value = openai::DEFAULT_MODEL)]
    model: String,
    #[arg(long, env = "OPENAI_BASE_URL", default_value = openai::DEFAULT_BASE_URL)]
    openai_base_url: String,
    #[arg(long, env = "NOAA_BASE_URL", default_value = noaa::DEFAULT_BASE_URL)]
    noaa_base_url: String,

    /// Upper bound on tasks running at once.
    #[arg(long)]
    max_concurrency: Option<usize>,
    #[arg(long, value_enum, default_value_t = Policy::FailFast)]
    policy: Policy,
    /// Per-request HTTP timeout.
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,
}

#[derive(Clone, Copy, ValueEnum)]
enum Policy {
    /// Skip what depends on a failed task; let the rest finish.
    FailFast,
    /// Start nothing new after the first failure.
    Abort,
}

impl From<Policy> for FailurePolicy {
    fn from(p: Policy) -> Self {
        match p {
            Policy::FailFast => FailurePolicy::FailFast,
            Policy::Abort => FailurePolicy::Abort,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Command::Plan(args) => plan(args).await,
        Command::Validate { path } => validate(&path),
        Command::Graph => graph(),
    }
}

/// Logs go to stderr so stdout carries only the plan. `RUST_LOG` overrides
/// the default `info` level.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn plan(args: PlanArgs) -> Result<()> {
    let timeout = Duration::from_secs(args.timeout_secs);

    let oracle = ChatOracle::new(ChatOracleConfig {
        api_key: args.api_key,
        model: args.model,
        base_url: args.openai_base_url,
        timeout,
    })
    .context("cannot configure the chat oracle")?;
    let source = NoaaTides::new(args.noaa_base_url, timeout)
        .context("cannot configure the tide source")?;

    let config = SchedulerConfig {
        max_concurrency: args.max_concurrency,
        failure_policy: args.policy.into(),
        ..Default::default()
    };
    let planner = SailPlanner::new(Arc::new(oracle), Arc::new(source), config)?;

    let trip = TripInput {
        location: args.location,
        start_date: args.date,
        end_location: args.end_location,
    };

    let plan = planner.plan(trip).await.context("planning failed")?;
    info!(action = %plan.decision.action, "plan ready");

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print_plan(&plan, args.show_reasoning);
    }
    Ok(())
}

fn print_plan(plan: &SailPlan, show_reasoning: bool) {
    let decision = &plan.decision;
    println!(
        "{} ({:.0}% confidence)",
        decision.action.to_string().to_uppercase(),
        decision.confidence
    );
    println!("{}", decision.reasoning);

    if show_reasoning {
        for (task, record) in &plan.signals {
            if let Some(reasoning) = record.get("reasoning").and_then(|r| r.as_str()) {
                println!();
                println!("[{task}] {reasoning}");
            }
        }
    }
}

fn validate(path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;

    let workflow: Workflow = serde_json::from_str(&content).context("invalid workflow JSON")?;

    match WorkflowGraph::build(&workflow) {
        Ok(graph) => {
            println!(
                "Workflow '{}' is valid. Execution order: {:?}",
                graph.name(),
                graph.topological_order()
            );
            Ok(())
        }
        Err(e) => bail!("validation failed: {e}"),
    }
}

fn graph() -> Result<()> {
    let graph = WorkflowGraph::build(&Workflow::sailing())?;

    println!("workflow '{}'", graph.name());
    for id in graph.topological_order() {
        let preds = graph.predecessors_of(id);
        if preds.is_empty() {
            println!("  {id}  (entry)");
        } else {
            println!("  {id}  waits for {} : {}", preds.len(), preds.join(", "));
        }
    }
    Ok(())
}
