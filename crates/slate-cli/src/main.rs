//! Slate - sports schedule evaluation and optimization CLI
//!
//! ## Commands
//!
//! - `evaluate`: score a schedule against rule constraints
//! - `generate`: build a schedule with one strategy
//! - `optimize`: run the full orchestrator
//! - `select`: show which strategy the selector would pick
//!
//! Results go to stdout as JSON; logs go to stderr.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{info, Level};

use slate_core::{
    Constraint, ConstraintDefinition, ConstraintEvaluator, EvaluationContext, LocalWorkerFactory,
    ProcessWorkerFactory, RuleRegistry, RuntimeConfig, Schedule, SlateConfig, Sport, TaskOptions,
    Team, WorkerPool,
};
use slate_core::worker::WorkerFactory;
use slate_optimize::{
    select_algorithm, strategy_for, Algorithm, OptimizationRequest, Orchestrator,
    SchedulingConstraints, StrategyRequest,
};

#[derive(Parser)]
#[command(name = "slate")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Sports schedule constraint evaluation and optimization", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// TOML configuration file
    #[arg(long, global = true, env = "SLATE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a schedule against rule constraints
    Evaluate {
        /// Schedule JSON file
        #[arg(short, long)]
        schedule: PathBuf,

        /// JSON array of constraint definitions
        #[arg(short, long)]
        constraints: PathBuf,

        /// Evaluation context JSON object
        #[arg(long)]
        context: Option<PathBuf>,

        /// Evaluate across this many isolated workers
        #[arg(short, long)]
        workers: Option<usize>,

        /// Run workers as child processes of this binary instead of in-process
        #[arg(long, requires = "workers")]
        worker_bin: Option<PathBuf>,

        /// Stop a worker's batch once its weighted penalty exceeds this
        #[arg(long, requires = "workers")]
        stop_above: Option<f64>,
    },

    /// Generate a schedule with a single strategy
    Generate {
        /// JSON array of teams
        #[arg(short, long)]
        teams: PathBuf,

        #[arg(short, long)]
        sport: String,

        /// Strategy name (default: whatever the selector picks)
        #[arg(short, long)]
        algorithm: Option<String>,

        /// Scheduling preferences JSON object
        #[arg(long)]
        constraints: Option<PathBuf>,

        /// Date of the first round (YYYY-MM-DD)
        #[arg(long)]
        start: Option<NaiveDate>,

        #[arg(long, default_value = "7")]
        days_between_rounds: u32,

        #[arg(long)]
        seed: Option<u64>,
    },

    /// Run the optimization orchestrator
    Optimize {
        /// JSON array of teams
        #[arg(short, long)]
        teams: PathBuf,

        #[arg(short, long)]
        sport: String,

        /// Scheduling preferences JSON object
        #[arg(long)]
        constraints: Option<PathBuf>,

        /// JSON array of rule constraint definitions scored on the result
        #[arg(long)]
        rules: Option<PathBuf>,

        /// Evaluation context JSON object
        #[arg(long)]
        context: Option<PathBuf>,

        /// Existing schedule whose rounds seed the search
        #[arg(long)]
        existing: Option<PathBuf>,

        #[arg(long)]
        start: Option<NaiveDate>,

        #[arg(long)]
        seed: Option<u64>,
    },

    /// Show the strategy the selector picks
    Select {
        #[arg(short, long)]
        sport: String,

        /// Number of teams
        #[arg(short, long)]
        teams: usize,

        /// Scheduling preference as KEY=VALUE (repeatable)
        #[arg(short, long = "constraint")]
        constraints: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    slate_core::init_tracing(cli.json, level);

    let config = load_config(cli.config.as_deref())?;

    let output = match cli.command {
        Commands::Evaluate {
            schedule,
            constraints,
            context,
            workers,
            worker_bin,
            stop_above,
        } => {
            cmd_evaluate(
                &config,
                &schedule,
                &constraints,
                context.as_deref(),
                workers,
                worker_bin.as_deref(),
                stop_above,
            )
            .await?
        }
        Commands::Generate {
            teams,
            sport,
            algorithm,
            constraints,
            start,
            days_between_rounds,
            seed,
        } => {
            cmd_generate(
                &teams,
                &sport,
                algorithm.as_deref(),
                constraints.as_deref(),
                start,
                days_between_rounds,
                seed,
            )
            .await?
        }
        Commands::Optimize {
            teams,
            sport,
            constraints,
            rules,
            context,
            existing,
            start,
            seed,
        } => {
            let inputs = OptimizeInputs {
                teams,
                sport,
                constraints,
                rules,
                context,
                existing,
                start,
                seed,
            };
            cmd_optimize(&config, inputs).await?
        }
        Commands::Select {
            sport,
            teams,
            constraints,
        } => cmd_select(&sport, teams, &constraints)?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<SlateConfig> {
    match path {
        Some(path) => SlateConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(SlateConfig::default()),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {what} from {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid {what} in {}", path.display()))
}

fn read_optional<T: DeserializeOwned + Default>(path: Option<&Path>, what: &str) -> Result<T> {
    path.map_or_else(|| Ok(T::default()), |p| read_json(p, what))
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn cmd_evaluate(
    config: &SlateConfig,
    schedule_path: &Path,
    constraints_path: &Path,
    context_path: Option<&Path>,
    workers: Option<usize>,
    worker_bin: Option<&Path>,
    stop_above: Option<f64>,
) -> Result<Value> {
    let schedule: Schedule = read_json(schedule_path, "schedule")?;
    schedule.validate().context("Schedule failed validation")?;
    let definitions: Vec<ConstraintDefinition> = read_json(constraints_path, "constraints")?;
    let context: EvaluationContext = read_optional(context_path, "context")?;

    let Some(workers) = workers else {
        let registry = RuleRegistry::with_builtin_rules();
        let constraints = definitions
            .into_iter()
            .map(|d| {
                let id = d.id.clone();
                Constraint::from_definition(d, &registry)
                    .map(Arc::new)
                    .with_context(|| format!("Invalid constraint '{id}'"))
            })
            .collect::<Result<Vec<_>>>()?;

        let evaluator = ConstraintEvaluator::new(config.evaluator.clone());
        let evaluation = evaluator
            .evaluate_schedule(&Arc::new(schedule), &constraints, &context)
            .await;
        info!(
            valid = evaluation.summary.valid,
            score = evaluation.summary.score,
            "evaluation complete"
        );
        evaluator.flush_metrics();
        return Ok(json!({
            "evaluation": evaluation,
            "metrics": evaluator.get_metrics(),
        }));
    };

    let factory: Arc<dyn WorkerFactory> = match worker_bin {
        Some(program) => Arc::new(ProcessWorkerFactory::new(program)),
        None => Arc::new(LocalWorkerFactory::new(
            RuntimeConfig::new("slate-cli")
                .with_evaluator(config.evaluator.clone())
                .with_progress_interval(config.worker.progress_interval),
        )),
    };
    let mut pool_config = config.worker.clone();
    pool_config.workers = workers.max(1);
    let mut pool = WorkerPool::start(pool_config, factory)
        .await
        .context("Failed to start worker pool")?;

    let options = stop_above.map(TaskOptions::early_termination).unwrap_or_default();
    let evaluation = match pool.evaluate(&schedule, &definitions, &context, &options).await {
        Ok(evaluation) => evaluation,
        Err(e) => {
            pool.shutdown().await;
            return Err(e).context("Invalid constraint definition");
        }
    };
    let stats = pool.shutdown().await;
    info!(
        workers = stats.len(),
        valid = evaluation.evaluation.summary.valid,
        "pool evaluation complete"
    );
    Ok(json!({ "evaluation": evaluation, "workerStats": stats }))
}

async fn cmd_generate(
    teams_path: &Path,
    sport: &str,
    algorithm: Option<&str>,
    constraints_path: Option<&Path>,
    start: Option<NaiveDate>,
    days_between_rounds: u32,
    seed: Option<u64>,
) -> Result<Value> {
    let teams: Vec<Team> = read_json(teams_path, "teams")?;
    let sport: Sport = sport.parse()?;
    let constraints: SchedulingConstraints = read_optional(constraints_path, "constraints")?;

    let algorithm = match algorithm {
        Some(name) => name.parse::<Algorithm>()?,
        None => select_algorithm(sport, teams.len(), &constraints),
    };

    let mut request = StrategyRequest::new(sport, teams.clone())
        .with_constraints(constraints)
        .with_days_between_rounds(days_between_rounds);
    if let Some(start) = start {
        request = request.with_start_date(start);
    }
    if let Some(seed) = seed {
        request = request.with_seed(seed);
    }

    let output = tokio::task::spawn_blocking(move || strategy_for(algorithm).optimize(&request))
        .await
        .context("Strategy task failed")??;
    let metadata = output.metadata.clone();
    let score = output.score;
    let schedule = output.into_schedule(sport, teams);
    info!(algorithm = %algorithm, games = schedule.games.len(), score, "schedule generated");

    Ok(json!({
        "schedule": schedule,
        "score": score,
        "metadata": metadata,
    }))
}

struct OptimizeInputs {
    teams: PathBuf,
    sport: String,
    constraints: Option<PathBuf>,
    rules: Option<PathBuf>,
    context: Option<PathBuf>,
    existing: Option<PathBuf>,
    start: Option<NaiveDate>,
    seed: Option<u64>,
}

async fn cmd_optimize(config: &SlateConfig, inputs: OptimizeInputs) -> Result<Value> {
    let teams: Vec<Team> = read_json(&inputs.teams, "teams")?;
    let sport: Sport = inputs.sport.parse()?;

    let mut request = OptimizationRequest::new(sport, teams)
        .with_constraints(read_optional(inputs.constraints.as_deref(), "constraints")?)
        .with_rules(read_optional(inputs.rules.as_deref(), "rules")?)
        .with_context(read_optional(inputs.context.as_deref(), "context")?);
    if let Some(path) = &inputs.existing {
        request = request.with_existing(read_json(path, "existing schedule")?);
    }
    if let Some(start) = inputs.start {
        request = request.with_start_date(start);
    }
    if let Some(seed) = inputs.seed {
        request = request.with_seed(seed);
    }

    let orchestrator = Orchestrator::new(config.orchestrator.clone())
        .with_evaluator(ConstraintEvaluator::new(config.evaluator.clone()));
    let outcome = orchestrator
        .optimize(request)
        .await
        .context("Optimization failed")?;
    info!(
        winner = %outcome.winner,
        score = outcome.score,
        duration_ms = outcome.duration_ms,
        "optimization complete"
    );
    Ok(serde_json::to_value(outcome)?)
}

fn cmd_select(sport: &str, teams: usize, raw_constraints: &[String]) -> Result<Value> {
    let sport: Sport = sport.parse()?;
    let constraints = raw_constraints
        .iter()
        .map(|raw| {
            SchedulingConstraints::parse_assignment(raw)
                .with_context(|| format!("Expected KEY=VALUE, got '{raw}'"))
        })
        .collect::<Result<SchedulingConstraints>>()?;

    let algorithm = select_algorithm(sport, teams, &constraints);
    Ok(json!({
        "sport": sport,
        "teams": teams,
        "constraintKeys": constraints.len(),
        "algorithm": algorithm,
    }))
}
