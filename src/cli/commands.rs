//! CLI command definitions for ars.
//!
//! Subcommands probe the agent CLI, list the task and metric catalogs, run
//! the task battery, and run the full agent evaluation against a project.

use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agent::progress::{format_elapsed, format_tokens, short_metric_id};
use crate::agent::session::metric_weight;
use crate::agent::{
    all_tasks, get_cli_status, install_cli_probe, BatteryReport, CliProbe, EvalSession,
    EvaluationSummary,
};
use crate::config::EvalConfig;
use crate::metrics::all_metrics;

/// Agent-readiness evaluation for codebases.
#[derive(Parser)]
#[command(name = "ars")]
#[command(about = "Measure how well coding agents work in a codebase")]
#[command(version)]
#[command(
    long_about = "ars runs a coding-agent CLI against a project and scores how well the agent\nunderstands, navigates and reports on the code.\n\nExample usage:\n  ars check\n  ars eval ./my-service --debug-dir ./captures"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// YAML configuration file. Environment variables and flags override it.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Check that the agent CLI is installed and responsive.
    Check(CheckArgs),

    /// List the evaluation task catalog.
    Tasks(ListArgs),

    /// List the agent evaluation metrics.
    Metrics(ListArgs),

    /// Run every catalog task against a project and judge the responses.
    #[command(name = "run-tasks")]
    RunTasks(RunTasksArgs),

    /// Run the full agent evaluation against a project.
    Eval(EvalArgs),
}

/// Arguments for `ars check`.
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Output JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `ars tasks` and `ars metrics`.
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Output JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `ars run-tasks`.
#[derive(Parser, Debug)]
pub struct RunTasksArgs {
    /// Project directory the agent works in.
    pub dir: PathBuf,

    /// Output JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `ars eval`.
#[derive(Parser, Debug)]
pub struct EvalArgs {
    /// Project directory to evaluate.
    pub dir: PathBuf,

    /// Run metrics one at a time instead of concurrently.
    #[arg(long)]
    pub sequential: bool,

    /// Save agent responses here; replays them when the directory already has captures.
    #[arg(long)]
    pub debug_dir: Option<PathBuf>,

    /// Agent CLI executable.
    #[arg(long)]
    pub cli_binary: Option<String>,

    /// Output the JSON summary.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with pre-parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Commands::Check(args) => run_check_command(&config, args).await,
        Commands::Tasks(args) => run_tasks_command(args),
        Commands::Metrics(args) => run_metrics_command(args),
        Commands::RunTasks(args) => run_battery_command(config, args).await,
        Commands::Eval(args) => run_eval_command(config, args).await,
    }
}

/// Defaults, then the YAML file, then `ARS_*` variables.
fn load_config(path: Option<&Path>) -> anyhow::Result<EvalConfig> {
    let config = match path {
        Some(path) => EvalConfig::from_yaml_file(path)?.merge_env()?,
        None => EvalConfig::from_env()?,
    };
    Ok(config)
}

/// Root cancellation token, cancelled on Ctrl-C.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping agent processes");
            child.cancel();
        }
    });
    token
}

async fn run_check_command(config: &EvalConfig, args: CheckArgs) -> anyhow::Result<()> {
    install_cli_probe(CliProbe::new(&config.cli_binary).with_timeout(config.probe_timeout()));
    let status = get_cli_status().await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else if status.available {
        println!("✓ {} CLI available: {}", config.cli_binary, status.version);
    } else {
        println!("✗ {}", status.error);
        println!("{}", status.install_hint);
    }
    Ok(())
}

fn run_tasks_command(args: ListArgs) -> anyhow::Result<()> {
    let tasks = all_tasks();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&tasks)?);
        return Ok(());
    }
    for task in &tasks {
        println!(
            "{:<26} {:<26} {:>4}s  {}",
            task.id,
            task.name,
            task.effective_timeout_secs(),
            task.tools_allowed
        );
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct MetricInfo {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    sample_count: usize,
    timeout_secs: u64,
    weight: f64,
}

fn metric_catalog() -> Vec<MetricInfo> {
    all_metrics()
        .iter()
        .map(|m| MetricInfo {
            id: m.id(),
            name: m.name(),
            description: m.description(),
            sample_count: m.sample_count(),
            timeout_secs: m.timeout().as_secs(),
            weight: metric_weight(m.id()),
        })
        .collect()
}

fn run_metrics_command(args: ListArgs) -> anyhow::Result<()> {
    let catalog = metric_catalog();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&catalog)?);
        return Ok(());
    }
    for m in &catalog {
        println!(
            "{}  {:<34} samples={} timeout={}s weight={:.2}",
            short_metric_id(m.id),
            m.name,
            m.sample_count,
            m.timeout_secs,
            m.weight
        );
        println!("    {}", m.description);
    }
    Ok(())
}

fn ensure_dir(dir: &Path) -> anyhow::Result<()> {
    if !dir.is_dir() {
        return Err(anyhow::anyhow!(
            "Project directory does not exist: {}",
            dir.display()
        ));
    }
    Ok(())
}

async fn run_battery_command(config: EvalConfig, args: RunTasksArgs) -> anyhow::Result<()> {
    ensure_dir(&args.dir)?;
    config.validate()?;

    let cancel = shutdown_token();
    info!(dir = %args.dir.display(), "Running task battery");
    let report = EvalSession::new(config)
        .run_task_battery(&cancel, &args.dir)
        .await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_battery(&report);
    }
    Ok(())
}

fn print_battery(report: &BatteryReport) {
    if !report.cli.available {
        println!("✗ {}", report.cli.error);
        println!("{}", report.cli.install_hint);
        return;
    }
    println!("\n=== Task Battery ({}) ===", report.cli.version);
    for outcome in &report.outcomes {
        let score = match (&outcome.score, &outcome.score_error) {
            (Some(score), _) => format!("{}/100", score.score),
            (None, Some(_)) => "unscored".to_string(),
            (None, None) => "-".to_string(),
        };
        println!(
            "  {:<26} [{}] {:>8} {:.1}s",
            outcome.name,
            outcome.result.status,
            score,
            outcome.result.duration.as_secs_f64()
        );
        if let Some(err) = &outcome.result.error {
            println!("    error: {err}");
        }
        if let Some(err) = &outcome.score_error {
            println!("    scoring: {err}");
        }
        if let Some(score) = &outcome.score {
            println!("    {}", score.reasoning);
        }
    }
}

async fn run_eval_command(mut config: EvalConfig, args: EvalArgs) -> anyhow::Result<()> {
    ensure_dir(&args.dir)?;
    if args.sequential {
        config.sequential = true;
    }
    if let Some(dir) = args.debug_dir {
        config.debug_dir = Some(dir);
    }
    if let Some(binary) = args.cli_binary {
        config.cli_binary = binary;
    }
    config.validate()?;

    let cancel = shutdown_token();
    let summary = EvalSession::new(config).run(&cancel, &args.dir).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &EvaluationSummary) {
    if !summary.available {
        for err in &summary.errors {
            println!("✗ {err}");
        }
        println!("{}", summary.install_hint);
        return;
    }

    println!("\n=== C7 Agent Evaluation ===");
    println!("Run:            {}", summary.run_id);
    println!("Mode:           {}", summary.mode);
    if !summary.cli_version.is_empty() {
        println!("CLI:            {}", summary.cli_version);
    }
    println!();
    for m in &summary.metrics {
        let score = if m.score > 0 {
            format!("{}/10", m.score)
        } else {
            "-".to_string()
        };
        println!(
            "  {}  {:<34} {:>6}  samples={} tokens={}",
            short_metric_id(&m.id),
            m.name,
            score,
            m.samples,
            format_tokens(m.tokens_used)
        );
        if let Some(err) = &m.error {
            println!("      error: {err}");
        }
    }
    println!();
    println!("Weighted score: {:.1}/10", summary.weighted_score);
    println!(
        "Tokens:         {} (est. ${:.2})",
        format_tokens(summary.total_tokens),
        summary.cost_usd
    );
    println!(
        "Duration:       {}",
        format_elapsed(std::time::Duration::from_secs_f64(summary.duration_secs))
    );
    for err in &summary.errors {
        println!("Note: {err}");
    }
}
