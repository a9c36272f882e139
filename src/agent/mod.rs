//! Agent-facing layer: the CLI seam, task execution, the judge, and the
//! evaluation session that drives the metrics.
//!
//! # Module Structure
//!
//! - `command`: subprocess seam ([`CommandRunner`], [`PathLookup`])
//! - `cli`: availability probe and its process-wide cache
//! - `executor`: bounded task execution
//! - `evaluator` / `scorer`: LLM-as-judge scoring of task responses
//! - `adapter` / `replay`: live and replayed [`PromptExecutor`](crate::metrics::PromptExecutor)s
//! - `parallel`: metric fan-out
//! - `progress`: live status line
//! - `workspace`: git worktree isolation
//! - `session`: end-to-end evaluation and task battery

pub mod adapter;
pub mod cli;
pub mod command;
pub mod evaluator;
pub mod executor;
pub mod parallel;
pub mod progress;
pub mod replay;
pub mod result;
pub mod scorer;
pub mod session;
pub mod tasks;
pub mod workspace;

pub use adapter::CliExecutorAdapter;
pub use cli::{
    cli_status_cache, get_cli_status, install_cli_probe, reset_cli_cache, CliProbe, CliStatus,
    CliStatusCache, INSTALL_HINT,
};
pub use command::{CommandRunner, Invocation, PathLookup, ProcessRunner, SystemPath};
pub use evaluator::{EvaluationResult, Evaluator};
pub use executor::{parse_json_output, CliResponse, Executor};
pub use parallel::{run_metrics_parallel, run_metrics_sequential, ParallelResult};
pub use progress::{EvalProgress, MetricProgress, MetricStatus};
pub use replay::{load_responses, save_responses, DebugResponse, ReplayExecutor};
pub use result::{TaskResult, TaskStatus};
pub use scorer::{get_rubric, ScoreResult, Scorer};
pub use session::{
    run_evaluation, run_task_battery, weighted_score, BatteryReport, EvalMode, EvalSession,
    EvaluationSummary, MetricSummary, TaskOutcome,
};
pub use tasks::{all_tasks, task_by_id, Task};
pub use workspace::Workspace;
