//! End-to-end evaluation sessions.
//!
//! [`EvalSession`] ties the pieces together: target loading, the CLI probe,
//! workspace isolation, the metric runner, progress, and capture/replay.
//! [`EvalSession::run_task_battery`] runs the fixed task catalog with
//! judge scores instead of the metrics.

use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::adapter::CliExecutorAdapter;
use super::cli::{cli_status_cache, install_cli_probe, CliProbe, CliStatus, CliStatusCache};
use super::command::{CommandRunner, PathLookup, ProcessRunner, SystemPath};
use super::evaluator::Evaluator;
use super::executor::Executor;
use super::parallel::{run_metrics_parallel, run_metrics_sequential, ParallelResult};
use super::progress::EvalProgress;
use super::replay::{has_captures, save_responses, ReplayExecutor};
use super::result::TaskResult;
use super::scorer::{ScoreResult, Scorer};
use super::tasks::{all_tasks, Task};
use super::workspace::Workspace;
use crate::config::EvalConfig;
use crate::error::SessionError;
use crate::metrics::{
    all_metrics, MetricResult, PromptExecutor, CODE_BEHAVIOR_COMPREHENSION, CROSS_FILE_NAVIGATION,
    DOCUMENTATION_ACCURACY_DETECTION, IDENTIFIER_INTERPRETABILITY, TASK_EXECUTION_CONSISTENCY,
};
use crate::target::{load_targets, AnalysisTarget};

/// Where prompts go for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalMode {
    /// Live agent, nothing persisted.
    Live,
    /// Live agent, responses saved to the debug dir.
    Capture,
    /// Responses served from the debug dir.
    Replay,
}

impl EvalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvalMode::Live => "live",
            EvalMode::Capture => "capture",
            EvalMode::Replay => "replay",
        }
    }
}

impl fmt::Display for EvalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-metric line of an [`EvaluationSummary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub id: String,
    pub name: String,
    pub score: i32,
    pub weight: f64,
    pub samples: usize,
    pub tokens_used: u64,
    pub duration_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&MetricResult> for MetricSummary {
    fn from(result: &MetricResult) -> Self {
        Self {
            id: result.metric_id.clone(),
            name: result.metric_name.clone(),
            score: result.score,
            weight: metric_weight(&result.metric_id),
            samples: result.samples.len(),
            tokens_used: result.tokens_used,
            duration_secs: result.duration.as_secs_f64(),
            error: result.error.clone(),
        }
    }
}

/// Outcome of [`EvalSession::run`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub run_id: String,
    pub available: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cli_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub install_hint: String,
    pub mode: EvalMode,
    pub metrics: Vec<MetricSummary>,
    pub weighted_score: f64,
    pub total_tokens: u64,
    pub cost_usd: f64,
    pub duration_secs: f64,
    pub errors: Vec<String>,
    /// Full per-sample detail, kept out of the JSON report.
    #[serde(skip)]
    pub results: Vec<MetricResult>,
}

impl EvaluationSummary {
    fn unavailable(status: &CliStatus, mode: EvalMode, started: Instant) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            available: false,
            cli_version: String::new(),
            install_hint: status.install_hint.clone(),
            mode,
            metrics: Vec::new(),
            weighted_score: 0.0,
            total_tokens: 0,
            cost_usd: 0.0,
            duration_secs: started.elapsed().as_secs_f64(),
            errors: vec![status.error.clone()],
            results: Vec::new(),
        }
    }
}

/// Contribution of a metric to the weighted score.
pub fn metric_weight(metric_id: &str) -> f64 {
    match metric_id {
        TASK_EXECUTION_CONSISTENCY => 0.20,
        CODE_BEHAVIOR_COMPREHENSION => 0.25,
        CROSS_FILE_NAVIGATION => 0.25,
        IDENTIFIER_INTERPRETABILITY => 0.15,
        DOCUMENTATION_ACCURACY_DETECTION => 0.15,
        _ => 0.0,
    }
}

/// Weighted mean over the metrics that produced a score.
///
/// Unscored metrics drop out and the remaining weights are renormalised.
pub fn weighted_score(results: &[MetricResult]) -> f64 {
    let (sum, weights) = results
        .iter()
        .filter(|r| r.score > 0)
        .map(|r| (metric_weight(&r.metric_id), r.score as f64))
        .filter(|(w, _)| *w > 0.0)
        .fold((0.0, 0.0), |(sum, weights), (w, s)| (sum + w * s, weights + w));
    if weights > 0.0 {
        sum / weights
    } else {
        0.0
    }
}

/// One catalog task with its judge score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub name: String,
    pub result: TaskResult,
    pub score: Option<ScoreResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_error: Option<String>,
}

/// Outcome of [`EvalSession::run_task_battery`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryReport {
    pub cli: CliStatus,
    pub outcomes: Vec<TaskOutcome>,
}

/// Where a session reads the CLI status from.
enum StatusSource {
    /// The process-wide cache, so the probe runs once per process.
    Process,
    Owned(Arc<CliStatusCache>),
}

/// A configured evaluation session.
pub struct EvalSession {
    config: EvalConfig,
    runner: Arc<dyn CommandRunner>,
    lookup: Arc<dyn PathLookup>,
    status: StatusSource,
    executor: Option<Arc<dyn PromptExecutor>>,
    quiet: bool,
}

impl EvalSession {
    /// Creates a session on the real process seams.
    ///
    /// CLI status comes from the process-wide cache. The first session (or
    /// `ars check`) installs its probe; later sessions reuse the cached answer.
    pub fn new(config: EvalConfig) -> Self {
        let runner: Arc<dyn CommandRunner> =
            Arc::new(ProcessRunner::new().with_grace_period(config.grace_period()));
        let lookup: Arc<dyn PathLookup> = Arc::new(SystemPath);
        if !install_cli_probe(build_probe(&config, &runner, &lookup)) {
            debug!("CLI probe already installed, reusing process-wide status");
        }
        Self {
            config,
            runner,
            lookup,
            status: StatusSource::Process,
            executor: None,
            quiet: false,
        }
    }

    /// Routes every subprocess (CLI, judge, git) through `runner`.
    ///
    /// The session then probes with `runner` through its own cache.
    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self.status = StatusSource::Owned(Arc::new(self.own_cache()));
        self
    }

    pub fn with_lookup(mut self, lookup: Arc<dyn PathLookup>) -> Self {
        self.lookup = lookup;
        self.status = StatusSource::Owned(Arc::new(self.own_cache()));
        self
    }

    /// Shares `cache` with other sessions instead of the process-wide one.
    pub fn with_status_cache(mut self, cache: Arc<CliStatusCache>) -> Self {
        self.status = StatusSource::Owned(cache);
        self
    }

    fn own_cache(&self) -> CliStatusCache {
        CliStatusCache::new(build_probe(&self.config, &self.runner, &self.lookup))
    }

    fn status_cache(&self) -> &CliStatusCache {
        match &self.status {
            StatusSource::Process => cli_status_cache(),
            StatusSource::Owned(cache) => cache.as_ref(),
        }
    }

    /// Sends metric prompts to `executor` instead of the CLI. Skips the probe.
    pub fn with_executor(mut self, executor: Arc<dyn PromptExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Disables the progress line.
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    /// Cached CLI status for this session.
    pub async fn cli_status(&self) -> CliStatus {
        self.status_cache().get().await
    }

    fn replay_dir(&self) -> Option<&Path> {
        self.config
            .debug_dir
            .as_deref()
            .filter(|dir| has_captures(dir))
    }

    fn live_mode(&self) -> EvalMode {
        if self.config.debug_dir.is_some() {
            EvalMode::Capture
        } else {
            EvalMode::Live
        }
    }

    /// Evaluates the project at `root` with all five metrics.
    ///
    /// An unavailable CLI yields a summary with `available == false`, never an error.
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        root: &Path,
    ) -> Result<EvaluationSummary, SessionError> {
        let started = Instant::now();
        let targets = load_targets(root)?;
        info!(root = %root.display(), targets = targets.len(), "Loaded analysis targets");

        if let Some(dir) = self.replay_dir() {
            let replay = ReplayExecutor::from_dir(dir)?;
            info!(dir = %dir.display(), responses = replay.len(), "Replaying captured responses");
            let batch = self.run_batch(cancel, root, &targets, &replay).await;
            return Ok(self.summarize(EvalMode::Replay, String::new(), batch, started));
        }

        let mode = self.live_mode();
        let version = match &self.executor {
            Some(_) => String::new(),
            None => {
                let status = self.status_cache().get().await;
                if !status.available {
                    warn!(error = %status.error, "Agent CLI unavailable, skipping evaluation");
                    return Ok(EvaluationSummary::unavailable(&status, mode, started));
                }
                status.version
            }
        };

        let workspace = Workspace::create_with_runner(root, self.runner.clone()).await;
        let live;
        let executor: &dyn PromptExecutor = match &self.executor {
            Some(executor) => executor.as_ref(),
            None => {
                live = CliExecutorAdapter::new(workspace.path())
                    .with_binary(&self.config.cli_binary)
                    .with_runner(self.runner.clone())
                    .with_lookup(self.lookup.clone());
                &live
            }
        };
        let batch = self.run_batch(cancel, workspace.path(), &targets, executor).await;

        let mut errors = Vec::new();
        if let Err(e) = workspace.cleanup().await {
            warn!(error = %e, "Failed to clean up worktree");
            errors.push(format!("workspace cleanup: {}", e));
        }
        if let Some(dir) = &self.config.debug_dir {
            match save_responses(dir, &batch.results) {
                Ok(saved) => info!(dir = %dir.display(), saved, "Captured responses"),
                Err(e) => {
                    warn!(error = %e, "Failed to save captured responses");
                    errors.push(format!("capture: {}", e));
                }
            }
        }

        let mut summary = self.summarize(mode, version, batch, started);
        summary.errors.extend(errors);
        Ok(summary)
    }

    async fn run_batch(
        &self,
        cancel: &CancellationToken,
        work_dir: &Path,
        targets: &[AnalysisTarget],
        executor: &dyn PromptExecutor,
    ) -> ParallelResult {
        let progress = self.progress();
        progress.start();
        let batch = if self.config.sequential {
            run_metrics_sequential(cancel, work_dir, targets, Some(&progress), Some(executor)).await
        } else {
            run_metrics_parallel(cancel, work_dir, targets, Some(&progress), Some(executor)).await
        };
        progress.stop().await;
        batch
    }

    fn progress(&self) -> EvalProgress {
        let catalog = all_metrics();
        let progress = if self.quiet {
            EvalProgress::with_writer(
                catalog.iter().map(|m| (m.id(), m.name())),
                Box::new(io::sink()),
                false,
            )
        } else {
            EvalProgress::for_metrics(&catalog)
        };
        progress
            .with_interval(self.config.progress_interval())
            .with_cost_rate(self.config.cost_per_million_tokens)
    }

    fn summarize(
        &self,
        mode: EvalMode,
        cli_version: String,
        batch: ParallelResult,
        started: Instant,
    ) -> EvaluationSummary {
        let results: Vec<MetricResult> = batch
            .results
            .into_iter()
            .filter(|r| !r.metric_id.is_empty())
            .collect();
        let summary = EvaluationSummary {
            run_id: Uuid::new_v4().to_string(),
            available: true,
            cli_version,
            install_hint: String::new(),
            mode,
            metrics: results.iter().map(MetricSummary::from).collect(),
            weighted_score: weighted_score(&results),
            total_tokens: batch.total_tokens,
            cost_usd: self.config.estimate_cost(batch.total_tokens),
            duration_secs: started.elapsed().as_secs_f64(),
            errors: batch.errors,
            results,
        };
        info!(
            run_id = %summary.run_id,
            score = summary.weighted_score,
            tokens = summary.total_tokens,
            "Evaluation finished"
        );
        summary
    }

    /// Runs every catalog task in `root` and judges the completed ones.
    pub async fn run_task_battery(&self, cancel: &CancellationToken, root: &Path) -> BatteryReport {
        let cli = self.status_cache().get().await;
        if !cli.available {
            warn!(error = %cli.error, "Agent CLI unavailable, skipping task battery");
            return BatteryReport {
                cli,
                outcomes: Vec::new(),
            };
        }

        let executor = Executor::new(root)
            .with_binary(&self.config.cli_binary)
            .with_runner(self.runner.clone())
            .with_lookup(self.lookup.clone());
        let scorer = Scorer::new(
            Evaluator::new(self.config.evaluator_timeout())
                .with_binary(&self.config.cli_binary)
                .with_runner(self.runner.clone())
                .with_retry_backoff(self.config.retry_backoff()),
        );

        let mut outcomes = Vec::new();
        for task in all_tasks() {
            if cancel.is_cancelled() {
                warn!(completed = outcomes.len(), "Task battery cancelled");
                break;
            }
            let task = self.with_default_timeout(task);
            let result = executor.execute_task(cancel, &task).await;
            let (score, score_error) = if result.is_success() {
                match scorer.score(cancel, &task, &result.response).await {
                    Ok(score) => (Some(score), None),
                    Err(e) => {
                        warn!(task_id = %task.id, error = %e, "Scoring failed");
                        (None, Some(e.to_string()))
                    }
                }
            } else {
                (None, None)
            };
            outcomes.push(TaskOutcome {
                name: task.name,
                result,
                score,
                score_error,
            });
        }
        BatteryReport { cli, outcomes }
    }

    fn with_default_timeout(&self, task: Task) -> Task {
        if task.timeout_seconds == 0 {
            task.with_timeout_seconds(self.config.task_timeout_secs)
        } else {
            task
        }
    }
}

fn build_probe(
    config: &EvalConfig,
    runner: &Arc<dyn CommandRunner>,
    lookup: &Arc<dyn PathLookup>,
) -> CliProbe {
    CliProbe::new(&config.cli_binary)
        .with_timeout(config.probe_timeout())
        .with_runner(runner.clone())
        .with_lookup(lookup.clone())
}

/// Runs a full evaluation with default process seams.
pub async fn run_evaluation(
    cancel: &CancellationToken,
    config: &EvalConfig,
    root: &Path,
) -> Result<EvaluationSummary, SessionError> {
    EvalSession::new(config.clone()).run(cancel, root).await
}

/// Runs the task battery with default process seams.
pub async fn run_task_battery(
    cancel: &CancellationToken,
    config: &EvalConfig,
    root: &Path,
) -> BatteryReport {
    EvalSession::new(config.clone())
        .run_task_battery(cancel, root)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::cli::INSTALL_HINT;
    use crate::agent::command::Invocation;
    use crate::agent::result::TaskStatus;
    use crate::error::{CommandError, PromptError};
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Found(Option<&'static str>);

    impl PathLookup for Found {
        fn look_path(&self, _name: &str) -> Option<PathBuf> {
            self.0.map(PathBuf::from)
        }
    }

    /// Answers the version probe, the judge and plain task prompts.
    #[derive(Default)]
    struct FakeCli {
        calls: AtomicUsize,
        fail_tasks: bool,
    }

    #[async_trait]
    impl CommandRunner for FakeCli {
        async fn run(
            &self,
            _cancel: &CancellationToken,
            invocation: &Invocation,
        ) -> Result<Vec<u8>, CommandError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let reply = if invocation.args == ["--version"] {
                "1.0.0".to_string()
            } else if invocation.flag_value("--json-schema").is_some() {
                r#"{"structured_output":{"score":7,"reason":"solid"}}"#.to_string()
            } else if self.fail_tasks {
                return Err(CommandError::Exit {
                    code: 1,
                    output: "rate limited".to_string(),
                });
            } else {
                r#"{"type":"result","session_id":"s-1","result":"main.go: main()"}"#.to_string()
            };
            Ok(reply.into_bytes())
        }
    }

    struct Echo;

    #[async_trait]
    impl PromptExecutor for Echo {
        async fn execute_prompt(
            &self,
            _cancel: &CancellationToken,
            _work_dir: &Path,
            _prompt: &str,
            _tools: &str,
            _timeout: Duration,
        ) -> Result<String, PromptError> {
            Ok("[\"main\"]".to_string())
        }
    }

    fn result(id: &str, score: i32) -> MetricResult {
        MetricResult {
            metric_id: id.to_string(),
            score,
            ..Default::default()
        }
    }

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let mut body = String::from("package main\n\nimport (\n\t\"fmt\"\n\t\"os\"\n\t\"io\"\n)\n\n");
        for i in 0..5 {
            body.push_str(&format!(
                "// Run{i} runs step {i}.\nfunc Run{i}Step(x int) error {{\n\tif x > 0 {{\n\t\treturn nil\n\t}}\n\treturn fmt.Errorf(\"bad\")\n}}\n\n"
            ));
        }
        std::fs::write(dir.path().join("main.go"), body).unwrap();
        dir
    }

    #[test]
    fn test_weighted_score_all_metrics() {
        let results = vec![
            result(TASK_EXECUTION_CONSISTENCY, 10),
            result(CODE_BEHAVIOR_COMPREHENSION, 8),
            result(CROSS_FILE_NAVIGATION, 6),
            result(IDENTIFIER_INTERPRETABILITY, 4),
            result(DOCUMENTATION_ACCURACY_DETECTION, 2),
        ];
        // 2.0 + 2.0 + 1.5 + 0.6 + 0.3
        assert!((weighted_score(&results) - 6.4).abs() < 1e-9);
    }

    #[test]
    fn test_weighted_score_renormalises() {
        let results = vec![
            result(TASK_EXECUTION_CONSISTENCY, 0),
            result(CODE_BEHAVIOR_COMPREHENSION, 8),
            result(CROSS_FILE_NAVIGATION, 4),
        ];
        assert!((weighted_score(&results) - 6.0).abs() < 1e-9);
        assert_eq!(weighted_score(&[result(TASK_EXECUTION_CONSISTENCY, 0)]), 0.0);
        assert_eq!(weighted_score(&[]), 0.0);
        assert_eq!(weighted_score(&[result("custom", 9)]), 0.0);
    }

    #[tokio::test]
    async fn test_unavailable_cli_is_not_an_error() {
        let dir = project();
        let runner = Arc::new(FakeCli::default());
        let summary = EvalSession::new(EvalConfig::default())
            .with_runner(runner.clone())
            .with_lookup(Arc::new(Found(None)))
            .quiet()
            .run(&CancellationToken::new(), dir.path())
            .await
            .unwrap();

        assert!(!summary.available);
        assert_eq!(summary.install_hint, INSTALL_HINT);
        assert_eq!(summary.mode, EvalMode::Live);
        assert!(summary.metrics.is_empty());
        assert_eq!(summary.errors, vec!["claude CLI not found in PATH".to_string()]);
        assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_injected_executor_runs_all_metrics() {
        let dir = project();
        let config = EvalConfig {
            cost_per_million_tokens: 1_000_000.0,
            ..Default::default()
        };
        let summary = EvalSession::new(config)
            .with_executor(Arc::new(Echo))
            .quiet()
            .run(&CancellationToken::new(), dir.path())
            .await
            .unwrap();

        assert!(summary.available);
        assert_eq!(summary.mode, EvalMode::Live);
        assert_eq!(summary.metrics.len(), 5);
        assert_eq!(summary.results.len(), 5);
        assert_eq!(summary.metrics[0].id, TASK_EXECUTION_CONSISTENCY);
        assert_eq!(summary.metrics[0].score, 10);
        assert!((summary.metrics[0].weight - 0.20).abs() < 1e-9);
        assert!((summary.cost_usd - summary.total_tokens as f64).abs() < 1e-6);
        assert!(summary.weighted_score >= 1.0);
        assert!(!summary.run_id.is_empty());
    }

    #[tokio::test]
    async fn test_run_rejects_missing_root() {
        let err = EvalSession::new(EvalConfig::default())
            .with_executor(Arc::new(Echo))
            .quiet()
            .run(&CancellationToken::new(), Path::new("/definitely/not/here"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Target(_)));
    }

    #[tokio::test]
    async fn test_task_battery_scores_completed_tasks() {
        let dir = project();
        let runner = Arc::new(FakeCli::default());
        let report = EvalSession::new(EvalConfig::default())
            .with_runner(runner.clone())
            .with_lookup(Arc::new(Found(Some("/bin/claude"))))
            .run_task_battery(&CancellationToken::new(), dir.path())
            .await;

        assert!(report.cli.available);
        assert_eq!(report.cli.version, "1.0.0");
        assert_eq!(report.outcomes.len(), all_tasks().len());
        for outcome in &report.outcomes {
            assert_eq!(outcome.result.status, TaskStatus::Completed);
            assert_eq!(outcome.result.session_id, "s-1");
            assert_eq!(outcome.score.as_ref().map(|s| s.score), Some(70));
            assert!(outcome.score_error.is_none());
        }
        // one probe, then a task call and a judge call per task
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1 + 2 * all_tasks().len());
    }

    #[tokio::test]
    async fn test_task_battery_skips_scoring_failures() {
        let dir = project();
        let runner = Arc::new(FakeCli {
            fail_tasks: true,
            ..Default::default()
        });
        let report = EvalSession::new(EvalConfig::default())
            .with_runner(runner)
            .with_lookup(Arc::new(Found(Some("/bin/claude"))))
            .run_task_battery(&CancellationToken::new(), dir.path())
            .await;

        assert!(report.outcomes.iter().all(|o| o.result.status == TaskStatus::Error));
        assert!(report.outcomes.iter().all(|o| o.score.is_none()));
        assert_eq!(
            report.outcomes[0].result.error.as_deref(),
            Some("exit code 1: rate limited")
        );
    }

    #[tokio::test]
    async fn test_cancelled_battery_runs_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = EvalSession::new(EvalConfig::default())
            .with_runner(Arc::new(FakeCli::default()))
            .with_lookup(Arc::new(Found(Some("/bin/claude"))))
            .run_task_battery(&cancel, Path::new("/tmp"))
            .await;
        assert!(report.cli.available);
        assert!(report.outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_sessions_sharing_a_cache_probe_once() {
        let runner: Arc<FakeCli> = Arc::new(FakeCli::default());
        let config = EvalConfig::default();
        let cache = Arc::new(CliStatusCache::new(
            CliProbe::new(&config.cli_binary)
                .with_runner(runner.clone())
                .with_lookup(Arc::new(Found(Some("/bin/claude")))),
        ));

        for _ in 0..2 {
            let session = EvalSession::new(config.clone())
                .with_runner(runner.clone())
                .with_status_cache(cache.clone());
            assert_eq!(session.cli_status().await.version, "1.0.0");
        }
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_default_sessions_use_process_cache() {
        let first = EvalSession::new(EvalConfig::default());
        let second = EvalSession::new(EvalConfig::default());
        assert!(std::ptr::eq(first.status_cache(), cli_status_cache()));
        assert!(std::ptr::eq(first.status_cache(), second.status_cache()));

        let injected = second.with_lookup(Arc::new(Found(None)));
        assert!(!std::ptr::eq(injected.status_cache(), cli_status_cache()));
    }
}
