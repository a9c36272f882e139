//! Runs the metric catalog concurrently or one metric at a time.

use std::path::Path;
use std::sync::Mutex;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::adapter::CliExecutorAdapter;
use super::progress::EvalProgress;
use crate::metrics::{all_metrics, Metric, MetricResult, PromptExecutor, SampleObserver};
use crate::target::AnalysisTarget;
use crate::utils::lock;

/// Results of one batch, in catalog order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParallelResult {
    /// One slot per catalog metric; slot `i` always belongs to metric `i`.
    pub results: Vec<MetricResult>,
    pub total_tokens: u64,
    /// Batch-level problems. Per-metric failures live in each result's `error`.
    pub errors: Vec<String>,
}

impl ParallelResult {
    fn with_slots(n: usize) -> Self {
        Self {
            results: vec![MetricResult::default(); n],
            ..Default::default()
        }
    }

    fn sum_tokens(&mut self) {
        self.total_tokens = self.results.iter().map(|r| r.tokens_used).sum();
    }
}

/// Runs every metric at once and waits for all of them.
///
/// A failing metric never stops its siblings. Cancellation is left to the
/// executor: in-flight metrics finish at their own error boundary.
pub async fn run_metrics_parallel(
    cancel: &CancellationToken,
    work_dir: &Path,
    targets: &[AnalysisTarget],
    progress: Option<&EvalProgress>,
    executor: Option<&dyn PromptExecutor>,
) -> ParallelResult {
    let fallback;
    let executor: &dyn PromptExecutor = match executor {
        Some(executor) => executor,
        None => {
            fallback = CliExecutorAdapter::new(work_dir);
            &fallback
        }
    };

    let metrics = all_metrics();
    let slots = Mutex::new(ParallelResult::with_slots(metrics.len()));

    let units = metrics.iter().enumerate().map(|(i, metric)| {
        let slots = &slots;
        async move {
            let result = run_single_metric(cancel, metric.as_ref(), work_dir, targets, executor, progress).await;
            report(progress, &result);
            lock(slots).results[i] = result;
        }
    });
    join_all(units).await;

    let mut batch = slots.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
    batch.sum_tokens();
    info!(total_tokens = batch.total_tokens, "Parallel metric run finished");
    batch
}

/// Runs the metrics in catalog order, stopping before the next metric once
/// `cancel` fires. Unstarted slots stay at their default value.
pub async fn run_metrics_sequential(
    cancel: &CancellationToken,
    work_dir: &Path,
    targets: &[AnalysisTarget],
    progress: Option<&EvalProgress>,
    executor: Option<&dyn PromptExecutor>,
) -> ParallelResult {
    let fallback;
    let executor: &dyn PromptExecutor = match executor {
        Some(executor) => executor,
        None => {
            fallback = CliExecutorAdapter::new(work_dir);
            &fallback
        }
    };

    let metrics = all_metrics();
    let mut batch = ParallelResult::with_slots(metrics.len());

    for (i, metric) in metrics.iter().enumerate() {
        if cancel.is_cancelled() {
            warn!(completed = i, total = metrics.len(), "Evaluation cancelled, skipping remaining metrics");
            batch
                .errors
                .push(format!("evaluation cancelled after {} of {} metrics", i, metrics.len()));
            break;
        }
        let result = run_single_metric(cancel, metric.as_ref(), work_dir, targets, executor, progress).await;
        report(progress, &result);
        batch.results[i] = result;
    }

    batch.sum_tokens();
    info!(total_tokens = batch.total_tokens, "Sequential metric run finished");
    batch
}

async fn run_single_metric(
    cancel: &CancellationToken,
    metric: &dyn Metric,
    work_dir: &Path,
    targets: &[AnalysisTarget],
    executor: &dyn PromptExecutor,
    progress: Option<&EvalProgress>,
) -> MetricResult {
    let samples = metric.select_samples(targets);
    if let Some(progress) = progress {
        progress.set_running(metric.id(), metric.work_units(&samples));
    }
    let observer = progress.map(|p| p as &dyn SampleObserver);
    let result = metric.execute(cancel, work_dir, &samples, executor, observer).await;
    if let Some(error) = &result.error {
        warn!(metric_id = metric.id(), error = %error, "Metric failed");
    } else {
        info!(metric_id = metric.id(), score = result.score, "Metric complete");
    }
    result
}

fn report(progress: Option<&EvalProgress>, result: &MetricResult) {
    let Some(progress) = progress else {
        return;
    };
    match &result.error {
        Some(error) => progress.set_failed(&result.metric_id, error),
        None => {
            progress.set_complete(&result.metric_id, result.score);
            progress.add_tokens(result.tokens_used);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::progress::MetricStatus;
    use crate::error::PromptError;
    use crate::metrics::test_support::{go_target, SourceFileSpec};
    use crate::metrics::{CODE_BEHAVIOR_COMPREHENSION, TASK_EXECUTION_CONSISTENCY};
    use async_trait::async_trait;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FailingExecutor(AtomicUsize);

    #[async_trait]
    impl PromptExecutor for FailingExecutor {
        async fn execute_prompt(
            &self,
            _cancel: &CancellationToken,
            _work_dir: &Path,
            _prompt: &str,
            _tools: &str,
            _timeout: Duration,
        ) -> Result<String, PromptError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(PromptError::Execution("offline".to_string()))
        }
    }

    struct EchoExecutor;

    #[async_trait]
    impl PromptExecutor for EchoExecutor {
        async fn execute_prompt(
            &self,
            _cancel: &CancellationToken,
            _work_dir: &Path,
            _prompt: &str,
            _tools: &str,
            _timeout: Duration,
        ) -> Result<String, PromptError> {
            Ok("[\"a\", \"b\"] returns the value and handles errors".to_string())
        }
    }

    fn quiet_progress() -> EvalProgress {
        EvalProgress::with_writer(
            all_metrics().iter().map(|m| (m.id(), m.name())),
            Box::new(io::sink()),
            false,
        )
    }

    fn sample_target() -> AnalysisTarget {
        let mut body = String::from("package svc\n\nimport (\n\t\"fmt\"\n\t\"os\"\n\t\"io\"\n)\n\n");
        for i in 0..5 {
            body.push_str(&format!(
                "// Handler{i} handles a request.\nfunc Handler{i}Request(x int) error {{\n\tif x > 0 {{\n\t\treturn nil\n\t}}\n\tfor {{\n\t\tbreak\n\t}}\n\treturn fmt.Errorf(\"bad\")\n}}\n\n"
            ));
        }
        go_target(vec![SourceFileSpec("svc/handler.go", body)])
    }

    #[tokio::test]
    async fn test_parallel_fills_every_slot_in_order() {
        let exec = FailingExecutor(AtomicUsize::new(0));
        let batch = run_metrics_parallel(&CancellationToken::new(), Path::new(""), &[], None, Some(&exec)).await;

        let ids: Vec<_> = batch.results.iter().map(|r| r.metric_id.clone()).collect();
        let expected: Vec<_> = all_metrics().iter().map(|m| m.id().to_string()).collect();
        assert_eq!(ids, expected);
        assert!(batch.results.iter().all(|r| r.error.is_some()));
        assert_eq!(batch.total_tokens, batch.results.iter().map(|r| r.tokens_used).sum::<u64>());
        assert!(batch.errors.is_empty());
        // no targets means no samples, so nothing is sent
        assert_eq!(exec.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_sequential_matches_parallel_values() {
        let targets = vec![sample_target()];
        let parallel = run_metrics_parallel(
            &CancellationToken::new(),
            Path::new(""),
            &targets,
            None,
            Some(&EchoExecutor),
        )
        .await;
        let sequential = run_metrics_sequential(
            &CancellationToken::new(),
            Path::new(""),
            &targets,
            None,
            Some(&EchoExecutor),
        )
        .await;

        assert_eq!(parallel.results.len(), 5);
        assert_eq!(sequential.results.len(), 5);
        for (p, s) in parallel.results.iter().zip(&sequential.results) {
            assert_eq!(p.metric_id, s.metric_id);
            assert_eq!(p.score, s.score);
            assert_eq!(p.error, s.error);
            assert_eq!(p.tokens_used, s.tokens_used);
        }
        assert_eq!(parallel.total_tokens, sequential.total_tokens);
        assert!(parallel.total_tokens > 0);
    }

    #[tokio::test]
    async fn test_progress_reflects_outcomes() {
        let progress = quiet_progress();
        let targets = vec![sample_target()];
        let batch = run_metrics_parallel(
            &CancellationToken::new(),
            Path::new(""),
            &targets,
            Some(&progress),
            Some(&EchoExecutor),
        )
        .await;

        let m1 = progress.metric(TASK_EXECUTION_CONSISTENCY).unwrap();
        assert_eq!(m1.status, MetricStatus::Complete);
        assert_eq!(m1.total_samples, 3);
        assert_eq!(m1.current_sample, 3);
        assert_eq!(m1.score, 10);

        let m2 = progress.metric(CODE_BEHAVIOR_COMPREHENSION).unwrap();
        assert_eq!(m2.status, MetricStatus::Complete);

        let completed_tokens: u64 = batch
            .results
            .iter()
            .filter(|r| r.error.is_none())
            .map(|r| r.tokens_used)
            .sum();
        assert_eq!(progress.total_tokens(), completed_tokens);
    }

    #[tokio::test]
    async fn test_cancelled_parallel_still_returns_all_slots() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let batch = run_metrics_parallel(&cancel, Path::new(""), &[], None, Some(&EchoExecutor)).await;
        assert_eq!(batch.results.len(), 5);
        assert!(batch.results.iter().all(|r| !r.metric_id.is_empty()));
    }

    #[tokio::test]
    async fn test_cancelled_sequential_stops_early() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let progress = quiet_progress();
        let batch = run_metrics_sequential(&cancel, Path::new(""), &[], Some(&progress), Some(&EchoExecutor)).await;
        assert_eq!(batch.results.len(), 5);
        assert!(batch.results.iter().all(|r| r.metric_id.is_empty()));
        assert_eq!(batch.errors, vec!["evaluation cancelled after 0 of 5 metrics".to_string()]);
        assert_eq!(
            progress.metric(TASK_EXECUTION_CONSISTENCY).unwrap().status,
            MetricStatus::Pending
        );
    }
}
