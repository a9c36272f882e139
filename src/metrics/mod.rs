//! Agent evaluation metrics.
//!
//! Each metric picks a handful of samples from the analysis targets, sends a
//! prompt per sample to a [`PromptExecutor`], and scores the free-text
//! responses with transparent heuristics recorded in a [`ScoreTrace`].
//!
//! The five built-in metrics, in canonical order:
//! - M1 `task_execution_consistency`
//! - M2 `code_behavior_comprehension`
//! - M3 `cross_file_navigation`
//! - M4 `identifier_interpretability`
//! - M5 `documentation_accuracy_detection`

mod comprehension;
mod consistency;
mod documentation;
mod execute;
mod identifiers;
mod navigation;
pub mod scoring;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::PromptError;
use crate::target::AnalysisTarget;

pub use comprehension::ComprehensionMetric;
pub use consistency::ConsistencyMetric;
pub use documentation::DocumentationMetric;
pub use identifiers::IdentifiersMetric;
pub use navigation::NavigationMetric;
pub use scoring::{IndicatorMatch, ScoreTrace};

pub const TASK_EXECUTION_CONSISTENCY: &str = "task_execution_consistency";
pub const CODE_BEHAVIOR_COMPREHENSION: &str = "code_behavior_comprehension";
pub const CROSS_FILE_NAVIGATION: &str = "cross_file_navigation";
pub const IDENTIFIER_INTERPRETABILITY: &str = "identifier_interpretability";
pub const DOCUMENTATION_ACCURACY_DETECTION: &str = "documentation_accuracy_detection";

/// Lowest and highest heuristic score.
pub const MIN_SCORE: i32 = 1;
pub const MAX_SCORE: i32 = 10;

/// A piece of code selected for evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub file_path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub function_name: String,
    #[serde(default)]
    pub start_line: usize,
    #[serde(default)]
    pub end_line: usize,
    pub selection_score: f64,
    pub description: String,
}

/// Outcome of evaluating one sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleResult {
    pub sample: Sample,
    /// 1-10 on success, 0 when the sample failed.
    pub score: i32,
    pub prompt: String,
    pub response: String,
    pub duration: Duration,
    pub error: Option<String>,
    pub score_trace: ScoreTrace,
}

/// Outcome of one metric.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    pub metric_id: String,
    pub metric_name: String,
    /// 1-10, or 0 when nothing could be scored.
    pub score: i32,
    pub samples: Vec<SampleResult>,
    pub tokens_used: u64,
    pub duration: Duration,
    pub error: Option<String>,
}

impl MetricResult {
    pub fn new(metric_id: impl Into<String>, metric_name: impl Into<String>) -> Self {
        Self {
            metric_id: metric_id.into(),
            metric_name: metric_name.into(),
            ..Default::default()
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs a prompt against a coding agent.
///
/// `work_dir` may be empty, in which case the executor uses its own default.
#[async_trait]
pub trait PromptExecutor: Send + Sync {
    async fn execute_prompt(
        &self,
        cancel: &CancellationToken,
        work_dir: &Path,
        prompt: &str,
        tools: &str,
        timeout: Duration,
    ) -> Result<String, PromptError>;
}

/// Notified as a metric works through its samples.
pub trait SampleObserver: Send + Sync {
    /// `current` is the number of finished work units for `metric_id`.
    fn on_sample(&self, metric_id: &str, current: usize);
}

/// An agent evaluation metric.
#[async_trait]
pub trait Metric: Send + Sync {
    fn id(&self) -> &'static str;

    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Budget for the whole metric, split across its samples.
    fn timeout(&self) -> Duration;

    /// Maximum number of samples [`select_samples`](Self::select_samples) returns.
    fn sample_count(&self) -> usize;

    /// Deterministically picks samples from the targets, best first.
    fn select_samples(&self, targets: &[AnalysisTarget]) -> Vec<Sample>;

    /// Number of prompts [`execute`](Self::execute) sends for these samples.
    fn work_units(&self, samples: &[Sample]) -> usize {
        samples.len()
    }

    /// Evaluates the samples. Failures are recorded in the result, never returned.
    async fn execute(
        &self,
        cancel: &CancellationToken,
        work_dir: &Path,
        samples: &[Sample],
        executor: &dyn PromptExecutor,
        observer: Option<&dyn SampleObserver>,
    ) -> MetricResult;
}

/// The built-in metrics in canonical order.
pub fn all_metrics() -> Vec<Box<dyn Metric>> {
    vec![
        Box::new(ConsistencyMetric::new()),
        Box::new(ComprehensionMetric::new()),
        Box::new(NavigationMetric::new()),
        Box::new(IdentifiersMetric::new()),
        Box::new(DocumentationMetric::new()),
    ]
}

/// Looks up a built-in metric by id.
pub fn metric_by_id(id: &str) -> Option<Box<dyn Metric>> {
    all_metrics().into_iter().find(|m| m.id() == id)
}

/// Rough token count for text sent to or received from the agent.
pub fn estimate_tokens(chars: usize) -> u64 {
    (chars / 4) as u64
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replies with scripted responses in order and records prompts.
    pub struct ScriptedExecutor {
        replies: Mutex<Vec<Result<String, String>>>,
        pub prompts: Mutex<Vec<(String, String, Duration)>>,
        pub calls: AtomicUsize,
    }

    impl ScriptedExecutor {
        pub fn new(replies: Vec<Result<&str, &str>>) -> Self {
            let mut replies: Vec<Result<String, String>> = replies
                .into_iter()
                .map(|r| r.map(str::to_string).map_err(str::to_string))
                .collect();
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
                prompts: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PromptExecutor for ScriptedExecutor {
        async fn execute_prompt(
            &self,
            _cancel: &CancellationToken,
            _work_dir: &Path,
            prompt: &str,
            tools: &str,
            timeout: Duration,
        ) -> Result<String, PromptError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts
                .lock()
                .unwrap()
                .push((prompt.to_string(), tools.to_string(), timeout));
            match self.replies.lock().unwrap().pop() {
                Some(Ok(text)) => Ok(text),
                Some(Err(msg)) => Err(PromptError::Execution(msg)),
                None => Err(PromptError::Execution("no scripted reply".to_string())),
            }
        }
    }

    /// Records observer callbacks.
    #[derive(Default)]
    pub struct RecordingObserver {
        pub events: Mutex<Vec<(String, usize)>>,
    }

    impl SampleObserver for RecordingObserver {
        fn on_sample(&self, metric_id: &str, current: usize) {
            self.events
                .lock()
                .unwrap()
                .push((metric_id.to_string(), current));
        }
    }

    pub fn go_target(files: Vec<SourceFileSpec>) -> AnalysisTarget {
        use crate::target::{Language, SourceFile};
        AnalysisTarget::new(
            "/repo",
            Language::Go,
            files
                .into_iter()
                .map(|f| SourceFile::new(f.0, Language::Go, f.1))
                .collect(),
        )
    }

    pub struct SourceFileSpec(pub &'static str, pub String);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_registry_order_and_identity() {
        let ids: Vec<_> = all_metrics().iter().map(|m| m.id()).collect();
        assert_eq!(
            ids,
            vec![
                TASK_EXECUTION_CONSISTENCY,
                CODE_BEHAVIOR_COMPREHENSION,
                CROSS_FILE_NAVIGATION,
                IDENTIFIER_INTERPRETABILITY,
                DOCUMENTATION_ACCURACY_DETECTION,
            ]
        );
        let names: HashSet<_> = all_metrics().iter().map(|m| m.name()).collect();
        assert_eq!(names.len(), 5);
    }

    #[test]
    fn test_metric_budgets() {
        let expected = [
            (TASK_EXECUTION_CONSISTENCY, 1, 540),
            (CODE_BEHAVIOR_COMPREHENSION, 3, 360),
            (CROSS_FILE_NAVIGATION, 2, 360),
            (IDENTIFIER_INTERPRETABILITY, 5, 180),
            (DOCUMENTATION_ACCURACY_DETECTION, 3, 180),
        ];
        for (id, samples, secs) in expected {
            let metric = metric_by_id(id).unwrap();
            assert_eq!(metric.sample_count(), samples, "{id}");
            assert_eq!(metric.timeout(), Duration::from_secs(secs), "{id}");
            assert!(!metric.description().is_empty());
        }
        assert!(metric_by_id("nope").is_none());
    }

    #[test]
    fn test_no_samples_from_empty_targets() {
        for metric in all_metrics() {
            assert!(metric.select_samples(&[]).is_empty(), "{}", metric.id());
        }
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(0), 0);
        assert_eq!(estimate_tokens(7), 1);
        assert_eq!(estimate_tokens(400), 100);
    }
}
