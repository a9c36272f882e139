//! M1: does the agent give the same answer to the same task?

use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::execute::{run_prompt, PromptJob, NO_SAMPLES};
use super::scoring::{take_best, LazyRegex, ScoreTrace};
use super::{
    estimate_tokens, Metric, MetricResult, PromptExecutor, Sample, SampleObserver, MAX_SCORE,
    MIN_SCORE, TASK_EXECUTION_CONSISTENCY,
};
use crate::target::{AnalysisTarget, FileClass, Language};

const SAMPLE_COUNT: usize = 1;
const TIMEOUT: Duration = Duration::from_secs(540);
const RUNS: usize = 3;
const TOOLS: &str = "Read";

const MIN_LINES: usize = 50;
const MAX_LINES: usize = 200;
const MIN_FUNCS: usize = 3;
const MAX_FUNCS: usize = 10;
const IDEAL_LINES: usize = 100;
const IDEAL_FUNCS: usize = 5;
const FALLBACK_MIN_LINES: usize = 20;

const ALL_RUNS_FAILED: &str = "all runs failed";

static GO_FUNC: LazyRegex = LazyRegex::new(r"(?m)^func\s+");
static PY_FUNC: LazyRegex = LazyRegex::new(r"(?m)^\s*def\s+");
static TS_FUNC: LazyRegex = LazyRegex::new(r"(?m)^\s*(?:export\s+)?(?:async\s+)?function\s+");

pub struct ConsistencyMetric {
    runs: usize,
}

impl ConsistencyMetric {
    pub fn new() -> Self {
        Self { runs: RUNS }
    }
}

impl Default for ConsistencyMetric {
    fn default() -> Self {
        Self::new()
    }
}

fn count_functions(language: Language, content: &str) -> usize {
    match language {
        Language::Python => PY_FUNC.count(content),
        Language::TypeScript => TS_FUNC.count(content),
        Language::Go | Language::Other => GO_FUNC.count(content),
    }
}

fn build_prompt(sample: &Sample) -> String {
    format!(
        "Read the file at {} and list all function names defined in it.\n\
         Return ONLY a JSON array of function names, e.g.: [\"func1\", \"func2\"]\n\
         Do not include any explanation, just the JSON array.",
        sample.file_path
    )
}

/// Scores one run on how closely the reply is a bare JSON array.
pub(crate) fn score_run(response: &str) -> ScoreTrace {
    let response = response.trim();
    let mut trace = ScoreTrace::new(0);
    if response.starts_with('[') && response.ends_with(']') {
        trace.push("json_array_exact", true, 10);
    } else if response.contains('[') {
        trace.push("json_array_exact", false, 0);
        trace.push("json_array_partial", true, 7);
    } else if !response.is_empty() {
        trace.push("json_array_exact", false, 0);
        trace.push("json_array_partial", false, 0);
        trace.push("non_empty_response", true, 4);
    } else {
        trace.push("json_array_exact", false, 0);
        trace.push("json_array_partial", false, 0);
        trace.push("non_empty_response", false, 0);
        trace.push("empty_response", true, 1);
    }
    trace.finish()
}

/// Population variance of the run scores.
fn variance(scores: &[i32]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let n = scores.len() as f64;
    let mean = scores.iter().map(|&s| s as f64).sum::<f64>() / n;
    scores.iter().map(|&s| (s as f64 - mean).powi(2)).sum::<f64>() / n
}

pub(crate) fn score_from_variance(scores: &[i32]) -> i32 {
    match variance(scores) {
        v if v < 5.0 => MAX_SCORE,
        v if v < 15.0 => 7,
        v if v < 30.0 => 4,
        _ => MIN_SCORE,
    }
}

#[async_trait]
impl Metric for ConsistencyMetric {
    fn id(&self) -> &'static str {
        TASK_EXECUTION_CONSISTENCY
    }

    fn name(&self) -> &'static str {
        "Task Execution Consistency"
    }

    fn description(&self) -> &'static str {
        "Measures reproducibility of agent task completion across multiple runs"
    }

    fn timeout(&self) -> Duration {
        TIMEOUT
    }

    fn sample_count(&self) -> usize {
        SAMPLE_COUNT
    }

    /// Prefers a moderately sized file with a handful of functions.
    fn select_samples(&self, targets: &[AnalysisTarget]) -> Vec<Sample> {
        let mut candidates = Vec::new();
        for target in targets {
            for file in target.source_files() {
                if file.lines < MIN_LINES || file.lines > MAX_LINES {
                    continue;
                }
                let funcs = count_functions(file.language, &file.content);
                if !(MIN_FUNCS..=MAX_FUNCS).contains(&funcs) {
                    continue;
                }
                let size_score =
                    1.0 - file.lines.abs_diff(IDEAL_LINES) as f64 / IDEAL_LINES as f64;
                let func_score = 1.0 - funcs.abs_diff(IDEAL_FUNCS) as f64 / IDEAL_FUNCS as f64;
                candidates.push(Sample {
                    file_path: file.rel_path.clone(),
                    selection_score: (size_score + func_score) / 2.0,
                    description: format!("Moderate size ({} LOC, {} funcs)", file.lines, funcs),
                    ..Default::default()
                });
            }
        }

        if candidates.is_empty() {
            for file in targets.iter().flat_map(|t| t.files.iter()) {
                if file.class == FileClass::Source && file.lines > FALLBACK_MIN_LINES {
                    candidates.push(Sample {
                        file_path: file.rel_path.clone(),
                        selection_score: file.lines as f64,
                        description: format!("Fallback selection ({} LOC)", file.lines),
                        ..Default::default()
                    });
                }
            }
        }

        take_best(candidates, SAMPLE_COUNT)
    }

    fn work_units(&self, samples: &[Sample]) -> usize {
        if samples.is_empty() {
            0
        } else {
            self.runs
        }
    }

    async fn execute(
        &self,
        cancel: &CancellationToken,
        work_dir: &Path,
        samples: &[Sample],
        executor: &dyn PromptExecutor,
        observer: Option<&dyn SampleObserver>,
    ) -> MetricResult {
        let started = Instant::now();
        let mut result = MetricResult::new(self.id(), self.name());

        let Some(sample) = samples.first() else {
            result.error = Some(NO_SAMPLES.to_string());
            result.duration = started.elapsed();
            return result;
        };

        let per_run = TIMEOUT / self.runs as u32;
        let mut scores = Vec::with_capacity(self.runs);
        for run in 0..self.runs {
            let job = PromptJob {
                sample,
                prompt: build_prompt(sample),
                tools: TOOLS,
                timeout: per_run,
            };
            let sr = run_prompt(cancel, work_dir, executor, job, &score_run).await;
            result.tokens_used += estimate_tokens(sr.prompt.len() + sr.response.len());
            if sr.error.is_none() {
                scores.push(sr.score);
            }
            debug!(run, score = sr.score, failed = sr.error.is_some(), "Consistency run finished");
            result.samples.push(sr);
            if let Some(observer) = observer {
                observer.on_sample(self.id(), run + 1);
            }
        }

        result.duration = started.elapsed();
        if scores.is_empty() {
            result.error = Some(ALL_RUNS_FAILED.to_string());
            return result;
        }
        result.score = score_from_variance(&scores);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::test_support::{go_target, RecordingObserver, ScriptedExecutor, SourceFileSpec};

    fn go_file(funcs: usize, lines: usize) -> String {
        let mut out = String::from("package x\n");
        for i in 0..funcs {
            out.push_str(&format!("func f{i}() {{}}\n"));
        }
        while out.lines().count() < lines {
            out.push_str("// filler\n");
        }
        out
    }

    #[test]
    fn test_score_run_shapes() {
        assert_eq!(score_run("[\"a\", \"b\"]").final_score, 10);
        assert_eq!(score_run("  [\"a\"]\n").final_score, 10);
        assert_eq!(score_run("Here: [\"a\"] done").final_score, 7);
        assert_eq!(score_run("a, b, c").final_score, 4);
        let empty = score_run("   ");
        assert_eq!(empty.final_score, 1);
        assert_eq!(empty.indicators.len(), 4);
        assert!(empty.indicators[3].matched);
    }

    #[test]
    fn test_score_from_variance() {
        assert_eq!(score_from_variance(&[10, 10, 10]), 10);
        // variance of [10, 7, 10] is 2
        assert_eq!(score_from_variance(&[10, 7, 10]), 10);
        // variance of [10, 4, 10] is 8
        assert_eq!(score_from_variance(&[10, 4, 10]), 7);
        // variance of [10, 1, 10] is 18
        assert_eq!(score_from_variance(&[10, 1, 10]), 4);
        // variance of [10, 1] is 20.25
        assert_eq!(score_from_variance(&[10, 1]), 4);
        assert_eq!(score_from_variance(&[7]), 10);
    }

    #[test]
    fn test_select_prefers_ideal_file() {
        let target = go_target(vec![
            SourceFileSpec("ideal.go", go_file(5, 100)),
            SourceFileSpec("big.go", go_file(5, 180)),
            SourceFileSpec("too_small.go", go_file(5, 30)),
            SourceFileSpec("few_funcs.go", go_file(1, 100)),
        ]);
        let samples = ConsistencyMetric::new().select_samples(&[target]);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].file_path, "ideal.go");
        assert_eq!(samples[0].description, "Moderate size (100 LOC, 5 funcs)");
        assert!((samples[0].selection_score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_select_fallback_uses_largest_source_file() {
        let target = go_target(vec![
            SourceFileSpec("a.go", go_file(0, 25)),
            SourceFileSpec("b.go", go_file(0, 40)),
            SourceFileSpec("b_test.go", go_file(0, 400)),
            SourceFileSpec("tiny.go", go_file(0, 10)),
        ]);
        let samples = ConsistencyMetric::new().select_samples(&[target]);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].file_path, "b.go");
        assert_eq!(samples[0].description, "Fallback selection (40 LOC)");
    }

    #[tokio::test]
    async fn test_execute_three_runs() {
        let metric = ConsistencyMetric::new();
        let exec = ScriptedExecutor::new(vec![Ok("[\"a\"]"), Ok("[\"a\"]"), Ok("[\"a\"]")]);
        let observer = RecordingObserver::default();
        let sample = Sample {
            file_path: "x.go".to_string(),
            ..Default::default()
        };
        let result = metric
            .execute(&CancellationToken::new(), Path::new("/w"), &[sample.clone()], &exec, Some(&observer))
            .await;

        assert_eq!(result.score, 10);
        assert_eq!(result.samples.len(), 3);
        assert_eq!(exec.calls(), 3);
        assert_eq!(metric.work_units(&[sample]), 3);

        let prompts = exec.prompts.lock().unwrap();
        assert!(prompts[0].0.starts_with("Read the file at x.go and list all function names"));
        assert_eq!(prompts[0].2, Duration::from_secs(180));
        assert_eq!(observer.events.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_execute_all_runs_failed() {
        let metric = ConsistencyMetric::new();
        let exec = ScriptedExecutor::new(vec![Err("x"), Err("y"), Err("z")]);
        let result = metric
            .execute(&CancellationToken::new(), Path::new(""), &[Sample::default()], &exec, None)
            .await;
        assert_eq!(result.score, 0);
        assert_eq!(result.error.as_deref(), Some(ALL_RUNS_FAILED));
        assert_eq!(result.samples.len(), 3);
    }

    #[tokio::test]
    async fn test_execute_no_samples() {
        let exec = ScriptedExecutor::new(vec![]);
        let result = ConsistencyMetric::new()
            .execute(&CancellationToken::new(), Path::new(""), &[], &exec, None)
            .await;
        assert_eq!(result.error.as_deref(), Some(NO_SAMPLES));
        assert_eq!(exec.calls(), 0);
    }
}
