//! M2: can the agent explain what a piece of code does?

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::execute::{execute_standard_metric, StandardExecution};
use super::scoring::{match_groups, match_negative_indicators, take_best, IndicatorGroup, LazyRegex, ScoreTrace};
use super::{Metric, MetricResult, PromptExecutor, Sample, SampleObserver, CODE_BEHAVIOR_COMPREHENSION};
use crate::target::AnalysisTarget;

const SAMPLE_COUNT: usize = 3;
const TIMEOUT: Duration = Duration::from_secs(360);
const TOOLS: &str = "Read,Grep";
const MIN_LINES: usize = 30;
const MIN_COMPLEXITY: usize = 5;
const BASE_SCORE: i32 = 2;

static CONTROL_FLOW: LazyRegex = LazyRegex::new(r"\b(?:if|for|switch|case|while|try|catch|else)\b");

const GROUPS: &[IndicatorGroup] = &[
    IndicatorGroup {
        name: "behavior_understanding",
        members: &["returns", "return value", "returns the"],
    },
    IndicatorGroup {
        name: "error_handling",
        members: &["error", "handles", "handling"],
    },
    IndicatorGroup {
        name: "control_flow",
        members: &["if ", "when ", "condition"],
    },
    IndicatorGroup {
        name: "edge_awareness",
        members: &["edge case", "corner case", "boundary"],
    },
    IndicatorGroup {
        name: "side_effects",
        members: &["side effect", "modifies", "updates"],
    },
    IndicatorGroup {
        name: "validation",
        members: &["validates", "checks", "ensures"],
    },
];

const NEGATIVE: &[&str] = &["i don't know", "unclear", "cannot determine", "not sure", "unsure"];

const HEDGING: &[&str] = &["might", "probably", "seems to"];

#[derive(Debug, Default)]
pub struct ComprehensionMetric;

impl ComprehensionMetric {
    pub fn new() -> Self {
        Self
    }
}

fn build_prompt(sample: &Sample) -> String {
    format!(
        "Read the file at {} and explain what the code does.\n\
         \n\
         Focus on:\n\
         1. The main purpose/behavior of the code\n\
         2. Important control flow paths (branches, loops)\n\
         3. Error handling and edge cases\n\
         4. Return values and side effects\n\
         \n\
         Be specific and reference actual code elements.",
        sample.file_path
    )
}

pub(crate) fn score_response(response: &str) -> ScoreTrace {
    let lower = response.to_lowercase();
    let mut trace = ScoreTrace::new(BASE_SCORE);
    trace.extend(match_groups(&lower, GROUPS));
    trace.extend(match_negative_indicators(&lower, NEGATIVE));
    let hedging = HEDGING.iter().any(|h| lower.contains(h));
    trace.push("group:hedging_language", hedging, -1);
    trace.finish()
}

#[async_trait]
impl Metric for ComprehensionMetric {
    fn id(&self) -> &'static str {
        CODE_BEHAVIOR_COMPREHENSION
    }

    fn name(&self) -> &'static str {
        "Code Behavior Comprehension"
    }

    fn description(&self) -> &'static str {
        "Measures agent's understanding of what code does (semantics, not syntax)"
    }

    fn timeout(&self) -> Duration {
        TIMEOUT
    }

    fn sample_count(&self) -> usize {
        SAMPLE_COUNT
    }

    /// Favors files dense in branching and looping relative to their size.
    fn select_samples(&self, targets: &[AnalysisTarget]) -> Vec<Sample> {
        let candidates = targets
            .iter()
            .flat_map(|t| t.source_files())
            .filter(|f| f.lines >= MIN_LINES)
            .filter_map(|file| {
                let complexity = CONTROL_FLOW.count(&file.content);
                if complexity < MIN_COMPLEXITY {
                    return None;
                }
                Some(Sample {
                    file_path: file.rel_path.clone(),
                    selection_score: complexity as f64 / (file.lines as f64).sqrt(),
                    description: format!(
                        "Complex file ({} complexity indicators, {} LOC)",
                        complexity, file.lines
                    ),
                    ..Default::default()
                })
            })
            .collect();
        take_best(candidates, SAMPLE_COUNT)
    }

    async fn execute(
        &self,
        cancel: &CancellationToken,
        work_dir: &Path,
        samples: &[Sample],
        executor: &dyn PromptExecutor,
        observer: Option<&dyn SampleObserver>,
    ) -> MetricResult {
        let cfg = StandardExecution {
            metric_id: self.id(),
            metric_name: self.name(),
            timeout: TIMEOUT,
            tools: TOOLS,
            build_prompt: &build_prompt,
            score_response: &score_response,
        };
        execute_standard_metric(cancel, work_dir, samples, executor, observer, cfg).await
    }
}
