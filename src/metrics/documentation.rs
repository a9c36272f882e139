//! M5: can the agent spot comments that no longer match the code?

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::execute::{execute_standard_metric, StandardExecution};
use super::scoring::{match_groups, match_negative_indicators, take_best, IndicatorGroup, LazyRegex, ScoreTrace};
use super::{Metric, MetricResult, PromptExecutor, Sample, SampleObserver, DOCUMENTATION_ACCURACY_DETECTION};
use crate::target::AnalysisTarget;

const SAMPLE_COUNT: usize = 3;
const TIMEOUT: Duration = Duration::from_secs(180);
const TOOLS: &str = "Read";
const MIN_LINES: usize = 20;
const MIN_COMMENT_DENSITY: f64 = 0.05;
/// Assumed length of a block comment.
const BLOCK_COMMENT_LINES: usize = 3;
const BASE_SCORE: i32 = 3;

static LINE_COMMENT: LazyRegex = LazyRegex::new(r"^\s*(?://|#)");

const GROUPS: &[IndicatorGroup] = &[
    IndicatorGroup {
        name: "structure_summary",
        members: &["## summary"],
    },
    IndicatorGroup {
        name: "accurate_section",
        members: &["accurate documentation", "## accurate"],
    },
    IndicatorGroup {
        name: "mismatch_section",
        members: &["potential mismatch", "## potential"],
    },
    IndicatorGroup {
        name: "specific_analysis",
        members: &["location:", "comment says", "code does", "issue:"],
    },
    IndicatorGroup {
        name: "quality_language",
        members: &["accurate", "correctly", "describes", "matches", "documentation"],
    },
];

const CONCLUSIONS: &[&str] = &[
    "all documentation appears accurate",
    "no mismatches found",
    "documentation is accurate",
];

const NEGATIVE: &[&str] = &[
    "cannot analyze",
    "unable to",
    "error reading",
    "no comments",
    "file not found",
];

#[derive(Debug, Default)]
pub struct DocumentationMetric;

impl DocumentationMetric {
    pub fn new() -> Self {
        Self
    }
}

/// Estimated comment lines: line comments plus paired block comments.
pub(crate) fn count_comment_lines(content: &str) -> usize {
    let line_comments = content.lines().filter(|l| LINE_COMMENT.is_match(l)).count();
    let blocks = content.matches("/*").count().min(content.matches("*/").count());
    line_comments + blocks * BLOCK_COMMENT_LINES
}

fn build_prompt(sample: &Sample) -> String {
    format!(
        "Analyze the documentation accuracy in {}.\n\
         \n\
         Your task:\n\
         1. Read the file and identify all comments (line comments, block comments, doc strings)\n\
         2. For each comment, check if it accurately describes the adjacent code\n\
         3. Report any mismatches where comments don't match code behavior\n\
         \n\
         Format your response as:\n\
         ## Summary\n\
         [Overall documentation accuracy: good/moderate/poor]\n\
         \n\
         ## Accurate Documentation\n\
         [List comments that correctly describe the code]\n\
         \n\
         ## Potential Mismatches\n\
         [List any comments that may be outdated, incorrect, or misleading]\n\
         For each mismatch:\n\
         - Location: [line number or code reference]\n\
         - Comment says: [what the comment claims]\n\
         - Code does: [what the code actually does]\n\
         - Issue: [why this is a mismatch]\n\
         \n\
         If all documentation appears accurate, state that clearly.",
        sample.file_path
    )
}

pub(crate) fn score_response(response: &str) -> ScoreTrace {
    let lower = response.to_lowercase();
    let mut trace = ScoreTrace::new(BASE_SCORE);
    trace.extend(match_groups(&lower, GROUPS));
    let concluded = CONCLUSIONS.iter().any(|c| lower.contains(c))
        || (lower.contains("mismatch") && lower.contains("line"));
    trace.push("group:conclusion", concluded, 1);
    trace.extend(match_negative_indicators(&lower, NEGATIVE));
    trace.finish()
}

#[async_trait]
impl Metric for DocumentationMetric {
    fn id(&self) -> &'static str {
        DOCUMENTATION_ACCURACY_DETECTION
    }

    fn name(&self) -> &'static str {
        "Documentation Accuracy Detection"
    }

    fn description(&self) -> &'static str {
        "Measures ability to detect comment/code mismatches"
    }

    fn timeout(&self) -> Duration {
        TIMEOUT
    }

    fn sample_count(&self) -> usize {
        SAMPLE_COUNT
    }

    fn select_samples(&self, targets: &[AnalysisTarget]) -> Vec<Sample> {
        let candidates = targets
            .iter()
            .flat_map(|t| t.source_files())
            .filter(|f| f.lines >= MIN_LINES)
            .filter_map(|file| {
                let comments = count_comment_lines(&file.content);
                let density = comments as f64 / file.lines as f64;
                if density < MIN_COMMENT_DENSITY {
                    return None;
                }
                Some(Sample {
                    file_path: file.rel_path.clone(),
                    selection_score: density,
                    description: format!(
                        "Comment density {:.1}% ({} comment lines)",
                        density * 100.0,
                        comments
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
