//! M4: can the agent tell what an identifier means from its name alone?

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::execute::{execute_standard_metric, StandardExecution};
use super::scoring::{match_groups, IndicatorGroup, LazyRegex, ScoreTrace};
use super::{Metric, MetricResult, PromptExecutor, Sample, SampleObserver, IDENTIFIER_INTERPRETABILITY};
use crate::target::{AnalysisTarget, Language, SourceFile};

const SAMPLE_COUNT: usize = 5;
const TIMEOUT: Duration = Duration::from_secs(180);
const TOOLS: &str = "Read";
const MIN_NAME_LEN: usize = 4;
const BASE_SCORE: i32 = 1;
const SELF_REPORT_POSITIVE: i32 = 2;
const SELF_REPORT_NEGATIVE: i32 = -2;

const SKIPPED_PREFIXES: &[&str] = &["test", "example", "mock"];

static GO_FUNC: LazyRegex = LazyRegex::new(r"(?m)^func\s+([A-Z][a-zA-Z0-9_]*)\s*\(");
static GO_TYPE: LazyRegex = LazyRegex::new(r"(?m)^type\s+([A-Z][a-zA-Z0-9_]*)\s+");
static GO_VAR: LazyRegex = LazyRegex::new(r"(?m)^(?:var|const)\s+([A-Z][a-zA-Z0-9_]*)");
static TS_EXPORT: LazyRegex = LazyRegex::new(
    r"(?m)^export\s+(?:function|class|const|let|var|interface|type)\s+([a-zA-Z_][a-zA-Z0-9_]*)",
);
static PY_PUBLIC: LazyRegex = LazyRegex::new(r"(?m)^(?:def|class)\s+([a-zA-Z][a-zA-Z0-9_]*)");

static GO_PATTERNS: [&LazyRegex; 3] = [&GO_FUNC, &GO_TYPE, &GO_VAR];
static TS_PATTERNS: [&LazyRegex; 1] = [&TS_EXPORT];
static PY_PATTERNS: [&LazyRegex; 1] = [&PY_PUBLIC];

const GROUPS: &[IndicatorGroup] = &[
    IndicatorGroup {
        name: "self_report_partial",
        members: &["mostly correct", "partially"],
    },
    IndicatorGroup {
        name: "self_report_negative",
        members: &["incorrect", "wrong", "misunderstood"],
    },
    IndicatorGroup {
        name: "detailed_interpretation",
        members: &["interpretation:", "purpose:"],
    },
    IndicatorGroup {
        name: "action_words",
        members: &[
            "handles",
            "manages",
            "creates",
            "processes",
            "returns",
            "validates",
            "converts",
            "parses",
        ],
    },
    IndicatorGroup {
        name: "structure_verification",
        members: &["verification:"],
    },
    IndicatorGroup {
        name: "structure_accuracy",
        members: &["accuracy:"],
    },
];

#[derive(Debug, Default)]
pub struct IdentifiersMetric;

impl IdentifiersMetric {
    pub fn new() -> Self {
        Self
    }
}

fn patterns_for(language: Language) -> &'static [&'static LazyRegex] {
    match language {
        Language::Go => &GO_PATTERNS,
        Language::TypeScript => &TS_PATTERNS,
        Language::Python => &PY_PATTERNS,
        Language::Other => &[],
    }
}

/// Words in an identifier: `_`-separated parts, else camel-case humps.
pub(crate) fn count_words(name: &str) -> usize {
    if name.contains('_') {
        return name.split('_').filter(|p| !p.is_empty()).count();
    }
    1 + name
        .chars()
        .skip(1)
        .filter(|c| c.is_ascii_uppercase())
        .count()
}

fn extract(file: &SourceFile, patterns: &[&LazyRegex]) -> Vec<Sample> {
    let content = file.content.as_str();
    let mut found = Vec::new();
    for re in patterns.iter().filter_map(|p| p.get()) {
        for caps in re.captures_iter(content) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let name = name.as_str();
            if name.len() < MIN_NAME_LEN {
                continue;
            }
            let lower = name.to_lowercase();
            if SKIPPED_PREFIXES.iter().any(|p| lower.starts_with(p)) {
                continue;
            }
            let line = 1 + content[..whole.start()].matches('\n').count();
            found.push(Sample {
                file_path: file.rel_path.clone(),
                function_name: name.to_string(),
                start_line: line,
                selection_score: (name.len() * count_words(name)) as f64,
                description: format!("Exported identifier '{}' with {} chars", name, name.len()),
                ..Default::default()
            });
        }
    }
    found
}

fn build_prompt(sample: &Sample) -> String {
    format!(
        "Without reading the file, interpret what the identifier \"{name}\" means based ONLY on its name.\n\
         \n\
         1. What is the likely purpose of this identifier?\n\
         2. What type of thing is it (function, type, variable, constant)?\n\
         3. What domain/concern does it belong to?\n\
         \n\
         After your interpretation, read {path} (line {line}) to verify your interpretation.\n\
         \n\
         Format:\n\
         - Interpretation: [your interpretation based on name alone]\n\
         - Verification: [what you found in the code]\n\
         - Accuracy: [how accurate was your interpretation?]",
        name = sample.function_name,
        path = sample.file_path,
        line = sample.start_line,
    )
}

pub(crate) fn score_response(response: &str) -> ScoreTrace {
    let lower = response.to_lowercase();
    let mut trace = ScoreTrace::new(BASE_SCORE);
    trace.push("group:self_report_positive", lower.contains("accurate"), SELF_REPORT_POSITIVE);
    trace.extend(match_groups(&lower, GROUPS).into_iter().map(|mut m| {
        if m.matched && m.name == "group:self_report_negative" {
            m.delta = SELF_REPORT_NEGATIVE;
        }
        m
    }));
    trace.finish()
}

#[async_trait]
impl Metric for IdentifiersMetric {
    fn id(&self) -> &'static str {
        IDENTIFIER_INTERPRETABILITY
    }

    fn name(&self) -> &'static str {
        "Identifier Interpretability"
    }

    fn description(&self) -> &'static str {
        "Measures ability to infer meaning from identifier names"
    }

    fn timeout(&self) -> Duration {
        TIMEOUT
    }

    fn sample_count(&self) -> usize {
        SAMPLE_COUNT
    }

    /// Long, multi-word exported names; each name is sampled at most once.
    fn select_samples(&self, targets: &[AnalysisTarget]) -> Vec<Sample> {
        let mut candidates: Vec<Sample> = targets
            .iter()
            .flat_map(|t| {
                let patterns = patterns_for(t.language);
                t.source_files().flat_map(move |f| extract(f, patterns))
            })
            .collect();
        candidates.sort_by(|a, b| b.selection_score.total_cmp(&a.selection_score));

        let mut seen = HashSet::new();
        candidates.retain(|s| seen.insert(s.function_name.clone()));
        candidates.truncate(SAMPLE_COUNT);
        candidates
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
