//! M3: can the agent follow dependencies out of a file?

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::execute::{execute_standard_metric, StandardExecution};
use super::scoring::{match_groups, match_negative_indicators, take_best, IndicatorGroup, LazyRegex, ScoreTrace};
use super::{Metric, MetricResult, PromptExecutor, Sample, SampleObserver, CROSS_FILE_NAVIGATION};
use crate::target::{AnalysisTarget, Language};

const SAMPLE_COUNT: usize = 2;
const TIMEOUT: Duration = Duration::from_secs(360);
const TOOLS: &str = "Read,Glob,Grep";
const MIN_IMPORTS: usize = 3;
const BASE_SCORE: i32 = 2;
const DEPTH_PATH_SEPARATORS: usize = 6;
const EXTENSIVE_WORDS: usize = 200;

// Go counts the `import` keyword plus each quoted path inside an import block.
static GO_IMPORTS: LazyRegex = LazyRegex::new(r#"(?m)^\s*(?:import\s+|"[^"]+"\s*$|\t"[^"]+")"#);
static PY_IMPORTS: LazyRegex = LazyRegex::new(r"(?m)^(?:import|from)\s+\w+");
static TS_IMPORTS: LazyRegex = LazyRegex::new(r#"(?m)^import\s+.+from\s+['"]"#);
static OTHER_IMPORTS: LazyRegex = LazyRegex::new(r"(?m)^(?:import|from|require|include)\s+");

const GROUPS: &[IndicatorGroup] = &[
    IndicatorGroup {
        name: "import_awareness",
        members: &["import", "from"],
    },
    IndicatorGroup {
        name: "cross_file_refs",
        members: &[".go", ".py", ".ts", ".js"],
    },
    IndicatorGroup {
        name: "data_flow",
        members: &["->", "flow"],
    },
    IndicatorGroup {
        name: "purpose_mapping",
        members: &["module", "provides", "exports", "purpose"],
    },
];

const NEGATIVE: &[&str] = &[
    "cannot find",
    "not found",
    "no file",
    "unable to",
    "cannot trace",
    "unknown",
];

#[derive(Debug, Default)]
pub struct NavigationMetric;

impl NavigationMetric {
    pub fn new() -> Self {
        Self
    }
}

fn import_pattern(language: Language) -> &'static LazyRegex {
    match language {
        Language::Go => &GO_IMPORTS,
        Language::Python => &PY_IMPORTS,
        Language::TypeScript => &TS_IMPORTS,
        Language::Other => &OTHER_IMPORTS,
    }
}

fn build_prompt(sample: &Sample) -> String {
    format!(
        "Examine the file at {} and trace its dependencies.\n\
         \n\
         Your task:\n\
         1. List all imports/dependencies in this file\n\
         2. For each imported module/package, identify what it provides\n\
         3. Trace the data flow: pick one function and show how data flows from this file through other files\n\
         \n\
         Format your response as:\n\
         - Imports: [list of imports]\n\
         - Dependency Purpose: [for each import, what it provides]\n\
         - Data Flow Trace: [starting function] -> [calls in other files] -> [final destination]\n\
         \n\
         Reference actual file paths and function names from the codebase.",
        sample.file_path
    )
}

pub(crate) fn score_response(response: &str) -> ScoreTrace {
    let lower = response.to_lowercase();
    let mut trace = ScoreTrace::new(BASE_SCORE);
    trace.extend(match_groups(&lower, GROUPS));
    trace.push(
        "group:depth",
        response.matches('/').count() > DEPTH_PATH_SEPARATORS,
        1,
    );
    trace.push(
        "group:extensive_depth",
        response.split_whitespace().count() > EXTENSIVE_WORDS,
        1,
    );
    trace.extend(match_negative_indicators(&lower, NEGATIVE));
    trace.finish()
}

#[async_trait]
impl Metric for NavigationMetric {
    fn id(&self) -> &'static str {
        CROSS_FILE_NAVIGATION
    }

    fn name(&self) -> &'static str {
        "Cross-File Navigation"
    }

    fn description(&self) -> &'static str {
        "Measures ability to trace dependencies across files"
    }

    fn timeout(&self) -> Duration {
        TIMEOUT
    }

    fn sample_count(&self) -> usize {
        SAMPLE_COUNT
    }

    /// Files with the most imports, using the target language's import syntax.
    fn select_samples(&self, targets: &[AnalysisTarget]) -> Vec<Sample> {
        let mut candidates = Vec::new();
        for target in targets {
            let pattern = import_pattern(target.language);
            for file in target.source_files() {
                let imports = pattern.count(&file.content);
                if imports < MIN_IMPORTS {
                    continue;
                }
                candidates.push(Sample {
                    file_path: file.rel_path.clone(),
                    selection_score: imports as f64,
                    description: format!("High import count ({} imports)", imports),
                    ..Default::default()
                });
            }
        }
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
