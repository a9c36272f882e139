//! Capture and replay of metric responses.
//!
//! A debug directory holds one JSON file per sample, named
//! `{metric_id}_{sample_index}.json`. [`save_responses`] writes it after a live
//! run; [`ReplayExecutor`] serves it back so metrics can be re-scored without
//! the CLI.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{PromptError, ReplayError};
use crate::metrics::{
    MetricResult, PromptExecutor, CODE_BEHAVIOR_COMPREHENSION, CROSS_FILE_NAVIGATION,
    DOCUMENTATION_ACCURACY_DETECTION, IDENTIFIER_INTERPRETABILITY, TASK_EXECUTION_CONSISTENCY,
};
use crate::utils::lock;

/// Metric id used for prompts the classifier does not recognise.
pub const UNKNOWN_METRIC: &str = "unknown";

/// One captured sample execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugResponse {
    pub metric_id: String,
    pub sample_index: usize,
    pub file_path: String,
    pub prompt: String,
    pub response: String,
    pub duration_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DebugResponse {
    pub fn key(&self) -> String {
        response_key(&self.metric_id, self.sample_index)
    }
}

pub fn response_key(metric_id: &str, sample_index: usize) -> String {
    format!("{}_{}", metric_id, sample_index)
}

/// Writes every sample of every result to `debug_dir`, creating it if needed.
pub fn save_responses(debug_dir: &Path, results: &[MetricResult]) -> Result<usize, ReplayError> {
    fs::create_dir_all(debug_dir).map_err(|source| ReplayError::CreateDir {
        path: debug_dir.to_path_buf(),
        source,
    })?;

    let mut written = 0;
    for result in results.iter().filter(|r| !r.metric_id.is_empty()) {
        for (index, sample) in result.samples.iter().enumerate() {
            let captured = DebugResponse {
                metric_id: result.metric_id.clone(),
                sample_index: index,
                file_path: sample.sample.file_path.clone(),
                prompt: sample.prompt.clone(),
                response: sample.response.clone(),
                duration_seconds: sample.duration.as_secs_f64(),
                error: sample.error.clone().filter(|e| !e.is_empty()),
            };
            let path = debug_dir.join(format!("{}.json", captured.key()));
            let json = serde_json::to_string_pretty(&captured)?;
            fs::write(&path, json).map_err(|source| ReplayError::Write { path, source })?;
            written += 1;
        }
    }

    info!(dir = %debug_dir.display(), files = written, "Saved captured responses");
    Ok(written)
}

/// Reads all `*.json` captures in `debug_dir`, keyed by `{metric_id}_{sample_index}`.
///
/// Subdirectories and other files are skipped; a malformed capture is an error.
pub fn load_responses(debug_dir: &Path) -> Result<HashMap<String, DebugResponse>, ReplayError> {
    let entries = fs::read_dir(debug_dir).map_err(|source| ReplayError::Read {
        path: debug_dir.to_path_buf(),
        source,
    })?;

    let mut responses = HashMap::new();
    for entry in entries {
        let entry = entry.map_err(|source| ReplayError::Read {
            path: debug_dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() || path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let data = fs::read_to_string(&path).map_err(|source| ReplayError::Read {
            path: path.clone(),
            source,
        })?;
        let captured: DebugResponse =
            serde_json::from_str(&data).map_err(|source| ReplayError::Parse { path, source })?;
        responses.insert(captured.key(), captured);
    }

    debug!(dir = %debug_dir.display(), count = responses.len(), "Loaded captured responses");
    Ok(responses)
}

/// True when `debug_dir` exists and holds at least one `*.json` file.
pub fn has_captures(debug_dir: &Path) -> bool {
    fs::read_dir(debug_dir)
        .map(|entries| {
            entries.filter_map(Result::ok).any(|e| {
                let path = e.path();
                path.is_file() && path.extension().and_then(|x| x.to_str()) == Some("json")
            })
        })
        .unwrap_or(false)
}

/// Recovers the metric a prompt was written for from its wording.
///
/// This is a best-effort match on phrases unique to each built-in prompt.
pub fn identify_metric_from_prompt(prompt: &str) -> &'static str {
    const PATTERNS: &[(&str, &[&str])] = &[
        (
            TASK_EXECUTION_CONSISTENCY,
            &["list all function names", "list all exported function"],
        ),
        (CODE_BEHAVIOR_COMPREHENSION, &["explain what the code does"]),
        (
            CROSS_FILE_NAVIGATION,
            &[
                "trace the dependencies",
                "trace the complete dependency chain",
                "trace its dependencies",
            ],
        ),
        (
            IDENTIFIER_INTERPRETABILITY,
            &["interpret what the identifier", "interpret what each identifier"],
        ),
        (
            DOCUMENTATION_ACCURACY_DETECTION,
            &[
                "review the documentation",
                "identify any inaccuracies",
                "documentation accuracy",
            ],
        ),
    ];

    let lower = prompt.to_lowercase();
    PATTERNS
        .iter()
        .find(|(_, phrases)| phrases.iter().any(|p| lower.contains(p)))
        .map(|(id, _)| *id)
        .unwrap_or(UNKNOWN_METRIC)
}

/// Serves captured responses in call order, per metric.
pub struct ReplayExecutor {
    responses: HashMap<String, DebugResponse>,
    next_index: Mutex<HashMap<&'static str, usize>>,
}

impl ReplayExecutor {
    pub fn new(responses: HashMap<String, DebugResponse>) -> Self {
        Self {
            responses,
            next_index: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_dir(debug_dir: &Path) -> Result<Self, ReplayError> {
        Ok(Self::new(load_responses(debug_dir)?))
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    fn next_key(&self, metric_id: &'static str) -> String {
        let mut counters = lock(&self.next_index);
        let slot = counters.entry(metric_id).or_insert(0);
        let index = *slot;
        *slot += 1;
        response_key(metric_id, index)
    }
}

#[async_trait]
impl PromptExecutor for ReplayExecutor {
    async fn execute_prompt(
        &self,
        _cancel: &CancellationToken,
        _work_dir: &Path,
        prompt: &str,
        _tools: &str,
        _timeout: Duration,
    ) -> Result<String, PromptError> {
        let key = self.next_key(identify_metric_from_prompt(prompt));
        let captured = self
            .responses
            .get(&key)
            .ok_or_else(|| PromptError::ReplayMissing(key.clone()))?;
        match &captured.error {
            Some(error) => Err(PromptError::Replayed(error.clone())),
            None => Ok(captured.response.clone()),
        }
    }
}
