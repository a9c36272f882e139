//! LLM-as-judge through the agent CLI.
//!
//! The judge is asked for a schema-constrained `{score, reason}` verdict. The
//! schema is only a hint to the model, so the score range is still checked
//! here and an out-of-range score is an error, never clamped.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::cli::DEFAULT_CLI_BINARY;
use super::command::{CommandRunner, Invocation, ProcessRunner};
use crate::error::{CommandError, EvaluatorError};
use crate::utils::{preview_bytes, run_with_deadline};

/// Default bound on a single judge call.
pub const DEFAULT_EVALUATOR_TIMEOUT: Duration = Duration::from_secs(60);

/// Pause before the single retry.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(2);

/// Lowest and highest verdict the judge may return.
pub const MIN_JUDGE_SCORE: i32 = 1;
pub const MAX_JUDGE_SCORE: i32 = 10;

/// JSON schema passed with `--json-schema`.
pub const VERDICT_SCHEMA: &str = r#"{"type":"object","properties":{"score":{"type":"integer","minimum":1,"maximum":10},"reason":{"type":"string"}},"required":["score","reason"]}"#;

/// A judge verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub score: i32,
    pub reason: String,
}

/// Only `structured_output` of the CLI envelope is used.
#[derive(Debug, Deserialize)]
struct JudgeEnvelope {
    structured_output: Option<EvaluationResult>,
}

/// Scores free text against a rubric using the agent CLI.
#[derive(Clone)]
pub struct Evaluator {
    binary: String,
    timeout: Duration,
    retry_backoff: Duration,
    runner: Arc<dyn CommandRunner>,
}

impl Evaluator {
    /// Creates an evaluator; a zero timeout selects [`DEFAULT_EVALUATOR_TIMEOUT`].
    pub fn new(timeout: Duration) -> Self {
        Self {
            binary: DEFAULT_CLI_BINARY.to_string(),
            timeout: if timeout.is_zero() {
                DEFAULT_EVALUATOR_TIMEOUT
            } else {
                timeout
            },
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            runner: Arc::new(ProcessRunner::new()),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn invocation(&self, system_prompt: &str, content: &str) -> Invocation {
        Invocation::new(&self.binary).args([
            "-p",
            content,
            "--system-prompt",
            system_prompt,
            "--output-format",
            "json",
            "--json-schema",
            VERDICT_SCHEMA,
        ])
    }

    /// One judge call bounded by the evaluator timeout.
    pub async fn evaluate(
        &self,
        cancel: &CancellationToken,
        system_prompt: &str,
        content: &str,
    ) -> Result<EvaluationResult, EvaluatorError> {
        if cancel.is_cancelled() {
            return Err(EvaluatorError::Cancelled);
        }

        let invocation = self.invocation(system_prompt, content);
        let runner = self.runner.clone();
        let outcome = run_with_deadline(cancel, self.timeout, |token| {
            let invocation = &invocation;
            async move { runner.run(&token, invocation).await }
        })
        .await;

        let output = match outcome.value {
            Ok(output) => output,
            Err(_) if outcome.timed_out => return Err(EvaluatorError::TimedOut(self.timeout)),
            Err(CommandError::Cancelled { .. }) if cancel.is_cancelled() => {
                return Err(EvaluatorError::Cancelled)
            }
            Err(source) => {
                let preview = crate::utils::preview(source.output());
                return Err(EvaluatorError::Execution { source, preview });
            }
        };

        let envelope: JudgeEnvelope =
            serde_json::from_slice(&output).map_err(|e| EvaluatorError::Parse {
                message: e.to_string(),
                preview: preview_bytes(&output),
            })?;
        let verdict = envelope
            .structured_output
            .ok_or_else(|| EvaluatorError::MissingStructuredOutput {
                preview: preview_bytes(&output),
            })?;

        if !(MIN_JUDGE_SCORE..=MAX_JUDGE_SCORE).contains(&verdict.score) {
            return Err(EvaluatorError::ScoreOutOfRange(verdict.score));
        }
        debug!(score = verdict.score, "Judge verdict");
        Ok(verdict)
    }

    /// [`evaluate`](Self::evaluate) with one retry after a fixed backoff.
    ///
    /// Cancellation is never retried.
    pub async fn evaluate_with_retry(
        &self,
        cancel: &CancellationToken,
        system_prompt: &str,
        content: &str,
    ) -> Result<EvaluationResult, EvaluatorError> {
        let first = match self.evaluate(cancel, system_prompt, content).await {
            Ok(verdict) => return Ok(verdict),
            Err(e) => e,
        };
        if cancel.is_cancelled() {
            return Err(EvaluatorError::Cancelled);
        }

        warn!(error = %first, backoff_ms = self.retry_backoff.as_millis() as u64, "Judge call failed, retrying once");
        tokio::select! {
            _ = cancel.cancelled() => return Err(EvaluatorError::Cancelled),
            _ = tokio::time::sleep(self.retry_backoff) => {}
        }

        self.evaluate(cancel, system_prompt, content)
            .await
            .map_err(|e| EvaluatorError::AfterRetry(Box::new(e)))
    }
}
