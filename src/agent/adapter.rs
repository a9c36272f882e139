//! Live [`PromptExecutor`] backed by the coding-agent CLI.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::command::{CommandRunner, PathLookup};
use super::executor::Executor;
use super::result::TaskStatus;
use super::tasks::Task;
use crate::error::PromptError;
use crate::metrics::PromptExecutor;

const METRIC_TASK_ID: &str = "metric_eval";
const METRIC_TASK_NAME: &str = "Metric Evaluation";

/// Wraps each metric prompt in a one-off [`Task`] and runs it through an [`Executor`].
#[derive(Clone)]
pub struct CliExecutorAdapter {
    executor: Executor,
}

impl CliExecutorAdapter {
    /// `work_dir` is used whenever a caller passes an empty directory.
    pub fn new(work_dir: impl AsRef<Path>) -> Self {
        Self {
            executor: Executor::new(work_dir),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.executor = self.executor.with_binary(binary);
        self
    }

    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.executor = self.executor.with_runner(runner);
        self
    }

    pub fn with_lookup(mut self, lookup: Arc<dyn PathLookup>) -> Self {
        self.executor = self.executor.with_lookup(lookup);
        self
    }

    pub fn work_dir(&self) -> &Path {
        self.executor.work_dir()
    }
}

#[async_trait]
impl PromptExecutor for CliExecutorAdapter {
    async fn execute_prompt(
        &self,
        cancel: &CancellationToken,
        work_dir: &Path,
        prompt: &str,
        tools: &str,
        timeout: Duration,
    ) -> Result<String, PromptError> {
        let executor = if work_dir.as_os_str().is_empty() {
            self.executor.clone()
        } else {
            self.executor.clone().with_work_dir(work_dir)
        };

        let task = Task::new(METRIC_TASK_ID, METRIC_TASK_NAME, prompt)
            .with_tools(tools)
            .with_timeout_seconds(timeout.as_secs().max(1));
        let result = executor.execute_task(cancel, &task).await;

        match (result.status, result.error) {
            (TaskStatus::Completed, _) => Ok(result.response),
            (_, Some(error)) if !error.is_empty() => Err(PromptError::Execution(error)),
            (status, _) => Err(PromptError::Status(status)),
        }
    }
}
