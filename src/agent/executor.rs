//! Bounded task execution against the agent CLI.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::cli::DEFAULT_CLI_BINARY;
use super::command::{CommandRunner, Invocation, PathLookup, ProcessRunner, SystemPath};
use super::result::{TaskResult, TaskStatus};
use super::tasks::Task;
use crate::error::{CommandError, ParseError};
use crate::utils::{preview_bytes, run_with_deadline};

/// Envelope printed by the CLI with `--output-format json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliResponse {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub result: String,
}

/// Decodes the CLI's JSON envelope.
pub fn parse_json_output(output: &[u8]) -> Result<CliResponse, ParseError> {
    if output.is_empty() {
        return Err(ParseError::Empty);
    }
    serde_json::from_slice(output).map_err(|e| ParseError::InvalidJson {
        message: e.to_string(),
        preview: preview_bytes(output),
    })
}

/// Runs [`Task`]s through the CLI inside a working directory.
///
/// Never fails: every outcome is encoded in the returned [`TaskResult`].
#[derive(Clone)]
pub struct Executor {
    binary: String,
    work_dir: PathBuf,
    runner: Arc<dyn CommandRunner>,
    lookup: Arc<dyn PathLookup>,
}

impl Executor {
    pub fn new(work_dir: impl AsRef<Path>) -> Self {
        Self {
            binary: DEFAULT_CLI_BINARY.to_string(),
            work_dir: work_dir.as_ref().to_path_buf(),
            runner: Arc::new(ProcessRunner::new()),
            lookup: Arc::new(SystemPath),
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

    pub fn with_lookup(mut self, lookup: Arc<dyn PathLookup>) -> Self {
        self.lookup = lookup;
        self
    }

    pub fn with_work_dir(mut self, work_dir: impl AsRef<Path>) -> Self {
        self.work_dir = work_dir.as_ref().to_path_buf();
        self
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Builds the CLI invocation for `task`.
    pub fn invocation(&self, task: &Task) -> Invocation {
        let mut invocation = Invocation::new(&self.binary)
            .args(["-p", task.prompt.as_str(), "--output-format", "json"])
            .current_dir(&self.work_dir);
        if !task.tools_allowed.is_empty() {
            invocation = invocation.args(["--allowedTools", task.tools_allowed.as_str()]);
        }
        invocation
    }

    /// Executes one task under its timeout and classifies the outcome.
    pub async fn execute_task(&self, cancel: &CancellationToken, task: &Task) -> TaskResult {
        let started_at = Utc::now();
        let clock = Instant::now();
        let timeout_secs = task.effective_timeout_secs();
        let invocation = self.invocation(task);

        debug!(task_id = %task.id, timeout_secs, dir = %self.work_dir.display(), "Executing task");

        let runner = self.runner.clone();
        let outcome = run_with_deadline(cancel, Duration::from_secs(timeout_secs), |token| {
            let invocation = &invocation;
            async move { runner.run(&token, invocation).await }
        })
        .await;
        let duration = clock.elapsed();

        let output = match outcome.value {
            Ok(output) => output,
            Err(_) if outcome.timed_out => {
                warn!(task_id = %task.id, timeout_secs, "Task timed out");
                return TaskResult::failed(
                    &task.id,
                    TaskStatus::Timeout,
                    started_at,
                    duration,
                    format!("task timed out after {} seconds", timeout_secs),
                );
            }
            Err(err) => return self.classify_failure(task, err, started_at, duration),
        };

        match parse_json_output(&output) {
            Ok(parsed) => {
                info!(task_id = %task.id, duration_ms = duration.as_millis() as u64, "Task completed");
                TaskResult::completed(&task.id, started_at, duration, parsed.result, parsed.session_id)
            }
            Err(e) => TaskResult::failed(
                &task.id,
                TaskStatus::Error,
                started_at,
                duration,
                format!("failed to parse CLI output: {}", e),
            ),
        }
    }

    fn classify_failure(
        &self,
        task: &Task,
        err: CommandError,
        started_at: chrono::DateTime<Utc>,
        duration: Duration,
    ) -> TaskResult {
        if let CommandError::Exit { code, output } = &err {
            return TaskResult::failed(
                &task.id,
                TaskStatus::Error,
                started_at,
                duration,
                format!("exit code {}: {}", code, output),
            );
        }
        // Looked up again here, not cached: the CLI may have been removed mid-run.
        if self.lookup.look_path(&self.binary).is_none() {
            return TaskResult::failed(
                &task.id,
                TaskStatus::CliNotFound,
                started_at,
                duration,
                format!("{} CLI not found", self.binary),
            );
        }
        TaskResult::failed(&task.id, TaskStatus::Error, started_at, duration, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replies with a fixed result and records the invocation.
    struct ScriptedRunner {
        reply: Mutex<Option<Result<Vec<u8>, CommandError>>>,
        hang: bool,
        seen: Mutex<Vec<Invocation>>,
    }

    impl ScriptedRunner {
        fn replying(reply: Result<Vec<u8>, CommandError>) -> Self {
            Self {
                reply: Mutex::new(Some(reply)),
                hang: false,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn hanging() -> Self {
            Self {
                reply: Mutex::new(None),
                hang: true,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(
            &self,
            cancel: &CancellationToken,
            invocation: &Invocation,
        ) -> Result<Vec<u8>, CommandError> {
            self.seen.lock().unwrap().push(invocation.clone());
            if self.hang {
                cancel.cancelled().await;
                return Err(CommandError::Cancelled {
                    output: "partial".to_string(),
                });
            }
            self.reply.lock().unwrap().take().unwrap()
        }
    }

    struct FixedLookup(Option<PathBuf>, AtomicUsize);

    impl PathLookup for FixedLookup {
        fn look_path(&self, _name: &str) -> Option<PathBuf> {
            self.1.fetch_add(1, Ordering::SeqCst);
            self.0.clone()
        }
    }

    fn executor(runner: Arc<ScriptedRunner>, found: bool) -> Executor {
        let path = found.then(|| PathBuf::from("/usr/bin/claude"));
        Executor::new("/work")
            .with_runner(runner)
            .with_lookup(Arc::new(FixedLookup(path, AtomicUsize::new(0))))
    }

    fn task() -> Task {
        Task::new("t1", "Test", "do it").with_tools("Read").with_timeout_seconds(30)
    }

    #[test]
    fn test_parse_json_output_ok() {
        let parsed =
            parse_json_output(br#"{"type":"result","session_id":"abc","result":"done"}"#).unwrap();
        assert_eq!(parsed.kind, "result");
        assert_eq!(parsed.session_id, "abc");
        assert_eq!(parsed.result, "done");
    }

    #[test]
    fn test_parse_json_output_failures_are_distinguishable() {
        assert_eq!(parse_json_output(b"").unwrap_err(), ParseError::Empty);

        let plain = parse_json_output(b"this is not json").unwrap_err();
        let truncated = parse_json_output(br#"{"type":"result","res"#).unwrap_err();
        let html = parse_json_output(b"<html><body>502 Bad Gateway</body></html>").unwrap_err();

        for err in [&plain, &truncated, &html] {
            assert!(matches!(err, ParseError::InvalidJson { .. }));
        }
        assert_ne!(plain.to_string(), truncated.to_string());
        assert_ne!(truncated.to_string(), html.to_string());
        assert!(html.to_string().contains("502 Bad Gateway"));
    }

    #[test]
    fn test_parse_json_output_preview_is_bounded() {
        let junk = "z".repeat(1000);
        let err = parse_json_output(junk.as_bytes()).unwrap_err();
        match err {
            ParseError::InvalidJson { preview, .. } => {
                assert_eq!(preview.len(), 203);
                assert!(preview.ends_with("..."));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_invocation_flags() {
        let exec = Executor::new("/work");
        let inv = exec.invocation(&task());
        assert_eq!(inv.program, "claude");
        assert_eq!(inv.flag_value("-p"), Some("do it"));
        assert_eq!(inv.flag_value("--output-format"), Some("json"));
        assert_eq!(inv.flag_value("--allowedTools"), Some("Read"));
        assert_eq!(inv.dir.as_deref(), Some(Path::new("/work")));

        let bare = exec.invocation(&Task::new("t2", "T", "p"));
        assert!(!bare.args.iter().any(|a| a == "--allowedTools"));
    }

    #[tokio::test]
    async fn test_execute_completed() {
        let runner = Arc::new(ScriptedRunner::replying(Ok(
            br#"{"type":"result","session_id":"s-1","result":"answer"}"#.to_vec(),
        )));
        let result = executor(runner.clone(), true)
            .execute_task(&CancellationToken::new(), &task())
            .await;

        assert_eq!(result.status, TaskStatus::Completed);
        assert_eq!(result.response, "answer");
        assert_eq!(result.session_id, "s-1");
        assert!(result.error.is_none());
        assert_eq!(runner.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_execute_exit_code() {
        let runner = Arc::new(ScriptedRunner::replying(Err(CommandError::Exit {
            code: 2,
            output: "rate limited".to_string(),
        })));
        let result = executor(runner, true)
            .execute_task(&CancellationToken::new(), &task())
            .await;
        assert_eq!(result.status, TaskStatus::Error);
        assert_eq!(result.error.as_deref(), Some("exit code 2: rate limited"));
    }

    #[tokio::test]
    async fn test_execute_cli_not_found() {
        let runner = Arc::new(ScriptedRunner::replying(Err(CommandError::NotFound {
            program: "claude".to_string(),
        })));
        let result = executor(runner, false)
            .execute_task(&CancellationToken::new(), &task())
            .await;
        assert_eq!(result.status, TaskStatus::CliNotFound);
        assert_eq!(result.error.as_deref(), Some("claude CLI not found"));
    }

    #[tokio::test]
    async fn test_execute_other_error_when_cli_present() {
        let runner = Arc::new(ScriptedRunner::replying(Err(CommandError::Signaled {
            output: String::new(),
        })));
        let result = executor(runner, true)
            .execute_task(&CancellationToken::new(), &task())
            .await;
        assert_eq!(result.status, TaskStatus::Error);
    }

    #[tokio::test]
    async fn test_execute_parse_failure() {
        let runner = Arc::new(ScriptedRunner::replying(Ok(b"not json at all".to_vec())));
        let result = executor(runner, true)
            .execute_task(&CancellationToken::new(), &task())
            .await;
        assert_eq!(result.status, TaskStatus::Error);
        let error = result.error.unwrap();
        assert!(error.starts_with("failed to parse CLI output: invalid JSON"));
        assert!(error.contains("not json at all"));
    }

    #[tokio::test]
    async fn test_execute_timeout() {
        let runner = Arc::new(ScriptedRunner::hanging());
        let task = Task::new("slow", "Slow", "wait").with_timeout_seconds(1);
        let result = executor(runner, true)
            .execute_task(&CancellationToken::new(), &task)
            .await;
        assert_eq!(result.status, TaskStatus::Timeout);
        assert_eq!(result.error.as_deref(), Some("task timed out after 1 seconds"));
    }

    #[tokio::test]
    async fn test_execute_parent_cancel_is_error_not_timeout() {
        let runner = Arc::new(ScriptedRunner::hanging());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = executor(runner, true).execute_task(&cancel, &task()).await;
        assert_eq!(result.status, TaskStatus::Error);
        assert_eq!(result.error.as_deref(), Some("command cancelled"));
    }
}
