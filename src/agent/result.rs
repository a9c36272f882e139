//! Outcomes of single task executions against the agent CLI.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classification of one task execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// The CLI exited cleanly and its JSON envelope parsed.
    Completed,
    /// The task deadline elapsed before the CLI finished.
    Timeout,
    /// The CLI failed or produced unusable output.
    Error,
    /// The CLI executable could not be located.
    CliNotFound,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Completed => "completed",
            TaskStatus::Timeout => "timeout",
            TaskStatus::Error => "error",
            TaskStatus::CliNotFound => "cli_not_found",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of executing one [`Task`](super::Task).
///
/// `error` is only populated for non-completed statuses; `response` and
/// `session_id` only for completed ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub status: TaskStatus,
    pub response: String,
    /// Opaque session identifier echoed back by the CLI.
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration: Duration,
    pub error: Option<String>,
}

impl TaskResult {
    /// Creates a completed result.
    pub fn completed(
        task_id: impl Into<String>,
        started_at: DateTime<Utc>,
        duration: Duration,
        response: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Completed,
            response: response.into(),
            session_id: session_id.into(),
            started_at,
            completed_at: end_of(started_at, duration),
            duration,
            error: None,
        }
    }

    /// Creates a non-completed result carrying an error message.
    pub fn failed(
        task_id: impl Into<String>,
        status: TaskStatus,
        started_at: DateTime<Utc>,
        duration: Duration,
        error: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            status,
            response: String::new(),
            session_id: String::new(),
            started_at,
            completed_at: end_of(started_at, duration),
            duration,
            error: Some(error.into()),
        }
    }

    /// Returns true if the task completed.
    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

fn end_of(started_at: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    started_at + chrono::Duration::from_std(duration).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display_matches_serde() {
        for status in [
            TaskStatus::Completed,
            TaskStatus::Timeout,
            TaskStatus::Error,
            TaskStatus::CliNotFound,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status));
        }
    }

    #[test]
    fn test_completed_result() {
        let start = Utc::now();
        let result = TaskResult::completed("t1", start, Duration::from_secs(3), "ok", "sess");
        assert!(result.is_success());
        assert!(result.error.is_none());
        assert_eq!(result.completed_at - result.started_at, chrono::Duration::seconds(3));
    }

    #[test]
    fn test_failed_result() {
        let result = TaskResult::failed(
            "t1",
            TaskStatus::Timeout,
            Utc::now(),
            Duration::from_secs(1),
            "task timed out after 1 seconds",
        );
        assert!(!result.is_success());
        assert!(result.response.is_empty());
        assert_eq!(result.error.as_deref(), Some("task timed out after 1 seconds"));
    }
}
