//! Error types for agent-readiness operations.
//!
//! Defines error types for the major subsystems:
//! - Subprocess execution against the agent CLI
//! - CLI output parsing
//! - LLM-as-judge evaluation
//! - Prompt execution (live and replay)
//! - Capture/replay persistence
//! - Workspace isolation
//! - Analysis target loading
//! - Evaluation sessions

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::agent::TaskStatus;

/// Errors raised by a [`CommandRunner`](crate::agent::CommandRunner).
///
/// Variants that observed a running process carry its combined output so
/// callers can embed a preview in their own messages.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{program} not found")]
    NotFound { program: String },

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("exit code {code}: {output}")]
    Exit { code: i32, output: String },

    #[error("process terminated by signal: {output}")]
    Signaled { output: String },

    #[error("command cancelled")]
    Cancelled { output: String },

    #[error("command timed out after {timeout:?}")]
    TimedOut { timeout: Duration, output: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CommandError {
    /// Combined output captured before the failure, if any.
    pub fn output(&self) -> &str {
        match self {
            CommandError::Exit { output, .. }
            | CommandError::Signaled { output }
            | CommandError::Cancelled { output }
            | CommandError::TimedOut { output, .. } => output,
            _ => "",
        }
    }

    /// Returns true when the failure was caused by a deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, CommandError::TimedOut { .. })
    }
}

/// Errors from decoding the CLI's JSON envelope.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty output")]
    Empty,

    #[error("invalid JSON: {message} (got: {preview})")]
    InvalidJson { message: String, preview: String },
}

/// Errors from the LLM judge.
#[derive(Debug, Error)]
pub enum EvaluatorError {
    #[error("evaluation cancelled")]
    Cancelled,

    #[error("evaluation timed out after {0:?}")]
    TimedOut(Duration),

    #[error("CLI execution failed: {source} (output: {preview})")]
    Execution {
        #[source]
        source: CommandError,
        preview: String,
    },

    #[error("failed to parse CLI response: {message} (got: {preview})")]
    Parse { message: String, preview: String },

    #[error("CLI response has no structured_output (got: {preview})")]
    MissingStructuredOutput { preview: String },

    #[error("score out of range (1-10): {0}")]
    ScoreOutOfRange(i32),

    #[error("evaluation failed after retry: {0}")]
    AfterRetry(Box<EvaluatorError>),
}

impl EvaluatorError {
    /// Returns true for the cancellation error, including when wrapped by a retry.
    pub fn is_cancelled(&self) -> bool {
        match self {
            EvaluatorError::Cancelled => true,
            EvaluatorError::AfterRetry(inner) => inner.is_cancelled(),
            _ => false,
        }
    }
}

/// Errors returned by a [`PromptExecutor`](crate::metrics::PromptExecutor).
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("execution failed: {0}")]
    Execution(String),

    #[error("execution status: {0}")]
    Status(TaskStatus),

    #[error("task timed out after {0:?}")]
    TimedOut(Duration),

    #[error("no replay data for {0}")]
    ReplayMissing(String),

    #[error("replayed error: {0}")]
    Replayed(String),
}

/// Errors from saving or loading captured responses.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("failed to create debug dir {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from creating or removing an isolated workspace.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("git {command} failed: {output}")]
    Git { command: String, output: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from loading analysis targets off disk.
#[derive(Debug, Error)]
pub enum TargetError {
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that abort an evaluation session before any metric runs.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to load analysis targets: {0}")]
    Target(#[from] TargetError),

    #[error("failed to load captured responses: {0}")]
    Replay(#[from] ReplayError),
}
