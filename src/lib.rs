//! agent-readiness: measures how well a coding agent works inside a codebase.
//!
//! The crate drives an agent CLI against a project, scores its answers with
//! five heuristic metrics and an LLM judge, and reports a weighted result.

pub mod agent;
pub mod cli;
pub mod config;
pub mod error;
pub mod metrics;
pub mod target;
pub mod utils;

pub use config::{ConfigError, EvalConfig};
pub use error::{
    CommandError, EvaluatorError, ParseError, PromptError, ReplayError, SessionError,
    TargetError, WorkspaceError,
};
