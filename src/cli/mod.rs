//! Command-line interface for ars.
//!
//! Provides commands for probing the agent CLI, listing the task and metric
//! catalogs, and running evaluations.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli};
