//! Evaluation configuration.
//!
//! Settings for the agent CLI invocation, timeouts, retry backoff, progress
//! rendering and cost estimation. Values come from defaults, an optional YAML
//! file, `ARS_*` environment variables, and finally CLI flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// The YAML configuration file could not be parsed.
    #[error("Invalid config file {path}: {message}")]
    InvalidFile { path: PathBuf, message: String },

    /// IO error while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration for an evaluation session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Name or path of the agent CLI executable.
    pub cli_binary: String,
    /// Fallback timeout for catalog tasks that declare none.
    pub task_timeout_secs: u64,
    /// Timeout for a single judge call.
    pub evaluator_timeout_secs: u64,
    /// Timeout for the `--version` probe.
    pub probe_timeout_secs: u64,
    /// Time between the interrupt signal and a hard kill.
    pub grace_period_secs: u64,
    /// Pause before the judge's single retry.
    pub retry_backoff_millis: u64,
    /// Refresh interval of the progress line.
    pub progress_interval_millis: u64,
    /// Blended price used for cost estimates, in USD per million tokens.
    pub cost_per_million_tokens: f64,
    /// Directory for captured responses. Existing captures switch evaluation to replay.
    pub debug_dir: Option<PathBuf>,
    /// Run metrics one after another instead of concurrently.
    pub sequential: bool,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            cli_binary: "claude".to_string(),
            task_timeout_secs: 300,
            evaluator_timeout_secs: 60,
            probe_timeout_secs: 5,
            grace_period_secs: 10,
            retry_backoff_millis: 2000,
            progress_interval_millis: 200,
            cost_per_million_tokens: 5.0,
            debug_dir: None,
            sequential: false,
        }
    }
}

impl EvalConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a YAML file. Missing keys keep their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|e| ConfigError::InvalidFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Creates configuration from environment variables over the defaults.
    ///
    /// # Environment Variables
    ///
    /// - `ARS_CLI_BINARY`: Agent CLI executable (default: claude)
    /// - `ARS_TASK_TIMEOUT_SECS`: Fallback task timeout (default: 300)
    /// - `ARS_EVALUATOR_TIMEOUT_SECS`: Judge call timeout (default: 60)
    /// - `ARS_PROBE_TIMEOUT_SECS`: CLI version probe timeout (default: 5)
    /// - `ARS_GRACE_PERIOD_SECS`: Interrupt-to-kill grace period (default: 10)
    /// - `ARS_RETRY_BACKOFF_MILLIS`: Judge retry backoff (default: 2000)
    /// - `ARS_PROGRESS_INTERVAL_MILLIS`: Progress refresh interval (default: 200)
    /// - `ARS_COST_PER_MTOK`: USD per million tokens (default: 5.0)
    /// - `ARS_DEBUG_DIR`: Capture/replay directory (default: unset)
    /// - `ARS_SEQUENTIAL`: Run metrics sequentially (default: false)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set to an unparseable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().merge_env()
    }

    /// Applies `ARS_*` environment overrides on top of `self`.
    pub fn merge_env(mut self) -> Result<Self, ConfigError> {
        if let Ok(val) = std::env::var("ARS_CLI_BINARY") {
            self.cli_binary = val;
        }
        if let Ok(val) = std::env::var("ARS_TASK_TIMEOUT_SECS") {
            self.task_timeout_secs = parse_env_value(&val, "ARS_TASK_TIMEOUT_SECS")?;
        }
        if let Ok(val) = std::env::var("ARS_EVALUATOR_TIMEOUT_SECS") {
            self.evaluator_timeout_secs = parse_env_value(&val, "ARS_EVALUATOR_TIMEOUT_SECS")?;
        }
        if let Ok(val) = std::env::var("ARS_PROBE_TIMEOUT_SECS") {
            self.probe_timeout_secs = parse_env_value(&val, "ARS_PROBE_TIMEOUT_SECS")?;
        }
        if let Ok(val) = std::env::var("ARS_GRACE_PERIOD_SECS") {
            self.grace_period_secs = parse_env_value(&val, "ARS_GRACE_PERIOD_SECS")?;
        }
        if let Ok(val) = std::env::var("ARS_RETRY_BACKOFF_MILLIS") {
            self.retry_backoff_millis = parse_env_value(&val, "ARS_RETRY_BACKOFF_MILLIS")?;
        }
        if let Ok(val) = std::env::var("ARS_PROGRESS_INTERVAL_MILLIS") {
            self.progress_interval_millis =
                parse_env_value(&val, "ARS_PROGRESS_INTERVAL_MILLIS")?;
        }
        if let Ok(val) = std::env::var("ARS_COST_PER_MTOK") {
            self.cost_per_million_tokens = parse_env_value(&val, "ARS_COST_PER_MTOK")?;
        }
        if let Ok(val) = std::env::var("ARS_DEBUG_DIR") {
            if !val.trim().is_empty() {
                self.debug_dir = Some(PathBuf::from(val));
            }
        }
        if let Ok(val) = std::env::var("ARS_SEQUENTIAL") {
            self.sequential = parse_env_bool(&val, "ARS_SEQUENTIAL")?;
        }
        Ok(self)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cli_binary.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "cli_binary must not be empty".to_string(),
            ));
        }
        for (name, value) in [
            ("task_timeout_secs", self.task_timeout_secs),
            ("evaluator_timeout_secs", self.evaluator_timeout_secs),
            ("probe_timeout_secs", self.probe_timeout_secs),
            ("progress_interval_millis", self.progress_interval_millis),
        ] {
            if value == 0 {
                return Err(ConfigError::ValidationFailed(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }
        if !self.cost_per_million_tokens.is_finite() || self.cost_per_million_tokens < 0.0 {
            return Err(ConfigError::ValidationFailed(
                "cost_per_million_tokens must be a non-negative number".to_string(),
            ));
        }
        Ok(())
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    pub fn evaluator_timeout(&self) -> Duration {
        Duration::from_secs(self.evaluator_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_millis)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_millis)
    }

    /// Estimated cost in USD for the given token count.
    pub fn estimate_cost(&self, tokens: u64) -> f64 {
        tokens as f64 / 1_000_000.0 * self.cost_per_million_tokens
    }
}

/// Parses an environment variable value into the target type.
fn parse_env_value<T: std::str::FromStr>(val: &str, key: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    val.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}

/// Parses a boolean environment variable value.
fn parse_env_bool(val: &str, key: &str) -> Result<bool, ConfigError> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean, got '{}'", val),
        }),
    }
}
