//! Agent CLI availability probe.
//!
//! [`CliProbe::detect`] answers "is the CLI installed and responsive" within a
//! bounded time. [`CliStatusCache`] memoizes the answer so the probe runs at
//! most once until [`CliStatusCache::reset`] is called.

use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::command::{CommandRunner, Invocation, PathLookup, ProcessRunner, SystemPath};
use crate::utils::run_with_deadline;

/// Remediation shown whenever the CLI cannot be used.
pub const INSTALL_HINT: &str = "Claude CLI not found. Install using one of:
  curl -fsSL https://claude.ai/install.sh | bash
  brew install --cask claude-code
  npm install -g @anthropic-ai/claude-code";

/// Default bound on the `--version` check.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default CLI executable name.
pub const DEFAULT_CLI_BINARY: &str = "claude";

/// Result of probing for the agent CLI.
///
/// Either `available` with a `version`, or unavailable with `error` and
/// `install_hint`. Never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliStatus {
    pub available: bool,
    pub version: String,
    pub error: String,
    pub install_hint: String,
}

impl CliStatus {
    pub fn available(version: impl Into<String>) -> Self {
        Self {
            available: true,
            version: version.into(),
            error: String::new(),
            install_hint: String::new(),
        }
    }

    pub fn unavailable(error: impl Into<String>) -> Self {
        Self {
            available: false,
            version: String::new(),
            error: error.into(),
            install_hint: INSTALL_HINT.to_string(),
        }
    }
}

/// Bounded-time CLI detection.
#[derive(Clone)]
pub struct CliProbe {
    binary: String,
    timeout: Duration,
    lookup: Arc<dyn PathLookup>,
    runner: Arc<dyn CommandRunner>,
}

impl CliProbe {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            timeout: DEFAULT_PROBE_TIMEOUT,
            lookup: Arc::new(SystemPath),
            runner: Arc::new(ProcessRunner::new()),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_lookup(mut self, lookup: Arc<dyn PathLookup>) -> Self {
        self.lookup = lookup;
        self
    }

    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Probes the CLI. A missing executable returns without spawning anything.
    pub async fn detect(&self) -> CliStatus {
        let Some(path) = self.lookup.look_path(&self.binary) else {
            debug!(binary = %self.binary, "CLI not found on PATH");
            return CliStatus::unavailable(format!("{} CLI not found in PATH", self.binary));
        };

        let invocation = Invocation::new(path.to_string_lossy()).arg("--version");
        let runner = self.runner.clone();
        let outcome = run_with_deadline(&CancellationToken::new(), self.timeout, |token| {
            let invocation = &invocation;
            async move { runner.run(&token, invocation).await }
        })
        .await;

        match outcome.value {
            Ok(output) => {
                let version = String::from_utf8_lossy(&output).trim().to_string();
                let version = if version.is_empty() {
                    "unknown".to_string()
                } else {
                    version
                };
                info!(binary = %self.binary, version = %version, "Agent CLI available");
                CliStatus::available(version)
            }
            Err(_) if outcome.timed_out => CliStatus::unavailable(format!(
                "timeout checking {} CLI version",
                self.binary
            )),
            Err(e) => CliStatus::unavailable(format!(
                "failed to get {} CLI version: {}",
                self.binary, e
            )),
        }
    }
}

/// Compute-once, resettable cache around a [`CliProbe`].
///
/// Concurrent first callers share a single probe.
pub struct CliStatusCache {
    probe: CliProbe,
    cell: Mutex<Arc<OnceCell<CliStatus>>>,
}

impl CliStatusCache {
    pub fn new(probe: CliProbe) -> Self {
        Self {
            probe,
            cell: Mutex::new(Arc::new(OnceCell::new())),
        }
    }

    /// Returns the cached status, probing on first use.
    pub async fn get(&self) -> CliStatus {
        let cell = self
            .cell
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        cell.get_or_init(|| self.probe.detect()).await.clone()
    }

    /// Drops the cached status so the next [`get`](Self::get) probes again.
    pub fn reset(&self) {
        *self.cell.lock().unwrap_or_else(|e| e.into_inner()) = Arc::new(OnceCell::new());
    }

    pub fn probe(&self) -> &CliProbe {
        &self.probe
    }
}

static GLOBAL_CACHE: OnceLock<CliStatusCache> = OnceLock::new();

/// Installs the probe used by the process-wide cache.
///
/// Returns false if the cache was already initialized; the first probe wins.
pub fn install_cli_probe(probe: CliProbe) -> bool {
    GLOBAL_CACHE.set(CliStatusCache::new(probe)).is_ok()
}

/// Process-wide cache, defaulting to [`DEFAULT_CLI_BINARY`].
pub fn cli_status_cache() -> &'static CliStatusCache {
    GLOBAL_CACHE.get_or_init(|| CliStatusCache::new(CliProbe::new(DEFAULT_CLI_BINARY)))
}

/// Cached CLI status for this process.
pub async fn get_cli_status() -> CliStatus {
    cli_status_cache().get().await
}

/// Forces the next [`get_cli_status`] to probe again. Safe before any probe.
pub fn reset_cli_cache() {
    cli_status_cache().reset();
}
