//! Subprocess seam for the agent CLI.
//!
//! Every call to the external CLI goes through [`CommandRunner`], so the
//! executor and the judge can be exercised with deterministic stubs. The real
//! implementation, [`ProcessRunner`], shuts children down in two phases: an
//! interrupt signal first, then a hard kill once the grace period runs out.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::CommandError;
use crate::utils::lock;

/// Default time a child gets to exit after the interrupt signal.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// A program, its arguments, and the directory it runs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub dir: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Value following `flag`, if present.
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }
}

/// Runs an invocation to completion and returns its combined output.
///
/// Combined output is stdout and stderr merged into one buffer in the order
/// the chunks arrived. Ordering between the two streams is only as precise as
/// pipe delivery.
///
/// Implementations must honour `cancel`: once it fires, the process is
/// stopped and the call returns [`CommandError::Cancelled`].
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        cancel: &CancellationToken,
        invocation: &Invocation,
    ) -> Result<Vec<u8>, CommandError>;
}

/// Runs real subprocesses via `tokio::process`.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    grace_period: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Interrupt, wait out the grace period, then kill.
    async fn shutdown(&self, child: &mut Child, program: &str) -> std::io::Result<ExitStatus> {
        if send_interrupt(child) {
            match tokio::time::timeout(self.grace_period, child.wait()).await {
                Ok(status) => return status,
                Err(_) => {
                    warn!(
                        program,
                        grace_secs = self.grace_period.as_secs(),
                        "Process ignored interrupt, killing"
                    );
                }
            }
        }
        child.start_kill()?;
        child.wait().await
    }

    /// Waits for a reader to drain its pipe.
    async fn drain(&self, handle: Option<JoinHandle<()>>) {
        let Some(handle) = handle else {
            return;
        };
        // Grandchildren may keep the pipe open after the child exits.
        let abort = handle.abort_handle();
        if tokio::time::timeout(self.grace_period, handle).await.is_err() {
            debug!("Output pipe still open after grace period, abandoning reader");
            abort.abort();
        }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        cancel: &CancellationToken,
        invocation: &Invocation,
    ) -> Result<Vec<u8>, CommandError> {
        if cancel.is_cancelled() {
            return Err(CommandError::Cancelled {
                output: String::new(),
            });
        }

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &invocation.dir {
            cmd.current_dir(dir);
        }

        debug!(program = %invocation.program, args = invocation.args.len(), "Spawning process");

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CommandError::NotFound {
                    program: invocation.program.clone(),
                }
            } else {
                CommandError::Spawn {
                    program: invocation.program.clone(),
                    source: e,
                }
            }
        })?;

        let sink: OutputSink = Arc::new(Mutex::new(Vec::new()));
        let stdout = child
            .stdout
            .take()
            .map(|pipe| spawn_reader(pipe, "stdout", sink.clone()));
        let stderr = child
            .stderr
            .take()
            .map(|pipe| spawn_reader(pipe, "stderr", sink.clone()));

        let (status, cancelled) = tokio::select! {
            status = child.wait() => (status?, false),
            _ = cancel.cancelled() => {
                debug!(program = %invocation.program, "Cancellation requested, interrupting process");
                (self.shutdown(&mut child, &invocation.program).await?, true)
            }
        };

        self.drain(stdout).await;
        self.drain(stderr).await;
        let output = std::mem::take(&mut *lock(&sink));
        let text = String::from_utf8_lossy(&output).into_owned();

        if cancelled {
            return Err(CommandError::Cancelled { output: text });
        }
        if status.success() {
            return Ok(output);
        }
        match status.code() {
            Some(code) => Err(CommandError::Exit { code, output: text }),
            None => Err(CommandError::Signaled { output: text }),
        }
    }
}

/// Output shared by the stdout and stderr readers.
type OutputSink = Arc<Mutex<Vec<u8>>>;

/// Copies `reader` into `sink` chunk by chunk until EOF or a read error.
fn spawn_reader<R>(mut reader: R, stream: &'static str, sink: OutputSink) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = [0u8; 8192];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => lock(&sink).extend_from_slice(&chunk[..n]),
                Err(e) => {
                    warn!(stream, error = %e, "Failed to read process output");
                    break;
                }
            }
        }
    })
}

#[cfg(unix)]
fn send_interrupt(child: &Child) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match child.id() {
        Some(pid) => kill(Pid::from_raw(pid as i32), Signal::SIGINT).is_ok(),
        None => false,
    }
}

#[cfg(not(unix))]
fn send_interrupt(_child: &Child) -> bool {
    false
}

/// Locates executables on the search path.
pub trait PathLookup: Send + Sync {
    fn look_path(&self, name: &str) -> Option<PathBuf>;
}

/// [`PathLookup`] over the process `PATH`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPath;

impl PathLookup for SystemPath {
    fn look_path(&self, name: &str) -> Option<PathBuf> {
        let candidate = Path::new(name);
        if candidate.components().count() > 1 {
            return is_executable(candidate).then(|| candidate.to_path_buf());
        }
        let paths = std::env::var_os("PATH")?;
        std::env::split_paths(&paths)
            .map(|dir| dir.join(name))
            .find(|path| is_executable(path))
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file() || path.with_extension("exe").is_file()
}
