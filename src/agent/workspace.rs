//! Isolated checkout for agent runs.
//!
//! Agents run with file tools, so evaluation happens in a detached git
//! worktree of `HEAD` when the project is a git repository. Anything else
//! falls back to the project directory itself.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::command::{CommandRunner, Invocation, ProcessRunner};
use crate::error::WorkspaceError;
use crate::utils::preview;

const WORKTREE_PREFIX: &str = "ars-worktree-";

pub struct Workspace {
    path: PathBuf,
    project_dir: PathBuf,
    worktree: Option<TempDir>,
    runner: Arc<dyn CommandRunner>,
}

impl Workspace {
    /// Creates a worktree for `project_dir`, or falls back to it directly.
    pub async fn create(project_dir: &Path) -> Self {
        Self::create_with_runner(project_dir, Arc::new(ProcessRunner::new())).await
    }

    pub async fn create_with_runner(project_dir: &Path, runner: Arc<dyn CommandRunner>) -> Self {
        let mut workspace = Self {
            path: project_dir.to_path_buf(),
            project_dir: project_dir.to_path_buf(),
            worktree: None,
            runner,
        };

        if !project_dir.join(".git").exists() {
            debug!(dir = %project_dir.display(), "Not a git repository, using project dir");
            return workspace;
        }

        match workspace.add_worktree().await {
            Ok(tmp) => {
                info!(worktree = %tmp.path().display(), "Created isolated worktree");
                workspace.path = tmp.path().to_path_buf();
                workspace.worktree = Some(tmp);
            }
            Err(e) => {
                warn!(error = %e, dir = %project_dir.display(), "Worktree unavailable, using project dir");
            }
        }
        workspace
    }

    async fn add_worktree(&self) -> Result<TempDir, WorkspaceError> {
        let tmp = tempfile::Builder::new().prefix(WORKTREE_PREFIX).tempdir()?;
        let target = tmp.path().to_string_lossy().into_owned();
        self.git(&["worktree", "add", &target, "HEAD", "--detach"]).await?;
        Ok(tmp)
    }

    async fn git(&self, args: &[&str]) -> Result<(), WorkspaceError> {
        let invocation = Invocation::new("git")
            .args(args.iter().copied())
            .current_dir(&self.project_dir);
        self.runner
            .run(&CancellationToken::new(), &invocation)
            .await
            .map(|_| ())
            .map_err(|e| {
                let output = if e.output().is_empty() {
                    e.to_string()
                } else {
                    preview(e.output().trim())
                };
                WorkspaceError::Git {
                    command: args.iter().take(2).copied().collect::<Vec<_>>().join(" "),
                    output,
                }
            })
    }

    /// Directory the agent should run in.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// True when running in a separate worktree.
    pub fn is_isolated(&self) -> bool {
        self.worktree.is_some()
    }

    /// Removes the worktree and its temp dir. A no-op for the fallback.
    ///
    /// The temp dir is removed even when git refuses to drop the worktree.
    pub async fn cleanup(mut self) -> Result<(), WorkspaceError> {
        let Some(tmp) = self.worktree.take() else {
            return Ok(());
        };
        let target = tmp.path().to_string_lossy().into_owned();
        let removed = self.git(&["worktree", "remove", "--force", &target]).await;

        if tmp.path().exists() {
            tmp.close()?;
        }
        debug!(worktree = %target, "Removed worktree");
        removed
    }
}
