//! Git Service
//!
//! Version-control probes and the change-set extractor. Every probe degrades to
//! `false`/`None`/empty when git is missing or a command exits non-zero.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::ChangeSet;
use crate::domain::ports::{CommandOutput, CommandRunner, CommandSpec};

/// Base revisions tried in order; remote references win over local ones.
pub const BASE_BRANCH_CANDIDATES: [&str; 4] = ["origin/main", "origin/master", "main", "master"];

pub struct GitService {
    runner: Arc<dyn CommandRunner>,
    git: String,
    fetch_before_detect: bool,
}

impl GitService {
    pub fn new(runner: Arc<dyn CommandRunner>, git: impl Into<String>) -> Self {
        Self {
            runner,
            git: git.into(),
            fetch_before_detect: false,
        }
    }

    /// Run `git fetch --all` before base-branch detection
    #[must_use]
    pub fn with_fetch_before_detect(mut self, enabled: bool) -> Self {
        self.fetch_before_detect = enabled;
        self
    }

    async fn git(&self, dir: &Path, args: &[&str]) -> DomainResult<CommandOutput> {
        let command = CommandSpec::new(&self.git)
            .args(args.iter().copied())
            .current_dir(dir);
        self.runner.run(&command).await
    }

    /// Run git and return trimmed stdout on success, `None` otherwise
    async fn git_stdout(&self, dir: &Path, args: &[&str]) -> Option<String> {
        match self.git(dir, args).await {
            Ok(output) if output.is_success() => output.stdout_trimmed().map(str::to_string),
            Ok(output) => {
                debug!(args = ?args, exit_code = ?output.exit_code, "git command failed");
                None
            }
            Err(e) => {
                debug!(args = ?args, error = %e, "git unavailable");
                None
            }
        }
    }

    pub async fn is_git_repo(&self, dir: &Path) -> bool {
        self.git_stdout(dir, &["rev-parse", "--is-inside-work-tree"])
            .await
            .is_some_and(|out| out == "true")
    }

    /// Top-level directory of the working tree
    pub async fn repo_root(&self, dir: &Path) -> Option<PathBuf> {
        self.git_stdout(dir, &["rev-parse", "--show-toplevel"])
            .await
            .map(PathBuf::from)
    }

    /// Current branch name; `None` outside a repository or on a detached HEAD
    pub async fn current_branch(&self, dir: &Path) -> Option<String> {
        self.git_stdout(dir, &["rev-parse", "--abbrev-ref", "HEAD"])
            .await
            .filter(|branch| branch != "HEAD")
    }

    /// Whether `name` resolves to a revision
    pub async fn resolve_ref(&self, dir: &Path, name: &str) -> bool {
        match self.git(dir, &["rev-parse", "--verify", "--quiet", name]).await {
            Ok(output) => output.is_success(),
            Err(_) => false,
        }
    }

    /// First base-branch candidate that resolves
    #[instrument(skip(self))]
    pub async fn detect_base_branch(&self, dir: &Path) -> Option<String> {
        if self.fetch_before_detect {
            match self.git(dir, &["fetch", "--all"]).await {
                Ok(output) if output.is_success() => debug!("fetched all remotes"),
                Ok(output) => warn!(stderr = %output.stderr.trim(), "git fetch failed"),
                Err(e) => warn!(error = %e, "git fetch failed"),
            }
        }

        for candidate in BASE_BRANCH_CANDIDATES {
            if self.resolve_ref(dir, candidate).await {
                info!(base = candidate, "detected base branch");
                return Some(candidate.to_string());
            }
        }
        None
    }

    /// Zero-context diff between `base` and the working tree
    pub async fn diff(&self, dir: &Path, base: &str) -> DomainResult<String> {
        let output = self
            .git(
                dir,
                &["diff", "--unified=0", "--no-color", "--no-ext-diff", base],
            )
            .await?;
        if !output.is_success() {
            return Err(DomainError::MalformedInput(format!(
                "git diff against {base} failed: {}",
                output.stderr.trim()
            )));
        }
        Ok(output.stdout)
    }

    /// Changed lines relative to `base`.
    ///
    /// A failed diff gives an empty change set and a warning.
    #[instrument(skip(self))]
    pub async fn change_set(&self, dir: &Path, base: &str) -> ChangeSet {
        match self.diff(dir, base).await {
            Ok(diff) => {
                let change_set = ChangeSet::from_unified_diff(&diff);
                info!(
                    files = change_set.file_count(),
                    lines = change_set.total_lines(),
                    "computed change set"
                );
                change_set
            }
            Err(e) => {
                warn!(error = %e, "could not compute change set, coverage will not be diff-scoped");
                ChangeSet::new()
            }
        }
    }
}
