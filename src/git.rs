//! Git operations using a hybrid CLI + libgit2 approach.
//!
//! **CLI (with hardening) for operations that talk to the remote or rewrite
//! the working tree:** clone, fetch, reset, clean, checkout. Remote calls run
//! through a [`TimeoutGuard`].
//!
//! **libgit2 for local reads:** repository validity, index-lock detection,
//! commit presence, HEAD resolution, origin alignment.
//!
//! The engine talks to git through the [`VersionControl`] trait so the state
//! machine can be exercised against a scripted fake.

use git2::{ErrorCode, Oid, Repository};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;

use crate::guard::{GuardError, RemoteOutcome, TimeoutGuard, ToolExit};
use crate::lfs::SkipSmudge;
use crate::types::CommitId;

/// Errors returned by git operations.
#[derive(Error, Debug)]
pub enum GitError {
    /// libgit2 reported an error.
    #[error("git operation failed: {0}")]
    Git(#[from] git2::Error),
    /// Repository path does not contain a git repo.
    #[error("repository not found at {0}")]
    NotFound(String),
    /// A guarded remote command could not be run.
    #[error(transparent)]
    Guard(#[from] GuardError),
    /// A local git command exited non-zero where a result was required.
    #[error("git {command} failed with status {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },
    /// Underlying IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// Invalid inputs were provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Validate that a git ref (branch name) does not contain dangerous patterns.
///
/// Rejects:
/// - Empty strings
/// - Strings containing `..` (path traversal, range syntax)
/// - Strings starting with `-` (could be interpreted as flags)
/// - Strings containing null bytes or control characters
pub fn validate_git_ref(value: &str, name: &str) -> Result<(), GitError> {
    if value.is_empty() {
        return Err(GitError::InvalidInput(format!("{} cannot be empty", name)));
    }
    if value.contains("..") {
        return Err(GitError::InvalidInput(format!(
            "{} cannot contain '..'",
            name
        )));
    }
    if value.starts_with('-') {
        return Err(GitError::InvalidInput(format!(
            "{} cannot start with '-'",
            name
        )));
    }
    if value.bytes().any(|b| b < 0x20 || b == 0x7f) {
        return Err(GitError::InvalidInput(format!(
            "{} cannot contain null or control characters",
            name
        )));
    }
    Ok(())
}

/// The remote-tracking ref a branch fetch updates: `refs/remotes/origin/<branch>`.
pub fn remote_tracking_ref(branch: &str) -> String {
    format!("refs/remotes/origin/{}", branch)
}

/// Operations the reconciliation engine needs from a version-control tool.
pub trait VersionControl {
    /// The working directory being reconciled.
    fn work_dir(&self) -> &Path;

    /// Whether the working directory is itself a non-bare repository root.
    fn is_repository(&self) -> bool;

    /// Whether the repository's index is locked by an interrupted writer.
    fn is_index_locked(&self) -> bool;

    /// Clone `origin` into the (empty) working directory.
    fn clone_origin(&self, origin: &str, guard: &TimeoutGuard)
    -> Result<RemoteOutcome, GitError>;

    /// Point the `origin` remote at `origin`, adding it if missing.
    fn ensure_origin(&self, origin: &str) -> Result<(), GitError>;

    /// Install large-file hooks for this repository.
    fn install_lfs(&self) -> Result<ToolExit, GitError>;

    /// Discard local modifications and untracked files.
    fn discard_local_changes(&self) -> Result<ToolExit, GitError>;

    /// Whether the working tree has no modifications and no untracked files.
    fn is_clean(&self) -> Result<bool, GitError>;

    /// Whether the commit object exists in the local object database.
    fn has_commit(&self, commit: &CommitId) -> bool;

    /// Fetch the tip of `branch` from origin into its remote-tracking ref.
    fn fetch_branch(&self, branch: &str, guard: &TimeoutGuard)
    -> Result<RemoteOutcome, GitError>;

    /// Fetch exactly `commit` from origin.
    fn fetch_commit(
        &self,
        commit: &CommitId,
        guard: &TimeoutGuard,
    ) -> Result<RemoteOutcome, GitError>;

    /// Force-checkout `target` (a commit id or ref), detaching HEAD.
    fn checkout(&self, target: &str) -> Result<ToolExit, GitError>;

    /// The commit HEAD currently points at.
    fn head_commit(&self) -> Result<String, GitError>;
}

/// Git CLI wrapper with security hardening, bound to one working directory.
#[derive(Debug, Clone)]
pub struct GitCli {
    git_path: OsString,
    work_dir: PathBuf,
    skip_smudge: SkipSmudge,
}

impl GitCli {
    /// Create a new GitCli for `work_dir` using the system git.
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            git_path: "git".into(),
            work_dir: work_dir.into(),
            skip_smudge: SkipSmudge::default(),
        }
    }

    /// Use a different git executable.
    pub fn with_git_path(mut self, git_path: impl Into<OsString>) -> Self {
        self.git_path = git_path.into();
        self
    }

    /// Use the caller's large-file skip-smudge setting for ordinary commands.
    pub fn with_skip_smudge(mut self, skip_smudge: SkipSmudge) -> Self {
        self.skip_smudge = skip_smudge;
        self
    }

    /// The skip-smudge setting applied to ordinary commands.
    pub fn skip_smudge(&self) -> &SkipSmudge {
        &self.skip_smudge
    }

    /// Create a hardened Command running inside the working directory.
    ///
    /// Applies:
    /// - `GIT_TERMINAL_PROMPT=0` - never block on a credential prompt
    /// - null stdin
    /// - the caller's `GIT_LFS_SKIP_SMUDGE` value (or its absence)
    pub(crate) fn command(&self) -> Command {
        let mut cmd = Command::new(&self.git_path);
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        cmd.stdin(Stdio::null());
        cmd.arg("-C").arg(&self.work_dir);
        self.skip_smudge.restore(&mut cmd);
        cmd
    }

    /// Run a local command, capturing output, and classify its exit.
    pub(crate) fn run_local(&self, mut cmd: Command) -> Result<ToolExit, GitError> {
        log::debug!("Running {:?}", cmd);
        let output = cmd.output()?;
        let exit = ToolExit::from_status(output.status);
        if !exit.is_success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            log::warn!("{:?} exited with {}: {}", cmd, exit.code(), stderr.trim());
        }
        Ok(exit)
    }

    /// Run a guarded remote command; its output streams through to ours.
    fn run_remote(&self, mut cmd: Command, guard: &TimeoutGuard) -> Result<RemoteOutcome, GitError> {
        log::debug!("Running {:?} (bound {:?})", cmd, guard.bound());
        cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        Ok(guard.run(&mut cmd)?)
    }

    fn open(&self) -> Result<Repository, GitError> {
        open_repository(&self.work_dir)
    }
}

impl VersionControl for GitCli {
    fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    fn is_repository(&self) -> bool {
        repository_exists(&self.work_dir)
    }

    fn is_index_locked(&self) -> bool {
        match self.open() {
            Ok(repo) => repo.path().join("index.lock").exists(),
            Err(_) => false,
        }
    }

    fn clone_origin(
        &self,
        origin: &str,
        guard: &TimeoutGuard,
    ) -> Result<RemoteOutcome, GitError> {
        if origin.is_empty() || origin.starts_with('-') {
            return Err(GitError::InvalidInput(format!(
                "invalid origin '{}'",
                origin
            )));
        }

        std::fs::create_dir_all(&self.work_dir)?;

        let mut cmd = self.command();
        cmd.args(["clone", "--no-tags", "--"]).arg(origin).arg(".");
        self.run_remote(cmd, guard)
    }

    fn ensure_origin(&self, origin: &str) -> Result<(), GitError> {
        let repo = self.open()?;
        match repo.find_remote("origin") {
            Ok(remote) if remote.url() == Some(origin) => Ok(()),
            Ok(_) => {
                log::info!("Pointing origin at {}", origin);
                repo.remote_set_url("origin", origin)?;
                Ok(())
            }
            Err(e) if e.code() == ErrorCode::NotFound => {
                log::info!("Adding missing origin {}", origin);
                repo.remote("origin", origin)?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn install_lfs(&self) -> Result<ToolExit, GitError> {
        crate::lfs::install(self)
    }

    fn discard_local_changes(&self) -> Result<ToolExit, GitError> {
        let mut reset = self.command();
        reset.args(["reset", "--hard", "--quiet"]);
        let exit = self.run_local(reset)?;
        if !exit.is_success() {
            return Ok(exit);
        }

        let mut clean = self.command();
        clean.args(["clean", "-ffd", "--quiet"]);
        self.run_local(clean)
    }

    fn is_clean(&self) -> Result<bool, GitError> {
        let mut cmd = self.command();
        cmd.args(["status", "--porcelain", "--untracked-files=all"]);
        let output = cmd.output()?;
        let exit = ToolExit::from_status(output.status);
        if !exit.is_success() {
            return Err(GitError::CommandFailed {
                command: "status".to_string(),
                code: exit.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().is_empty())
    }

    fn has_commit(&self, commit: &CommitId) -> bool {
        let Ok(repo) = self.open() else {
            return false;
        };
        let Ok(oid) = Oid::from_str(commit.as_str()) else {
            return false;
        };
        repo.find_commit(oid).is_ok()
    }

    fn fetch_branch(
        &self,
        branch: &str,
        guard: &TimeoutGuard,
    ) -> Result<RemoteOutcome, GitError> {
        validate_git_ref(branch, "branch")?;

        let refspec = format!("+refs/heads/{}:{}", branch, remote_tracking_ref(branch));
        let mut cmd = self.command();
        cmd.args(["fetch", "--no-tags", "origin"]).arg(&refspec);
        self.run_remote(cmd, guard)
    }

    fn fetch_commit(
        &self,
        commit: &CommitId,
        guard: &TimeoutGuard,
    ) -> Result<RemoteOutcome, GitError> {
        let mut cmd = self.command();
        cmd.args(["fetch", "--no-tags", "origin", commit.as_str()]);
        self.run_remote(cmd, guard)
    }

    fn checkout(&self, target: &str) -> Result<ToolExit, GitError> {
        if target.starts_with('-') {
            return Err(GitError::InvalidInput(format!(
                "checkout target cannot start with '-': {}",
                target
            )));
        }

        let mut cmd = self.command();
        cmd.args(["checkout", "--force", "--quiet", "--detach"])
            .arg(target)
            .arg("--");
        self.run_local(cmd)
    }

    fn head_commit(&self) -> Result<String, GitError> {
        let repo = self.open()?;
        let commit = repo.head()?.peel_to_commit()?;
        Ok(commit.id().to_string())
    }
}

/// Open an existing repository at the given path.
pub fn open_repository(path: &Path) -> Result<Repository, GitError> {
    let repo = Repository::open(path).map_err(|e| {
        if e.code() == ErrorCode::NotFound {
            GitError::NotFound(path.display().to_string())
        } else {
            GitError::Git(e)
        }
    })?;
    Ok(repo)
}

/// Check if a path is the root of a valid non-bare git repository.
pub fn repository_exists(path: &Path) -> bool {
    match Repository::open(path) {
        Ok(repo) => !repo.is_bare(),
        Err(_) => false,
    }
}
