//! Scripted in-memory `VersionControl` for engine tests.

use std::cell::RefCell;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::git::{GitError, VersionControl};
use crate::guard::{RemoteOutcome, TimeoutGuard, ToolExit};
use crate::types::CommitId;

/// A state-changing call the engine made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Clone(String),
    EnsureOrigin(String),
    InstallLfs,
    Discard,
    FetchBranch(String),
    FetchCommit(String),
    Checkout(String),
}

pub struct FakeVcs {
    work_dir: PathBuf,
    repository: bool,
    index_locked: bool,
    dirty_after_reset: bool,
    commits: RefCell<HashSet<String>>,
    clone: RemoteOutcome,
    fetch_branch: RemoteOutcome,
    fetch_commit: RemoteOutcome,
    checkout: ToolExit,
    lfs: ToolExit,
    head: RefCell<String>,
    calls: RefCell<Vec<Call>>,
}

impl FakeVcs {
    fn new(work_dir: &Path, repository: bool) -> Self {
        Self {
            work_dir: work_dir.to_path_buf(),
            repository,
            index_locked: false,
            dirty_after_reset: false,
            commits: RefCell::new(HashSet::new()),
            clone: RemoteOutcome::Success,
            fetch_branch: RemoteOutcome::Success,
            fetch_commit: RemoteOutcome::Success,
            checkout: ToolExit::Success,
            lfs: ToolExit::Success,
            head: RefCell::new(String::new()),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// A directory that already holds a usable repository.
    pub fn repository(work_dir: &Path) -> Self {
        Self::new(work_dir, true)
    }

    /// A directory that is not (and never becomes) a repository.
    pub fn empty(work_dir: &Path) -> Self {
        Self::new(work_dir, false)
    }

    pub fn with_locked_index(mut self) -> Self {
        self.index_locked = true;
        self
    }

    pub fn with_commit(self, sha: &str) -> Self {
        self.commits.borrow_mut().insert(sha.to_string());
        self
    }

    pub fn dirty_after_reset(mut self) -> Self {
        self.dirty_after_reset = true;
        self
    }

    pub fn clone_returns(mut self, outcome: RemoteOutcome) -> Self {
        self.clone = outcome;
        self
    }

    pub fn fetch_branch_returns(mut self, outcome: RemoteOutcome) -> Self {
        self.fetch_branch = outcome;
        self
    }

    pub fn fetch_commit_returns(mut self, outcome: RemoteOutcome) -> Self {
        self.fetch_commit = outcome;
        self
    }

    pub fn checkout_returns(mut self, exit: ToolExit) -> Self {
        self.checkout = exit;
        self
    }

    pub fn lfs_returns(mut self, exit: ToolExit) -> Self {
        self.lfs = exit;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| matches!(c, Call::FetchBranch(_) | Call::FetchCommit(_)))
            .count()
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }
}

impl VersionControl for FakeVcs {
    fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    fn is_repository(&self) -> bool {
        self.repository
    }

    fn is_index_locked(&self) -> bool {
        self.index_locked
    }

    fn clone_origin(
        &self,
        origin: &str,
        _guard: &TimeoutGuard,
    ) -> Result<RemoteOutcome, GitError> {
        self.record(Call::Clone(origin.to_string()));
        Ok(self.clone)
    }

    fn ensure_origin(&self, origin: &str) -> Result<(), GitError> {
        self.record(Call::EnsureOrigin(origin.to_string()));
        Ok(())
    }

    fn install_lfs(&self) -> Result<ToolExit, GitError> {
        self.record(Call::InstallLfs);
        Ok(self.lfs)
    }

    fn discard_local_changes(&self) -> Result<ToolExit, GitError> {
        self.record(Call::Discard);
        Ok(ToolExit::Success)
    }

    fn is_clean(&self) -> Result<bool, GitError> {
        Ok(!self.dirty_after_reset)
    }

    fn has_commit(&self, commit: &CommitId) -> bool {
        self.commits.borrow().contains(commit.as_str())
    }

    fn fetch_branch(
        &self,
        branch: &str,
        _guard: &TimeoutGuard,
    ) -> Result<RemoteOutcome, GitError> {
        self.record(Call::FetchBranch(branch.to_string()));
        Ok(self.fetch_branch)
    }

    fn fetch_commit(
        &self,
        commit: &CommitId,
        _guard: &TimeoutGuard,
    ) -> Result<RemoteOutcome, GitError> {
        self.record(Call::FetchCommit(commit.to_string()));
        if self.fetch_commit == RemoteOutcome::Success {
            self.commits.borrow_mut().insert(commit.to_string());
        }
        Ok(self.fetch_commit)
    }

    fn checkout(&self, target: &str) -> Result<ToolExit, GitError> {
        self.record(Call::Checkout(target.to_string()));
        if self.checkout.is_success() {
            *self.head.borrow_mut() = target.to_string();
        }
        Ok(self.checkout)
    }

    fn head_commit(&self) -> Result<String, GitError> {
        Ok(self.head.borrow().clone())
    }
}
