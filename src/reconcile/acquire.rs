//! Repository acquisition: reuse, restore from cache, or clone.

use std::fmt;

use crate::error::ReconcileError;
use crate::git::VersionControl;
use crate::guard::{RemoteOutcome, TimeoutGuard};
use crate::snapshot::{self, CacheRestorer, SnapshotError, SnapshotStore};

/// What the working directory looked like before acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkdirState {
    /// Nothing at the path.
    Missing,
    /// A path that is not a repository root.
    NotRepository,
    /// A repository whose index lock was left behind by a killed writer.
    IndexLocked,
    /// A repository that can be reused.
    Repository,
}

impl WorkdirState {
    pub fn inspect<V: VersionControl + ?Sized>(vcs: &V) -> Self {
        if !vcs.work_dir().exists() {
            WorkdirState::Missing
        } else if !vcs.is_repository() {
            WorkdirState::NotRepository
        } else if vcs.is_index_locked() {
            WorkdirState::IndexLocked
        } else {
            WorkdirState::Repository
        }
    }

    /// Whether the local copy can be trusted as-is.
    pub fn is_reusable(self) -> bool {
        self == WorkdirState::Repository
    }
}

impl fmt::Display for WorkdirState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkdirState::Missing => "missing",
            WorkdirState::NotRepository => "not a repository",
            WorkdirState::IndexLocked => "repository with locked index",
            WorkdirState::Repository => "repository",
        };
        f.write_str(s)
    }
}

/// How the repository was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionPath {
    Reuse,
    Restore,
    Clone,
}

/// Choose an acquisition path. First match wins:
/// forced clean clones, an untrustworthy local copy restores (or clones
/// without a cache), anything else is reused.
pub fn decide(force_clean: bool, state: WorkdirState, has_cache: bool) -> AcquisitionPath {
    if force_clean {
        AcquisitionPath::Clone
    } else if !state.is_reusable() {
        if has_cache {
            AcquisitionPath::Restore
        } else {
            AcquisitionPath::Clone
        }
    } else {
        AcquisitionPath::Reuse
    }
}

/// Produce a repository in the working directory.
///
/// After a reuse or restore, `origin` is pointed at `origin_url` so later
/// fetches go to the configured remote.
pub fn acquire<V: VersionControl + ?Sized>(
    vcs: &V,
    origin_url: &str,
    force_clean: bool,
    cache: Option<&dyn SnapshotStore>,
    guard: &TimeoutGuard,
) -> Result<AcquisitionPath, ReconcileError> {
    let state = WorkdirState::inspect(vcs);
    let path = decide(force_clean, state, cache.is_some());
    log::info!(
        "Working directory {} is {}; acquiring by {:?}",
        vcs.work_dir().display(),
        state,
        path
    );

    match (path, cache) {
        (AcquisitionPath::Reuse, _) => {
            vcs.ensure_origin(origin_url)?;
        }
        (AcquisitionPath::Restore, Some(store)) => {
            let name = CacheRestorer::new(store).restore(vcs.work_dir())?;
            if !vcs.is_repository() {
                return Err(SnapshotError::NotARepository(name).into());
            }
            vcs.ensure_origin(origin_url)?;
        }
        (AcquisitionPath::Restore, None) | (AcquisitionPath::Clone, _) => {
            snapshot::reset_dir(vcs.work_dir())?;
            match vcs.clone_origin(origin_url, guard)? {
                RemoteOutcome::Success => {}
                RemoteOutcome::TimedOut { exit_code } => {
                    log::warn!("Clone of {} timed out", origin_url);
                    return Err(ReconcileError::TimedOut {
                        operation: "clone",
                        exit_code,
                    });
                }
                RemoteOutcome::Failed(code) => {
                    return Err(ReconcileError::ToolFailed {
                        operation: "clone",
                        code,
                    });
                }
            }
        }
    }

    Ok(path)
}
