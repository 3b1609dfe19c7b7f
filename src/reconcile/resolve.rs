//! Revision resolution.
//!
//! ```text
//! Start -> Reset -> Resolving -> CheckedOut
//!                      |
//!                      +-> StaleReference | TimedOut | Failed
//! ```
//!
//! Every remote call goes through the caller's [`TimeoutGuard`]; the
//! resolver branches only on [`RemoteOutcome`] and [`ToolExit`].

use crate::error::ReconcileError;
use crate::git::{VersionControl, remote_tracking_ref};
use crate::guard::{RemoteOutcome, TimeoutGuard, ToolExit};
use crate::types::{CommitId, RevisionSpec};

/// Drive the repository to `revision` and return the checked-out commit.
pub fn resolve<V: VersionControl + ?Sized>(
    vcs: &V,
    revision: &RevisionSpec,
    guard: &TimeoutGuard,
) -> Result<String, ReconcileError> {
    reset(vcs)?;

    let target = match revision {
        RevisionSpec::Floating { branch } => {
            log::info!("Fetching tip of {}", branch);
            require_fetch("fetch", vcs.fetch_branch(branch, guard)?)?;
            remote_tracking_ref(branch)
        }
        RevisionSpec::Pinned { commit, branch } => {
            fetch_pinned(vcs, commit, branch, guard)?;
            commit.as_str().to_string()
        }
    };

    checkout(vcs, &target)
}

/// Discard local modifications and untracked files, then confirm the tree is clean.
fn reset<V: VersionControl + ?Sized>(vcs: &V) -> Result<(), ReconcileError> {
    let exit = vcs.discard_local_changes()?;
    if !exit.is_success() {
        return Err(ReconcileError::ToolFailed {
            operation: "reset",
            code: exit.code(),
        });
    }
    if !vcs.is_clean()? {
        return Err(ReconcileError::DirtyWorkTree(
            vcs.work_dir().display().to_string(),
        ));
    }
    Ok(())
}

fn fetch_pinned<V: VersionControl + ?Sized>(
    vcs: &V,
    commit: &CommitId,
    branch: &str,
    guard: &TimeoutGuard,
) -> Result<(), ReconcileError> {
    if vcs.has_commit(commit) {
        log::info!("Commit {} already present, skipping fetch", commit);
        return Ok(());
    }

    log::info!("Fetching commit {}", commit);
    match vcs.fetch_commit(commit, guard)? {
        RemoteOutcome::Success => Ok(()),
        RemoteOutcome::TimedOut { exit_code } => Err(timed_out("fetch", exit_code)),
        RemoteOutcome::Failed(code) => {
            log::warn!(
                "Direct fetch of {} failed with status {}; fetching {} instead",
                commit,
                code,
                branch
            );
            // The fallback's own failure is not fatal: the commit may already
            // be present from an earlier partial fetch, and checkout decides.
            match vcs.fetch_branch(branch, guard)? {
                RemoteOutcome::TimedOut { exit_code } => Err(timed_out("fetch", exit_code)),
                RemoteOutcome::Failed(code) => {
                    log::warn!("Fallback fetch of {} failed with status {}", branch, code);
                    Ok(())
                }
                RemoteOutcome::Success => Ok(()),
            }
        }
    }
}

fn checkout<V: VersionControl + ?Sized>(vcs: &V, target: &str) -> Result<String, ReconcileError> {
    log::info!("Checking out {}", target);
    match vcs.checkout(target)? {
        ToolExit::Success => Ok(vcs.head_commit()?),
        ToolExit::NotFound => {
            log::warn!("{} not found after fetch; reference is stale", target);
            Err(ReconcileError::StaleReference {
                commit: target.to_string(),
            })
        }
        other => Err(ReconcileError::ToolFailed {
            operation: "checkout",
            code: other.code(),
        }),
    }
}

fn require_fetch(operation: &'static str, outcome: RemoteOutcome) -> Result<(), ReconcileError> {
    match outcome {
        RemoteOutcome::Success => Ok(()),
        RemoteOutcome::TimedOut { exit_code } => Err(timed_out(operation, exit_code)),
        RemoteOutcome::Failed(code) => Err(ReconcileError::ToolFailed { operation, code }),
    }
}

fn timed_out(operation: &'static str, exit_code: i32) -> ReconcileError {
    log::warn!("{} timed out", operation);
    ReconcileError::TimedOut {
        operation,
        exit_code,
    }
}
