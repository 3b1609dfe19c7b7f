//! The checkout reconciliation engine.
//!
//! One invocation acquires a repository in the working directory
//! ([`acquire`]), optionally sets up git-lfs, then resolves the requested
//! revision ([`resolve`]). The working directory is held under a
//! [`WorkdirLock`] for the whole run.

mod acquire;
mod resolve;
#[cfg(test)]
pub(crate) mod testing;

pub use acquire::{AcquisitionPath, WorkdirState, acquire, decide};
pub use resolve::resolve;

use crate::config::{CheckoutConfig, ConfigError};
use crate::error::{Outcome, ReconcileError};
use crate::git::{GitCli, VersionControl};
use crate::interrupt;
use crate::lock::WorkdirLock;
use crate::marker::SuccessMarker;
use crate::snapshot::{SnapshotStore, open_store};

/// Run one reconciliation against the real git CLI and report its outcome.
pub fn run(config: &CheckoutConfig) -> Outcome {
    let result = run_locked(config);
    let outcome = Outcome::from(result);
    match &outcome {
        Outcome::CheckedOut { commit } => log::info!("Checked out {}", commit),
        other => log::error!("Reconciliation {}", other),
    }
    outcome
}

fn run_locked(config: &CheckoutConfig) -> Result<String, ReconcileError> {
    let _lock = WorkdirLock::try_acquire(&config.work_dir)?
        .ok_or_else(|| ConfigError::Busy(config.work_dir.clone()))?;

    let git = GitCli::new(&config.work_dir)
        .with_git_path(&config.git_path)
        .with_skip_smudge(config.skip_smudge.clone());
    let store = config.cache.as_ref().map(open_store);

    let commit = reconcile(&git, config, store.as_deref())?;

    if let Some(job_id) = &config.job_id {
        SuccessMarker::new(job_id, &commit, config.revision.branch()).write(&config.marker_dir)?;
    }
    Ok(commit)
}

/// Acquire, set up lfs if asked, and resolve. Returns the checked-out commit.
pub fn reconcile<V: VersionControl + ?Sized>(
    vcs: &V,
    config: &CheckoutConfig,
    cache: Option<&dyn SnapshotStore>,
) -> Result<String, ReconcileError> {
    let guard = config.guard();
    log::info!(
        "Reconciling {} with {} at {}",
        vcs.work_dir().display(),
        config.origin,
        config.revision
    );

    acquire(vcs, &config.origin, config.force_clean, cache, &guard)?;
    check_interrupt()?;

    if config.lfs {
        let exit = vcs.install_lfs()?;
        if !exit.is_success() {
            return Err(ReconcileError::ToolFailed {
                operation: "lfs install",
                code: exit.code(),
            });
        }
    }

    resolve(vcs, &config.revision, &guard)
}

fn check_interrupt() -> Result<(), ReconcileError> {
    if interrupt::is_interrupted() {
        return Err(ReconcileError::Interrupted);
    }
    Ok(())
}
