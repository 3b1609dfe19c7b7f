//! Terminal outcomes and their process exit statuses.

use std::fmt;
use std::io;
use thiserror::Error;

use crate::config::ConfigError;
use crate::git::GitError;
use crate::guard::GuardError;
use crate::snapshot::SnapshotError;

/// Exit status for a pinned commit that no longer exists on its branch.
pub const STALE_REFERENCE_EXIT_CODE: i32 = 116;

/// Exit status for configuration errors and failures with no tool status.
pub const GENERAL_EXIT_CODE: i32 = 1;

/// Exit status after SIGINT/SIGTERM.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Everything that can end a reconciliation early.
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{operation} timed out")]
    TimedOut {
        operation: &'static str,
        exit_code: i32,
    },

    #[error("commit {commit} no longer exists on the remote (history rewritten?)")]
    StaleReference { commit: String },

    #[error("{operation} failed with status {code}")]
    ToolFailed { operation: &'static str, code: i32 },

    #[error("working tree at {0} is still dirty after reset")]
    DirtyWorkTree(String),

    #[error("cache restore failed: {0}")]
    Restore(#[from] SnapshotError),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("interrupted")]
    Interrupted,
}

impl ReconcileError {
    /// Whether this error was caused by SIGINT/SIGTERM, however deep.
    pub fn is_interrupt(&self) -> bool {
        matches!(
            self,
            ReconcileError::Interrupted
                | ReconcileError::Restore(SnapshotError::Interrupted)
                | ReconcileError::Git(GitError::Guard(GuardError::Interrupted(_)))
        )
    }

    /// The process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        if self.is_interrupt() {
            return INTERRUPTED_EXIT_CODE;
        }
        match self {
            ReconcileError::TimedOut { exit_code, .. } => *exit_code,
            ReconcileError::StaleReference { .. } => STALE_REFERENCE_EXIT_CODE,
            ReconcileError::ToolFailed { code, .. } => *code,
            ReconcileError::Config(_)
            | ReconcileError::DirtyWorkTree(_)
            | ReconcileError::Restore(_)
            | ReconcileError::Git(_)
            | ReconcileError::Io(_)
            | ReconcileError::Interrupted => GENERAL_EXIT_CODE,
        }
    }
}

/// The externally observable result of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    CheckedOut { commit: String },
    TimedOut { exit_code: i32 },
    StaleReference { commit: String },
    Failed { exit_code: i32, reason: String },
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::CheckedOut { .. } => 0,
            Outcome::TimedOut { exit_code } => *exit_code,
            Outcome::StaleReference { .. } => STALE_REFERENCE_EXIT_CODE,
            Outcome::Failed { exit_code, .. } => *exit_code,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::CheckedOut { .. })
    }
}

impl From<Result<String, ReconcileError>> for Outcome {
    fn from(result: Result<String, ReconcileError>) -> Self {
        match result {
            Ok(commit) => Outcome::CheckedOut { commit },
            Err(ReconcileError::TimedOut { exit_code, .. }) => Outcome::TimedOut { exit_code },
            Err(ReconcileError::StaleReference { commit }) => Outcome::StaleReference { commit },
            Err(e) => Outcome::Failed {
                exit_code: e.exit_code(),
                reason: e.to_string(),
            },
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::CheckedOut { commit } => write!(f, "checked out {}", commit),
            Outcome::TimedOut { exit_code } => {
                write!(f, "remote operation timed out (status {})", exit_code)
            }
            Outcome::StaleReference { commit } => write!(f, "stale reference {}", commit),
            Outcome::Failed { exit_code, reason } => {
                write!(f, "failed (status {}): {}", exit_code, reason)
            }
        }
    }
}
