//! Large-file (git-lfs) setup.
//!
//! Hook installation must not download large objects, so it runs with
//! `GIT_LFS_SKIP_SMUDGE=1`. Every other git command gets the caller's own
//! value back, or no value at all if the caller never set one. The caller's
//! value is plain configuration carried in [`SkipSmudge`]; the process
//! environment is never modified.

use std::ffi::OsString;
use std::process::Command;

use crate::git::{GitCli, GitError};
use crate::guard::ToolExit;

/// Environment variable git-lfs consults before downloading content.
pub const SKIP_SMUDGE_VAR: &str = "GIT_LFS_SKIP_SMUDGE";

/// Scoped `GIT_LFS_SKIP_SMUDGE` value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkipSmudge {
    previous: Option<OsString>,
}

impl SkipSmudge {
    /// Remember the caller's value (`None` if it was never set).
    pub fn new(previous: Option<impl Into<OsString>>) -> Self {
        Self {
            previous: previous.map(Into::into),
        }
    }

    /// The caller's value.
    pub fn previous(&self) -> Option<&OsString> {
        self.previous.as_ref()
    }

    /// Force smudging off for a setup command.
    pub fn force(&self, cmd: &mut Command) {
        cmd.env(SKIP_SMUDGE_VAR, "1");
    }

    /// Give a command the caller's value, or remove the variable entirely.
    pub fn restore(&self, cmd: &mut Command) {
        match &self.previous {
            Some(value) => {
                cmd.env(SKIP_SMUDGE_VAR, value);
            }
            None => {
                cmd.env_remove(SKIP_SMUDGE_VAR);
            }
        }
    }
}

/// Install git-lfs hooks locally and disable lock verification.
///
/// Lock verification prompts for credentials on push against servers
/// without the locking API, so it is switched off for this repository.
pub fn install(git: &GitCli) -> Result<ToolExit, GitError> {
    let mut hooks = git.command();
    git.skip_smudge().force(&mut hooks);
    hooks.args(["lfs", "install", "--local"]);
    let exit = git.run_local(hooks)?;
    if !exit.is_success() {
        return Ok(exit);
    }

    let mut locks = git.command();
    git.skip_smudge().force(&mut locks);
    locks.args(["config", "--local", "lfs.locksverify", "false"]);
    git.run_local(locks)
}
