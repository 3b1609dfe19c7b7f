//! Timeout guard for remote-facing commands.
//!
//! Every command that talks to the remote (clone, fetch) runs through
//! [`TimeoutGuard::run`], which bounds its wall-clock time and translates the
//! raw exit status into a closed set of outcomes. The rest of the crate
//! branches on [`ToolExit`] and [`RemoteOutcome`], never on numeric literals.
//!
//! The child's stdout/stderr are left as configured by the caller; the guard
//! only observes the exit status.

use std::io;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Child, Command, ExitStatus};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::interrupt;

/// Status reserved by `timeout(1)` and friends for "timed out".
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Status git uses for fatal errors, including "object/ref not found".
pub const NOT_FOUND_EXIT_CODE: i32 = 128;

/// Default status reported when a guarded remote call times out.
pub const DEFAULT_TIMEOUT_EXIT_CODE: i32 = 110;

/// Initial poll interval while waiting for the child.
const POLL_START: Duration = Duration::from_millis(10);

/// Upper bound for the poll interval.
const POLL_MAX: Duration = Duration::from_millis(200);

/// Errors returned by the guard itself (not by the guarded command).
#[derive(Error, Debug)]
pub enum GuardError {
    /// The command could not be started.
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    /// Waiting on the child failed.
    #[error("failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },
    /// An interrupt arrived while the command was running; it was killed.
    #[error("interrupted while running {0}")]
    Interrupted(String),
}

/// Typed exit status of an external tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolExit {
    /// Exit status 0.
    Success,
    /// The wall-clock bound elapsed, or the tool reported the timeout status.
    TimedOut,
    /// The tool reported "object/ref not found" (git's fatal status).
    NotFound,
    /// Any other non-zero status, preserved verbatim.
    Failed(i32),
}

impl ToolExit {
    /// Classify a raw exit code.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => ToolExit::Success,
            TIMEOUT_EXIT_CODE => ToolExit::TimedOut,
            NOT_FOUND_EXIT_CODE => ToolExit::NotFound,
            other => ToolExit::Failed(other),
        }
    }

    /// Classify a process exit status. Death by signal N reads as `128 + N`.
    pub fn from_status(status: ExitStatus) -> Self {
        match status.code() {
            Some(code) => Self::from_code(code),
            None => Self::from_code(128 + status.signal().unwrap_or(0)),
        }
    }

    /// The raw exit code this outcome stands for.
    pub fn code(self) -> i32 {
        match self {
            ToolExit::Success => 0,
            ToolExit::TimedOut => TIMEOUT_EXIT_CODE,
            ToolExit::NotFound => NOT_FOUND_EXIT_CODE,
            ToolExit::Failed(code) => code,
        }
    }

    /// Returns true for exit status 0.
    pub fn is_success(self) -> bool {
        self == ToolExit::Success
    }
}

/// Result of one guarded remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOutcome {
    /// The call completed with status 0.
    Success,
    /// The call timed out; `exit_code` is the caller-chosen status to report.
    TimedOut { exit_code: i32 },
    /// The call failed with this raw status.
    Failed(i32),
}

/// Wall-clock bound plus exit-status translation for remote calls.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutGuard {
    bound: Option<Duration>,
    timeout_exit_code: Option<i32>,
    cancelled: fn() -> bool,
}

impl TimeoutGuard {
    /// Create a guard. `bound == None` imposes no timeout.
    ///
    /// When `timeout_exit_code` is `None`, a timeout is reported as a plain
    /// failure with the raw timeout status (124).
    pub fn new(bound: Option<Duration>, timeout_exit_code: Option<i32>) -> Self {
        Self {
            bound,
            timeout_exit_code,
            cancelled: interrupt::is_interrupted,
        }
    }

    /// Create a guard from a bound in seconds, where 0 means unbounded.
    pub fn from_secs(bound_secs: u64, timeout_exit_code: Option<i32>) -> Self {
        let bound = (bound_secs > 0).then(|| Duration::from_secs(bound_secs));
        Self::new(bound, timeout_exit_code)
    }

    /// A guard with no bound that reports timeouts with the default status.
    pub fn unbounded() -> Self {
        Self::new(None, Some(DEFAULT_TIMEOUT_EXIT_CODE))
    }

    /// Replace the cancellation check (defaults to the process interrupt flag).
    pub fn with_cancel(mut self, cancelled: fn() -> bool) -> Self {
        self.cancelled = cancelled;
        self
    }

    /// The configured wall-clock bound, if any.
    pub fn bound(&self) -> Option<Duration> {
        self.bound
    }

    /// Run `cmd` to completion or until the bound elapses.
    pub fn run(&self, cmd: &mut Command) -> Result<RemoteOutcome, GuardError> {
        let exit = self.wait_bounded(cmd)?;
        Ok(self.translate(exit))
    }

    /// Map a tool exit onto a remote outcome using this guard's override.
    pub fn translate(&self, exit: ToolExit) -> RemoteOutcome {
        match exit {
            ToolExit::Success => RemoteOutcome::Success,
            ToolExit::TimedOut => match self.timeout_exit_code {
                Some(exit_code) => RemoteOutcome::TimedOut { exit_code },
                None => RemoteOutcome::Failed(TIMEOUT_EXIT_CODE),
            },
            other => RemoteOutcome::Failed(other.code()),
        }
    }

    fn wait_bounded(&self, cmd: &mut Command) -> Result<ToolExit, GuardError> {
        let program = cmd.get_program().to_string_lossy().into_owned();

        // Own process group so a timeout also takes down git's helpers
        // (remote-https, ssh) instead of orphaning them.
        cmd.process_group(0);
        let mut child = cmd.spawn().map_err(|source| GuardError::Spawn {
            program: program.clone(),
            source,
        })?;

        let deadline = self.bound.map(|bound| Instant::now() + bound);
        let mut sleep_duration = POLL_START;

        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(ToolExit::from_status(status)),
                Ok(None) => {}
                Err(source) => {
                    kill_and_reap(&mut child);
                    return Err(GuardError::Wait { program, source });
                }
            }

            if (self.cancelled)() {
                kill_and_reap(&mut child);
                return Err(GuardError::Interrupted(program));
            }

            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    log::warn!(
                        "{} exceeded {:?}, killing it",
                        program,
                        self.bound.unwrap_or_default()
                    );
                    kill_and_reap(&mut child);
                    return Ok(ToolExit::TimedOut);
                }
                sleep_duration = sleep_duration.min(deadline - now);
            }

            thread::sleep(sleep_duration);
            sleep_duration = (sleep_duration * 2).min(POLL_MAX);
        }
    }
}

/// Kill the child's whole process group and reap the child.
fn kill_and_reap(child: &mut Child) {
    let pgid = child.id() as libc::pid_t;
    // SAFETY: signalling a process group we created; no memory is touched.
    unsafe {
        libc::kill(-pgid, libc::SIGKILL);
    }
    let _ = child.kill();
    let _ = child.wait();
}
