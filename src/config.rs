//! Command line and environment configuration.

use clap::{Args, Parser, Subcommand};
use std::ffi::OsString;
use std::path::PathBuf;
use thiserror::Error;

use crate::git::validate_git_ref;
use crate::guard::{DEFAULT_TIMEOUT_EXIT_CODE, TimeoutGuard};
use crate::lfs::SkipSmudge;
use crate::types::{BucketLocation, ParseError, RevisionSpec};

/// Errors in the caller's inputs. Always reported before any remote call.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required input: {0}")]
    Missing(&'static str),
    #[error("invalid commit '{value}': {source}")]
    InvalidCommit { value: String, source: ParseError },
    #[error("invalid branch: {0}")]
    InvalidBranch(String),
    #[error("invalid cache bucket '{value}': {source}")]
    InvalidBucket { value: String, source: ParseError },
    #[error("invalid job id '{0}'")]
    InvalidJobId(String),
    #[error("{0} is in use by another reposync invocation")]
    Busy(PathBuf),
}

#[derive(Parser, Debug)]
#[command(
    name = "reposync",
    version,
    about = "Reconcile a working copy with a branch tip or pinned commit"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Bring a working directory to the requested revision
    Checkout(CheckoutArgs),

    /// Check dependencies and working directory state
    Doctor {
        /// Working directory to inspect
        #[arg(long, env = "REPOSYNC_DIR")]
        dir: Option<PathBuf>,

        /// Git executable
        #[arg(long = "git", env = "REPOSYNC_GIT", default_value = "git")]
        git_path: OsString,
    },
}

#[derive(Args, Debug, Clone)]
pub struct CheckoutArgs {
    /// Remote origin address
    #[arg(long, env = "REPOSYNC_REPO")]
    pub repo: Option<String>,

    /// Branch to follow, also the fallback for pinned commits
    #[arg(long, env = "REPOSYNC_BRANCH")]
    pub branch: Option<String>,

    /// Full 40-character commit id; empty or HEAD follows the branch
    #[arg(long, env = "REPOSYNC_COMMIT", default_value = "")]
    pub commit: String,

    /// Working directory to reconcile
    #[arg(long, env = "REPOSYNC_DIR")]
    pub dir: Option<PathBuf>,

    /// Wall-clock bound for each remote call in seconds (0 = unbounded)
    #[arg(long, env = "REPOSYNC_REMOTE_TIMEOUT", default_value_t = 0)]
    pub remote_timeout: u64,

    /// Exit status reported when a remote call times out
    #[arg(
        long,
        env = "REPOSYNC_REMOTE_TIMEOUT_EXIT_CODE",
        default_value_t = DEFAULT_TIMEOUT_EXIT_CODE
    )]
    pub remote_timeout_exit_code: i32,

    /// Always start from a fresh clone
    #[arg(long, env = "REPOSYNC_FORCE_CLEAN")]
    pub force_clean: bool,

    /// Snapshot location (gs://bucket/prefix, file:///path or a path)
    #[arg(long, env = "REPOSYNC_CACHE_BUCKET")]
    pub cache_bucket: Option<String>,

    /// Install git-lfs hooks after acquiring the repository
    #[arg(long, env = "REPOSYNC_LFS")]
    pub lfs: bool,

    /// Value of GIT_LFS_SKIP_SMUDGE to hand to git after lfs setup
    #[arg(long, env = "GIT_LFS_SKIP_SMUDGE", hide_env_values = true)]
    pub lfs_skip_smudge: Option<OsString>,

    /// Job identifier; a success marker is written under this name
    #[arg(long, env = "REPOSYNC_JOB_ID")]
    pub job_id: Option<String>,

    /// Directory for success markers
    #[arg(long, env = "REPOSYNC_MARKER_DIR")]
    pub marker_dir: Option<PathBuf>,

    /// Git executable
    #[arg(long = "git", env = "REPOSYNC_GIT", default_value = "git")]
    pub git_path: OsString,
}

/// Validated inputs for one reconciliation.
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    pub origin: String,
    pub revision: RevisionSpec,
    pub work_dir: PathBuf,
    pub remote_timeout_secs: u64,
    pub remote_timeout_exit_code: i32,
    pub force_clean: bool,
    pub cache: Option<BucketLocation>,
    pub lfs: bool,
    pub skip_smudge: SkipSmudge,
    pub job_id: Option<String>,
    pub marker_dir: PathBuf,
    pub git_path: OsString,
}

impl CheckoutConfig {
    /// Config with every optional input at its default.
    pub fn new(origin: impl Into<String>, revision: RevisionSpec, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            origin: origin.into(),
            revision,
            work_dir: work_dir.into(),
            remote_timeout_secs: 0,
            remote_timeout_exit_code: DEFAULT_TIMEOUT_EXIT_CODE,
            force_clean: false,
            cache: None,
            lfs: false,
            skip_smudge: SkipSmudge::default(),
            job_id: None,
            marker_dir: default_marker_dir(),
            git_path: OsString::from("git"),
        }
    }

    /// The guard applied to every remote call.
    pub fn guard(&self) -> TimeoutGuard {
        TimeoutGuard::from_secs(
            self.remote_timeout_secs,
            Some(self.remote_timeout_exit_code),
        )
    }
}

/// `<cache dir>/reposync/markers`, or the temp dir when there is no cache dir.
pub fn default_marker_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("reposync")
        .join("markers")
}

fn required(value: Option<String>, name: &'static str) -> Result<String, ConfigError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(ConfigError::Missing(name)),
    }
}

impl TryFrom<CheckoutArgs> for CheckoutConfig {
    type Error = ConfigError;

    fn try_from(args: CheckoutArgs) -> Result<Self, Self::Error> {
        let origin = required(args.repo, "repo")?;
        let branch = required(args.branch, "branch")?;
        let work_dir = args
            .dir
            .filter(|d| !d.as_os_str().is_empty())
            .ok_or(ConfigError::Missing("dir"))?;

        validate_git_ref(&branch, "branch")
            .map_err(|e| ConfigError::InvalidBranch(e.to_string()))?;

        let revision = RevisionSpec::from_inputs(&args.commit, &branch).map_err(|source| {
            ConfigError::InvalidCommit {
                value: args.commit.clone(),
                source,
            }
        })?;

        let cache = match args.cache_bucket.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(value) => Some(value.parse::<BucketLocation>().map_err(|source| {
                ConfigError::InvalidBucket {
                    value: value.to_string(),
                    source,
                }
            })?),
        };

        let job_id = match args.job_id {
            None => None,
            Some(id) if id.trim().is_empty() => None,
            Some(id) => {
                let id = id.trim().to_string();
                if id.contains('/') || id.contains('\\') || id.starts_with('.') {
                    return Err(ConfigError::InvalidJobId(id));
                }
                Some(id)
            }
        };

        Ok(Self {
            origin,
            revision,
            work_dir,
            remote_timeout_secs: args.remote_timeout,
            remote_timeout_exit_code: args.remote_timeout_exit_code,
            force_clean: args.force_clean,
            cache,
            lfs: args.lfs,
            skip_smudge: SkipSmudge::new(args.lfs_skip_smudge),
            job_id,
            marker_dir: args.marker_dir.unwrap_or_else(default_marker_dir),
            git_path: args.git_path,
        })
    }
}
