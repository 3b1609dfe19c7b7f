//! Shared types for reposync

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Length of a full (SHA-1) commit identifier in hex characters.
pub const COMMIT_ID_LEN: usize = 40;

/// Commit spec value meaning "use the branch tip".
pub const HEAD_PLACEHOLDER: &str = "HEAD";

/// Error type for parsing failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("value cannot be empty")]
    Empty,
    #[error("commit id must be {COMMIT_ID_LEN} hex characters, got {0}")]
    InvalidLength(usize),
    #[error("invalid character in commit id: {0}")]
    InvalidCharacter(char),
    #[error("unsupported bucket location: {0}")]
    UnsupportedScheme(String),
    #[error("bucket name missing in {0}")]
    MissingBucket(String),
}

/// A full 40-character hexadecimal commit identifier.
///
/// Only constructible through [`FromStr`], so holding one proves the id is
/// well formed. Stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommitId(String);

impl CommitId {
    /// Returns the commit id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for CommitId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseError::Empty);
        }

        if let Some(c) = s.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(ParseError::InvalidCharacter(c));
        }

        if s.len() != COMMIT_ID_LEN {
            return Err(ParseError::InvalidLength(s.len()));
        }

        Ok(CommitId(s.to_ascii_lowercase()))
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The caller's target revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevisionSpec {
    /// Current tip of the named branch.
    Floating { branch: String },
    /// One immutable commit. The branch is kept as the fallback fetch target.
    Pinned { commit: CommitId, branch: String },
}

impl RevisionSpec {
    /// Build a spec from the raw commit input and its paired branch name.
    ///
    /// An empty commit or the literal `HEAD` yields [`RevisionSpec::Floating`].
    /// Anything else must parse as a full [`CommitId`].
    pub fn from_inputs(commit: &str, branch: &str) -> Result<Self, ParseError> {
        let commit = commit.trim();
        if commit.is_empty() || commit == HEAD_PLACEHOLDER {
            return Ok(RevisionSpec::Floating {
                branch: branch.to_string(),
            });
        }

        Ok(RevisionSpec::Pinned {
            commit: commit.parse()?,
            branch: branch.to_string(),
        })
    }

    /// The branch that is fetched when the commit is floating or unreachable.
    pub fn branch(&self) -> &str {
        match self {
            RevisionSpec::Floating { branch } | RevisionSpec::Pinned { branch, .. } => branch,
        }
    }
}

impl fmt::Display for RevisionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RevisionSpec::Floating { branch } => write!(f, "{} (tip)", branch),
            RevisionSpec::Pinned { commit, branch } => write!(f, "{} on {}", commit, branch),
        }
    }
}

/// Where cache snapshots live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketLocation {
    /// A Google Cloud Storage bucket, optionally narrowed by an object prefix.
    Gcs { bucket: String, prefix: String },
    /// A directory on the local filesystem.
    Local(PathBuf),
}

impl FromStr for BucketLocation {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseError::Empty);
        }

        if let Some(rest) = s.strip_prefix("gs://") {
            let (bucket, prefix) = match rest.split_once('/') {
                Some((bucket, prefix)) => (bucket, prefix),
                None => (rest, ""),
            };
            if bucket.is_empty() {
                return Err(ParseError::MissingBucket(s.to_string()));
            }
            return Ok(BucketLocation::Gcs {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
            });
        }

        if let Some(path) = s.strip_prefix("file://") {
            return Ok(BucketLocation::Local(PathBuf::from(path)));
        }

        if s.contains("://") {
            return Err(ParseError::UnsupportedScheme(s.to_string()));
        }

        Ok(BucketLocation::Local(PathBuf::from(s)))
    }
}

impl fmt::Display for BucketLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BucketLocation::Gcs { bucket, prefix } => write!(f, "gs://{}/{}", bucket, prefix),
            BucketLocation::Local(path) => write!(f, "{}", path.display()),
        }
    }
}
