//! Cache snapshots: listing, selection, download and extraction.

mod restore;
mod store;

pub(crate) use restore::reset_dir;
pub use restore::{ArchiveKind, CacheRestorer, select_latest};
pub use store::{GcsStore, LocalStore, SnapshotStore, open_store};

use thiserror::Error;

/// Errors returned while restoring a working directory from a snapshot.
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// The store answered with an HTTP error status.
    #[error("{url} returned HTTP {status}")]
    Http { url: String, status: u16 },
    /// The store could not be reached.
    #[error("transport error: {0}")]
    Transport(String),
    /// The object listing could not be decoded.
    #[error("failed to parse object listing: {0}")]
    Parse(#[from] serde_json::Error),
    /// No snapshot objects exist at the location.
    #[error("no snapshots found at {0}")]
    Empty(String),
    /// The selected object is not an archive we know how to unpack.
    #[error("unsupported snapshot archive: {0}")]
    UnsupportedArchive(String),
    /// The extracted snapshot is not a usable repository.
    #[error("snapshot {0} did not produce a git repository")]
    NotARepository(String),
    /// An interrupt arrived mid-download.
    #[error("snapshot download interrupted")]
    Interrupted,
    /// Underlying IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ureq::Error> for SnapshotError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(status, response) => SnapshotError::Http {
                url: response.get_url().to_string(),
                status,
            },
            ureq::Error::Transport(e) => SnapshotError::Transport(e.to_string()),
        }
    }
}
