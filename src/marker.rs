//! Success markers for an external job coordinator.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Written as `<dir>/<job id>.success` after a successful checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessMarker {
    pub job_id: String,
    pub commit: String,
    pub branch: String,
    /// Seconds since the unix epoch.
    pub completed_at: u64,
}

impl SuccessMarker {
    pub fn new(job_id: &str, commit: &str, branch: &str) -> Self {
        let completed_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            job_id: job_id.to_string(),
            commit: commit.to_string(),
            branch: branch.to_string(),
            completed_at,
        }
    }

    pub fn path(dir: &Path, job_id: &str) -> PathBuf {
        dir.join(format!("{}.success", job_id))
    }

    /// Write the marker atomically, replacing any previous one for this job.
    pub fn write(&self, dir: &Path) -> io::Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = Self::path(dir, &self.job_id);

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, self)?;
        tmp.write_all(b"\n")?;
        tmp.persist(&path).map_err(|e| e.error)?;

        log::info!("Wrote success marker {}", path.display());
        Ok(path)
    }
}
