use std::fs::{self, File};
use std::io::{self, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tempfile::NamedTempFile;

use super::{SnapshotError, SnapshotStore};

/// Archive formats a snapshot may be stored in, chosen by object name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    TarGz,
    Tar,
}

impl ArchiveKind {
    /// Detect the archive kind from an object name suffix.
    pub fn from_name(name: &str) -> Option<Self> {
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(ArchiveKind::TarGz)
        } else if name.ends_with(".tar") {
            Some(ArchiveKind::Tar)
        } else {
            None
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            ArchiveKind::TarGz => ".tar.gz",
            ArchiveKind::Tar => ".tar",
        }
    }
}

/// Pick the most recent snapshot by name.
///
/// Snapshot names embed their creation time, so the greatest name in
/// reverse lexicographic order is the newest.
pub fn select_latest(names: &[String]) -> Option<String> {
    let mut sorted = names.to_vec();
    sorted.sort_by(|a, b| b.cmp(a));
    sorted.into_iter().next()
}

/// Replaces a working directory with the newest snapshot from a store.
pub struct CacheRestorer<'a> {
    store: &'a dyn SnapshotStore,
    temp_dir: PathBuf,
}

impl<'a> CacheRestorer<'a> {
    pub fn new(store: &'a dyn SnapshotStore) -> Self {
        Self {
            store,
            temp_dir: std::env::temp_dir(),
        }
    }

    /// Download archives into `dir` instead of the system temp dir.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    /// Empty `work_dir` and unpack the newest snapshot into it.
    ///
    /// Returns the name of the restored snapshot. On any failure the
    /// working directory is left empty or partially extracted and the
    /// downloaded archive is removed.
    pub fn restore(&self, work_dir: &Path) -> Result<String, SnapshotError> {
        reset_dir(work_dir)?;

        let names = self.store.list()?;
        let name =
            select_latest(&names).ok_or_else(|| SnapshotError::Empty(self.store.location()))?;
        let kind = ArchiveKind::from_name(&name)
            .ok_or_else(|| SnapshotError::UnsupportedArchive(name.clone()))?;

        log::info!("Restoring {} from {}", name, self.store.location());

        let mut archive = tempfile::Builder::new()
            .prefix("reposync-snapshot-")
            .suffix(kind.suffix())
            .tempfile_in(&self.temp_dir)?;
        let bytes = self.store.download(&name, archive.as_file_mut())?;
        log::debug!(
            "Downloaded {} bytes to {}",
            bytes,
            archive.path().display()
        );

        extract(&mut archive, kind, work_dir)?;
        Ok(name)
    }
}

/// Remove everything under `dir`, leaving it present and empty.
pub(crate) fn reset_dir(dir: &Path) -> io::Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    fs::create_dir_all(dir)
}

fn extract(archive: &mut NamedTempFile, kind: ArchiveKind, dest: &Path) -> io::Result<()> {
    let file: &mut File = archive.as_file_mut();
    file.seek(SeekFrom::Start(0))?;
    let reader = BufReader::new(file);

    match kind {
        ArchiveKind::TarGz => unpack(tar::Archive::new(GzDecoder::new(reader)), dest),
        ArchiveKind::Tar => unpack(tar::Archive::new(reader), dest),
    }
}

fn unpack<R: io::Read>(mut archive: tar::Archive<R>, dest: &Path) -> io::Result<()> {
    archive.set_preserve_permissions(true);
    archive.set_overwrite(true);
    archive.unpack(dest)
}
