use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;

/// Exclusive claim on a working directory for the length of one invocation.
///
/// The lock file sits next to the working directory (`.<name>.reposync.lock`)
/// so emptying or replacing the directory never touches it. The lock is
/// released when dropped, or by the OS if the process dies.
#[derive(Debug)]
pub struct WorkdirLock {
    file: File,
    path: PathBuf,
}

impl WorkdirLock {
    /// Lock file path for a working directory.
    pub fn lock_path(work_dir: &Path) -> PathBuf {
        let name = work_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "workdir".to_string());
        let parent = work_dir.parent().unwrap_or_else(|| Path::new("."));
        parent.join(format!(".{}.reposync.lock", name))
    }

    /// Try to lock `work_dir` without blocking.
    /// Returns None if another invocation holds the lock.
    pub fn try_acquire(work_dir: &Path) -> io::Result<Option<Self>> {
        let path = Self::lock_path(work_dir);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { file, path })),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Path of the held lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkdirLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
