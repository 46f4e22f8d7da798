//! Directory lock for dump + rotation runs.
//!
//! Two incremental runs into the same directory must not interleave their cleanup
//! with each other's writes, so `backup_database` holds an exclusive advisory lock
//! (fs2) for the whole write → rename → cleanup sequence.
//!
//! Lock file path: <backup dir>/.sqlbackup.lock (hidden, never matched by rotation).
//! Lock is released on Drop.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

pub const LOCK_FILE: &str = ".sqlbackup.lock";

pub struct LockGuard {
    file: std::fs::File,
    path: PathBuf,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // fs2 unlock errors on drop are ignored deliberately.
        let _ = self.file.unlock();
    }
}

fn lock_file_path(dir: &Path) -> PathBuf {
    dir.join(LOCK_FILE)
}

fn open_lock_file(dir: &Path) -> Result<std::fs::File> {
    let path = lock_file_path(dir);
    let f = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(&path)
        .with_context(|| format!("open lock file {}", path.display()))?;
    Ok(f)
}

/// Acquire the directory lock. Blocks until acquired.
pub fn acquire_dir_lock(dir: &Path) -> Result<LockGuard> {
    let file = open_lock_file(dir)?;
    let path = lock_file_path(dir);
    file.lock_exclusive()
        .with_context(|| format!("lock_exclusive {}", path.display()))?;
    Ok(LockGuard { file, path })
}

/// Non-blocking variant. Returns Err if another run holds the lock.
pub fn try_acquire_dir_lock(dir: &Path) -> Result<LockGuard> {
    let file = open_lock_file(dir)?;
    let path = lock_file_path(dir);
    file.try_lock_exclusive()
        .with_context(|| format!("try_lock_exclusive failed: {}", path.display()))?;
    Ok(LockGuard { file, path })
}
