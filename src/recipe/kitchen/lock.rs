// src/recipe/kitchen/lock.rs

//! Exclusive ownership of a cook's working directory
//!
//! A cook holds this lock for its whole lifetime. A second cook pointed at
//! the same working directory fails fast instead of interleaving writes
//! into the same source, build and package folders.

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Exclusive lock on `<workdir>/.cookbook.lock`
///
/// Released when dropped.
#[derive(Debug)]
pub struct WorkdirLock {
    /// The lock file handle (kept open to maintain lock)
    file: File,
    path: PathBuf,
}

impl WorkdirLock {
    pub const FILE_NAME: &'static str = ".cookbook.lock";

    /// Try to lock `workdir` without blocking
    pub fn acquire(workdir: &Path) -> Result<Self> {
        fs::create_dir_all(workdir).map_err(|e| {
            Error::IoError(format!(
                "Failed to create working directory {}: {}",
                workdir.display(),
                e
            ))
        })?;

        let path = workdir.join(Self::FILE_NAME);
        let file = File::create(&path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!("Acquired working directory lock at {}", path.display());
                Ok(Self { file, path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                Err(Error::Locked(workdir.display().to_string()))
            }
            Err(e) => Err(Error::IoError(format!(
                "Failed to lock working directory {}: {}",
                workdir.display(),
                e
            ))),
        }
    }

    /// Path to the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkdirLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
