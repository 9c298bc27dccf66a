// SPDX-License-Identifier: GPL-3.0-only
//! Single-instance guard for the watcher
//!
//! Two watchers would run overlapping write passes against the same panels,
//! so only the process holding this lock may subscribe.

use std::fs::File;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use crate::error::{DscError, Result};

const LOCK_FILE: &str = "dock-dsc-watch.lock";

/// Holds an exclusive `flock` for as long as it lives
#[derive(Debug)]
pub struct InstanceLock {
    _file: File,
    path: PathBuf,
}

impl InstanceLock {
    /// Take the lock in `dir`, failing fast if another process holds it
    pub fn acquire(dir: &Path) -> Result<Self> {
        let path = dir.join(LOCK_FILE);
        let file = File::create(&path).map_err(|e| DscError::from_io(&path, e))?;

        // flock is tied to the open file description, so a second open of
        // the same path conflicts even inside this process
        let lock_result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };

        if lock_result != 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
                return Err(DscError::AlreadyRunning { path });
            }
            return Err(DscError::from_io(&path, err));
        }

        debug!("Acquired watcher lock {}", path.display());
        Ok(Self { _file: file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Runtime dir of the user, or `/run` for system services
pub fn default_lock_dir() -> PathBuf {
    dirs::runtime_dir()
        .or_else(|| Some(PathBuf::from("/run")).filter(|p| p.is_dir()))
        .unwrap_or_else(|| PathBuf::from("/tmp"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_instance_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let first = InstanceLock::acquire(dir.path()).unwrap();
        assert_eq!(first.path(), dir.path().join(LOCK_FILE));

        let err = InstanceLock::acquire(dir.path()).unwrap_err();
        assert!(matches!(err, DscError::AlreadyRunning { .. }));

        drop(first);
        assert!(InstanceLock::acquire(dir.path()).is_ok());
    }

    #[test]
    fn test_unwritable_dir_is_an_error() {
        assert!(InstanceLock::acquire(Path::new("/nonexistent/run")).is_err());
    }
}
