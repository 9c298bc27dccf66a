// SPDX-License-Identifier: GPL-3.0-only
//! `drm_dp_aux` character device backend

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::DpcdRegister;
use crate::error::{DscError, Result};

/// An open aux channel
///
/// Generic over the handle so the same seek/transfer logic runs against
/// an in-memory buffer in tests.
pub struct AuxChannel<F = File> {
    path: PathBuf,
    handle: F,
}

impl AuxChannel<File> {
    /// Open an aux device node for read/write
    ///
    /// Fails with `PermissionDenied` when the caller is not privileged.
    pub fn open(path: &Path) -> Result<Self> {
        let handle = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| DscError::from_io(path, e))?;
        Ok(Self::new(path, handle))
    }
}

impl<F> AuxChannel<F> {
    pub fn new(path: impl Into<PathBuf>, handle: F) -> Self {
        Self {
            path: path.into(),
            handle,
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> F {
        self.handle
    }
}

impl<F: Read + Write + Seek> DpcdRegister for AuxChannel<F> {
    fn read_byte(&mut self, offset: u64) -> Result<u8> {
        self.handle
            .seek(SeekFrom::Start(offset))
            .map_err(|e| DscError::from_io(&self.path, e))?;

        let mut buf = [0u8; 1];
        let n = self
            .handle
            .read(&mut buf)
            .map_err(|e| DscError::from_io(&self.path, e))?;
        if n < 1 {
            return Err(DscError::ShortRead {
                path: self.path.clone(),
                offset,
            });
        }
        Ok(buf[0])
    }

    fn write_byte(&mut self, offset: u64, value: u8) -> Result<()> {
        self.handle
            .seek(SeekFrom::Start(offset))
            .map_err(|e| DscError::from_io(&self.path, e))?;
        self.handle
            .write_all(&[value])
            .and_then(|_| self.handle.flush())
            .map_err(|e| DscError::from_io(&self.path, e))
    }
}

impl<F> std::fmt::Debug for AuxChannel<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AuxChannel({})", self.path.display())
    }
}
