// SPDX-License-Identifier: GPL-3.0-only
//! Error types for DSC discovery and register access
//!
//! Per-device failures (`ShortRead`, `Io`) are contained to the device that
//! raised them. `PermissionDenied` aborts the whole run since no other aux
//! node will be accessible either.

use std::path::PathBuf;

use thiserror::Error;

use crate::discovery::Target;

/// Main error type
#[derive(Error, Debug)]
pub enum DscError {
    /// The caller lacks the privilege to open an aux device node
    #[error("Permission denied opening {}: run as root or use sudo", path.display())]
    PermissionDenied { path: PathBuf },

    /// The panel returned no data for the register (usually powered off)
    #[error("Could not read DPCD[0x{offset:03X}] from {}", path.display())]
    ShortRead { path: PathBuf, offset: u64 },

    /// Any other register I/O failure
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Discovery produced an empty device set
    #[error("No connected {target} drm_dp_aux device node found")]
    NoDevicesFound { target: Target },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// udev enumeration or monitoring failed
    #[error("udev error: {0}")]
    Udev(#[source] std::io::Error),

    /// Another watcher already holds the instance lock
    #[error("Another watcher is already running (lock held on {})", path.display())]
    AlreadyRunning { path: PathBuf },
}

impl DscError {
    /// Map an I/O error on `path`, promoting permission failures
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            DscError::PermissionDenied { path }
        } else {
            DscError::Io { path, source }
        }
    }

    /// Whether this error must terminate the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(self, DscError::PermissionDenied { .. })
    }
}

/// Result type alias for DscError
pub type Result<T> = std::result::Result<T, DscError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn test_permission_errors_are_promoted() {
        let err = DscError::from_io("/dev/drm_dp_aux0", Error::from(ErrorKind::PermissionDenied));
        assert!(matches!(err, DscError::PermissionDenied { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_other_io_errors_are_per_device() {
        let err = DscError::from_io("/dev/drm_dp_aux0", Error::from(ErrorKind::TimedOut));
        assert!(matches!(err, DscError::Io { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_short_read_message() {
        let err = DscError::ShortRead {
            path: "/dev/drm_dp_aux2".into(),
            offset: 0x160,
        };
        assert_eq!(err.to_string(), "Could not read DPCD[0x160] from /dev/drm_dp_aux2");
    }
}
