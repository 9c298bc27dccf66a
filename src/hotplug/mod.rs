// SPDX-License-Identifier: GPL-3.0-only
//! Dock hot-plug watching using udev
//!
//! A dedicated thread owns the udev monitor socket and forwards Thunderbolt
//! events over a bounded channel to the async watcher, which filters them,
//! waits for the dock to settle and runs one update pass at a time.

mod lock;
mod udev_monitor;
mod watcher;

use std::path::PathBuf;

pub use lock::{InstanceLock, default_lock_dir};
pub use udev_monitor::spawn_monitor_thread;
pub use watcher::{DockWatcher, Trigger};

use crate::dock::DockFilter;

/// Kind of hot-plug notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DockAction {
    Add,
    Remove,
    Other,
}

/// One hot-plug notification on the expansion bus
#[derive(Debug, Clone)]
pub struct DockEvent {
    pub action: DockAction,
    pub subsystem: String,
    pub sys_path: PathBuf,
}

impl DockEvent {
    #[cfg(test)]
    pub fn new(action: DockAction, sys_path: impl Into<PathBuf>) -> Self {
        Self {
            action,
            subsystem: udev_monitor::THUNDERBOLT_SUBSYSTEM.to_string(),
            sys_path: sys_path.into(),
        }
    }

    /// Lower-cased "vendor device" string of the emitting device
    pub fn identity(&self) -> String {
        DockFilter::identity(&self.sys_path)
    }
}
