// SPDX-License-Identifier: GPL-3.0-only
//! Device-subsystem context
//!
//! One `DeviceContext` is built in `main` and handed by reference to
//! discovery, firmware reporting and the hot-plug watcher. It owns the
//! filesystem roots so the whole pipeline can be pointed at a fake tree.
//!
//! libudev handles are not `Send`, so the context mints them on demand
//! on the thread that uses them instead of holding one.

use std::path::{Path, PathBuf};

use crate::config::Config;

#[derive(Debug, Clone)]
pub struct DeviceContext {
    sysfs_root: PathBuf,
    dev_root: PathBuf,
    debugfs_root: PathBuf,
}

impl DeviceContext {
    pub fn new(
        sysfs_root: impl Into<PathBuf>,
        dev_root: impl Into<PathBuf>,
        debugfs_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            sysfs_root: sysfs_root.into(),
            dev_root: dev_root.into(),
            debugfs_root: debugfs_root.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.sysfs_root, &config.dev_root, &config.debugfs_root)
    }

    /// `<sysfs>/class/drm`, where connector directories live
    pub fn drm_class_dir(&self) -> PathBuf {
        self.sysfs_root.join("class").join("drm")
    }

    /// `<debugfs>/dri`, where per-adapter firmware info lives
    pub fn dri_debug_dir(&self) -> PathBuf {
        self.debugfs_root.join("dri")
    }

    /// Device node for an aux channel entry such as `drm_dp_aux3`
    pub fn dev_node(&self, name: &str) -> PathBuf {
        self.dev_root.join(name)
    }

    pub fn dev_root(&self) -> &Path {
        &self.dev_root
    }

    /// Enumerator scoped to `subsystem`
    pub fn enumerator(&self, subsystem: &str) -> std::io::Result<udev::Enumerator> {
        let mut enumerator = udev::Enumerator::new()?;
        enumerator.match_subsystem(subsystem)?;
        Ok(enumerator)
    }

    /// Monitor socket delivering only events on `subsystem`
    pub fn monitor(&self, subsystem: &str) -> std::io::Result<udev::MonitorSocket> {
        udev::MonitorBuilder::new()?
            .match_subsystem(subsystem)?
            .listen()
    }
}
