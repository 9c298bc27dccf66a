// SPDX-License-Identifier: GPL-3.0-only
//! Configuration file loading
//!
//! The configuration is a small KDL document. Every node is optional:
//!
//! ```kdl
//! decode "exact"
//! write "conservative"
//! settle-delay-secs 5
//! dock-keywords "thunderbolt" "dock"
//! sysfs-root "/sys"
//! dev-root "/dev"
//! debugfs-root "/sys/kernel/debug"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use kdl::{KdlDocument, KdlValue};

use crate::dsc::{DecodePolicy, WritePolicy};
use crate::error::{DscError, Result};

pub const APP_NAME: &str = "dock-dsc";
pub const CONFIG_FILE: &str = "config.kdl";

const DEFAULT_SETTLE_SECS: u64 = 5;
const DEFAULT_DOCK_KEYWORDS: &[&str] = &["thunderbolt", "dock"];

const KNOWN_NODES: &[&str] = &[
    "decode",
    "write",
    "settle-delay-secs",
    "dock-keywords",
    "sysfs-root",
    "dev-root",
    "debugfs-root",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub decode: DecodePolicy,
    pub write: WritePolicy,
    /// Wait between a qualifying dock attach and discovery
    pub settle_delay: Duration,
    /// Every keyword must appear in the dock's vendor/device names
    pub dock_keywords: Vec<String>,
    pub sysfs_root: PathBuf,
    pub dev_root: PathBuf,
    pub debugfs_root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            decode: DecodePolicy::default(),
            write: WritePolicy::default(),
            settle_delay: Duration::from_secs(DEFAULT_SETTLE_SECS),
            dock_keywords: DEFAULT_DOCK_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            sysfs_root: PathBuf::from("/sys"),
            dev_root: PathBuf::from("/dev"),
            debugfs_root: PathBuf::from("/sys/kernel/debug"),
        }
    }
}

impl Config {
    /// Load the configuration from `explicit`, or from the first default
    /// location that exists. No file at all means defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => default_locations().into_iter().find(|p| p.is_file()),
        };

        let Some(path) = path else {
            debug!("No configuration file found, using defaults");
            return Ok(Self::default());
        };

        let text = std::fs::read_to_string(&path)
            .map_err(|e| DscError::Config(format!("can't read {}: {}", path.display(), e)))?;
        info!("Loading configuration from {}", path.display());
        Self::from_kdl(&text)
    }

    /// Parse a KDL document on top of the defaults
    pub fn from_kdl(text: &str) -> Result<Self> {
        let doc: KdlDocument = text
            .parse()
            .map_err(|e: kdl::KdlError| DscError::Config(e.to_string()))?;

        for node in doc.nodes() {
            let name = node.name().value();
            if !KNOWN_NODES.contains(&name) {
                warn!("Ignoring unknown configuration node '{}'", name);
            }
        }

        let mut config = Self::default();

        if let Some(value) = string_arg(&doc, "decode")? {
            config.decode = value.parse().map_err(DscError::Config)?;
        }
        if let Some(value) = string_arg(&doc, "write")? {
            config.write = value.parse().map_err(DscError::Config)?;
        }
        if let Some(value) = doc.get_arg("settle-delay-secs") {
            let secs = value
                .as_integer()
                .and_then(|v| u64::try_from(v).ok())
                .ok_or_else(|| DscError::Config(format!("settle-delay-secs must be a non-negative integer, got {}", value)))?;
            config.settle_delay = Duration::from_secs(secs);
        }
        if doc.get("dock-keywords").is_some() {
            config.dock_keywords = doc
                .iter_args("dock-keywords")
                .into_iter()
                .map(|v| as_str(v, "dock-keywords").map(str::to_lowercase))
                .collect::<Result<Vec<_>>>()?;
        }
        if let Some(value) = string_arg(&doc, "sysfs-root")? {
            config.sysfs_root = PathBuf::from(value);
        }
        if let Some(value) = string_arg(&doc, "dev-root")? {
            config.dev_root = PathBuf::from(value);
        }
        if let Some(value) = string_arg(&doc, "debugfs-root")? {
            config.debugfs_root = PathBuf::from(value);
        }

        Ok(config)
    }
}

/// `$XDG_CONFIG_HOME/dock-dsc/config.kdl`, then `/etc/dock-dsc/config.kdl`
pub fn default_locations() -> Vec<PathBuf> {
    let mut locations = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        locations.push(dir.join(APP_NAME).join(CONFIG_FILE));
    }
    locations.push(Path::new("/etc").join(APP_NAME).join(CONFIG_FILE));
    locations
}

fn string_arg<'a>(doc: &'a KdlDocument, name: &str) -> Result<Option<&'a str>> {
    doc.get_arg(name).map(|v| as_str(v, name)).transpose()
}

fn as_str<'a>(value: &'a KdlValue, name: &str) -> Result<&'a str> {
    value
        .as_string()
        .ok_or_else(|| DscError::Config(format!("{} expects a string, got {}", name, value)))
}
