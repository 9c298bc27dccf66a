// SPDX-License-Identifier: GPL-3.0-only
//! Device discovery
//!
//! Turns classified connectors into the set of aux devices to act on for
//! this run. Discovery only reads metadata; it never opens a device node.
//!
//! Two backends feed the same selection step:
//! - `Sysfs` walks `<sysfs>/class/drm` directly
//! - `Udev` enumerates the `drm_dp_aux_dev` subsystem and groups nodes by
//!   their parent connector

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::connector::{self, ConnectionStatus, Connector, ConnectorKind};
use crate::context::DeviceContext;
use crate::error::{DscError, Result};

const AUX_SUBSYSTEM: &str = "drm_dp_aux_dev";

/// Which side of the machine to act on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Target {
    /// Monitors attached directly or through a dock
    #[default]
    External,
    /// The built-in laptop panel
    Internal,
}

impl Target {
    fn accepts(&self, kind: ConnectorKind) -> bool {
        match self {
            Target::External => !kind.is_internal_panel(),
            Target::Internal => kind.is_internal_panel(),
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::External => write!(f, "external"),
            Target::Internal => write!(f, "internal (eDP)"),
        }
    }
}

impl std::str::FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "external" => Ok(Target::External),
            "internal" => Ok(Target::Internal),
            other => Err(format!("unknown target '{}' (expected external or internal)", other)),
        }
    }
}

/// How connectors are found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    #[default]
    Sysfs,
    Udev,
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "sysfs" => Ok(Backend::Sysfs),
            "udev" => Ok(Backend::Udev),
            other => Err(format!("unknown backend '{}' (expected sysfs or udev)", other)),
        }
    }
}

/// Selection rules for one discovery pass
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub target: Target,
    /// Connectors already known to be connected (full `card1-DP-3` or short
    /// `DP-3` names). When set, membership replaces the status attribute.
    pub allow_list: Option<HashSet<String>>,
}

impl Selection {
    pub fn external() -> Self {
        Self {
            target: Target::External,
            allow_list: None,
        }
    }

    pub fn internal() -> Self {
        Self {
            target: Target::Internal,
            allow_list: None,
        }
    }

    pub fn with_allow_list<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow_list = Some(names.into_iter().map(Into::into).collect());
        self
    }

    fn is_connected(&self, connector: &Connector) -> bool {
        match &self.allow_list {
            Some(allowed) => {
                allowed.contains(&connector.name) || allowed.contains(connector.short_name())
            }
            None => connector.status == ConnectionStatus::Connected,
        }
    }
}

/// An aux device node selected for register access
#[derive(Debug, Clone, PartialEq)]
pub struct ControlChannelDevice {
    pub path: PathBuf,
    pub connector_name: String,
    pub kind: ConnectorKind,
    pub status: ConnectionStatus,
}

impl ControlChannelDevice {
    pub fn is_daisy_chained(&self) -> bool {
        self.kind.is_daisy_chained()
    }
}

/// Discover the actionable devices for `selection`
pub fn discover(
    ctx: &DeviceContext,
    selection: &Selection,
    backend: Backend,
) -> Result<Vec<ControlChannelDevice>> {
    let connectors = scan(ctx, backend)?;
    Ok(select(&connectors, selection))
}

/// Classified connectors as seen by `backend`
pub fn scan(ctx: &DeviceContext, backend: Backend) -> Result<Vec<Connector>> {
    match backend {
        Backend::Sysfs => Ok(connector::scan_sysfs(ctx)),
        Backend::Udev => scan_udev(ctx),
    }
}

/// Apply the target and connection rules to classified connectors
pub fn select(connectors: &[Connector], selection: &Selection) -> Vec<ControlChannelDevice> {
    let mut devices = Vec::new();

    for connector in connectors {
        if !selection.target.accepts(connector.kind) {
            continue;
        }
        if !selection.is_connected(connector) {
            debug!("Skipping {} ({})", connector.name, connector.status);
            continue;
        }
        if connector.aux_nodes.is_empty() {
            debug!("Connector {} has no aux device node", connector.name);
            continue;
        }

        for node in &connector.aux_nodes {
            info!(
                connector = %connector.name,
                device = %node.display(),
                "Found {} aux node",
                connector.kind
            );
            devices.push(ControlChannelDevice {
                path: node.clone(),
                connector_name: connector.name.clone(),
                kind: connector.kind,
                status: ConnectionStatus::Connected,
            });
        }
    }

    devices
}

/// Build connectors from the udev `drm_dp_aux_dev` subsystem
fn scan_udev(ctx: &DeviceContext) -> Result<Vec<Connector>> {
    let mut enumerator = ctx.enumerator(AUX_SUBSYSTEM).map_err(DscError::Udev)?;
    let mut by_name: BTreeMap<String, Connector> = BTreeMap::new();

    for device in enumerator.scan_devices().map_err(DscError::Udev)? {
        let Some(node) = device.devnode() else {
            continue;
        };
        let Some(parent) = device.parent() else {
            debug!("Aux device {:?} has no parent connector", device.syspath());
            continue;
        };

        let name = parent.sysname().to_string_lossy().to_string();
        let status = ConnectionStatus::from_attribute(
            parent.attribute_value("status").and_then(|v| v.to_str()),
        );

        let connector = by_name.entry(name.clone()).or_insert_with(|| Connector {
            kind: ConnectorKind::from_name(&name),
            status,
            aux_nodes: Vec::new(),
            name,
        });
        if Path::new(node).exists() {
            connector.aux_nodes.push(node.to_path_buf());
        }
    }

    Ok(by_name.into_values().collect())
}
