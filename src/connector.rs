// SPDX-License-Identifier: GPL-3.0-only
//! Connector classification
//!
//! Each DRM connector is classified exactly once into a [`ConnectorKind`];
//! everything downstream matches on the kind instead of re-parsing names.

use std::fs;
use std::path::{Path, PathBuf};

use crate::context::DeviceContext;

/// Marker token in the connector name of a built-in panel
pub const INTERNAL_PANEL_MARKER: &str = "eDP";

/// Prefix of the aux channel entries inside a connector directory
pub const AUX_ENTRY_PREFIX: &str = "drm_dp_aux";

/// Port-type tokens that may precede a chain position
const PORT_TOKENS: &[&str] = &["DP", "eDP", "HDMI", "DVI", "USB"];

/// What a connector feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorKind {
    /// Built-in laptop panel
    InternalPanel,
    /// External monitor on its own port
    External,
    /// External monitor behind an MST hub, at `position` in the chain
    DaisyChained { position: u32 },
}

impl ConnectorKind {
    /// Classify a connector from its name
    ///
    /// Daisy-chained names carry at least four dash-delimited segments, the
    /// second-to-last starting with a port-type token and the last numeric,
    /// e.g. `card1-DP-1-DP-2`. This follows the amdgpu/i915 naming seen in
    /// sysfs and needs revalidating on other drivers.
    pub fn from_name(name: &str) -> Self {
        if name.contains(INTERNAL_PANEL_MARKER) {
            return ConnectorKind::InternalPanel;
        }

        let segments: Vec<&str> = name.split('-').collect();
        if segments.len() >= 4 {
            let port = segments[segments.len() - 2];
            let last = segments[segments.len() - 1];
            if PORT_TOKENS.iter().any(|t| port.starts_with(t)) {
                if let Ok(position) = last.parse::<u32>() {
                    return ConnectorKind::DaisyChained { position };
                }
            }
        }

        ConnectorKind::External
    }

    pub fn is_internal_panel(&self) -> bool {
        matches!(self, ConnectorKind::InternalPanel)
    }

    pub fn is_daisy_chained(&self) -> bool {
        matches!(self, ConnectorKind::DaisyChained { .. })
    }
}

impl std::fmt::Display for ConnectorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectorKind::InternalPanel => write!(f, "internal"),
            ConnectorKind::External => write!(f, "external"),
            ConnectorKind::DaisyChained { position } => write!(f, "daisy-chain #{}", position),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    /// The status attribute was missing or unreadable
    Unknown,
}

impl ConnectionStatus {
    /// Only the exact string `connected` counts as connected
    pub fn from_attribute(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("connected") => ConnectionStatus::Connected,
            Some(_) => ConnectionStatus::Disconnected,
            None => ConnectionStatus::Unknown,
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// A classified DRM connector and its aux device nodes
#[derive(Debug, Clone, PartialEq)]
pub struct Connector {
    /// Full sysfs name, e.g. `card1-DP-3`
    pub name: String,
    pub kind: ConnectorKind,
    pub status: ConnectionStatus,
    /// Aux device nodes that exist on the filesystem
    pub aux_nodes: Vec<PathBuf>,
}

impl Connector {
    /// Name without the `cardN-` prefix, e.g. `DP-3`
    pub fn short_name(&self) -> &str {
        short_name(&self.name)
    }
}

pub fn short_name(name: &str) -> &str {
    match name.split_once('-') {
        Some((card, rest)) if card.starts_with("card") => rest,
        _ => name,
    }
}

/// Walk `<sysfs>/class/drm` and classify every connector directory
///
/// A missing tree yields an empty list.
pub fn scan_sysfs(ctx: &DeviceContext) -> Vec<Connector> {
    let drm_dir = ctx.drm_class_dir();
    let entries = match fs::read_dir(&drm_dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Can't list {}: {}", drm_dir.display(), e);
            return Vec::new();
        }
    };

    let mut connectors = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();

        // Connector entries look like "card1-DP-3"; skip "card1", "renderD128", "version"
        if !name.starts_with("card") || !name.contains('-') {
            continue;
        }

        let dir = entry.path();
        let status = ConnectionStatus::from_attribute(read_attr(&dir, "status").as_deref());
        let connector = Connector {
            kind: ConnectorKind::from_name(&name),
            status,
            aux_nodes: aux_nodes(ctx, &dir),
            name,
        };
        debug!(
            "Connector {}: {} / {} / {} aux node(s)",
            connector.name,
            connector.kind,
            connector.status,
            connector.aux_nodes.len()
        );
        connectors.push(connector);
    }

    connectors.sort_by(|a, b| a.name.cmp(&b.name));
    connectors
}

/// Map the `drm_dp_aux*` children of a connector to existing device nodes
fn aux_nodes(ctx: &DeviceContext, connector_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(connector_dir) else {
        return Vec::new();
    };

    let mut nodes: Vec<PathBuf> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            name.starts_with(AUX_ENTRY_PREFIX).then(|| ctx.dev_node(&name))
        })
        .filter(|node| {
            let exists = node.exists();
            if !exists {
                debug!("Aux node {} has no device node, skipping", node.display());
            }
            exists
        })
        .collect();
    nodes.sort();
    nodes
}

/// Read a sysfs text attribute, trimmed; `None` if missing or unreadable
pub fn read_attr(dir: &Path, attr: &str) -> Option<String> {
    fs::read_to_string(dir.join(attr))
        .ok()
        .map(|s| s.trim().to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Fake sysfs + dev tree
    pub(crate) struct FakeTree {
        pub dir: TempDir,
    }

    impl FakeTree {
        pub fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            fs::create_dir_all(dir.path().join("sys/class/drm")).unwrap();
            fs::create_dir_all(dir.path().join("dev")).unwrap();
            fs::create_dir_all(dir.path().join("debug/dri")).unwrap();
            Self { dir }
        }

        pub fn ctx(&self) -> DeviceContext {
            let root = self.dir.path();
            DeviceContext::new(root.join("sys"), root.join("dev"), root.join("debug"))
        }

        /// Add a connector with an optional status and aux entries.
        /// `with_node` controls whether the /dev node is created.
        pub fn connector(&self, name: &str, status: Option<&str>, aux: &[(&str, bool)]) {
            let dir = self.dir.path().join("sys/class/drm").join(name);
            fs::create_dir_all(&dir).unwrap();
            if let Some(status) = status {
                fs::write(dir.join("status"), format!("{}\n", status)).unwrap();
            }
            for (aux_name, with_node) in aux {
                fs::create_dir_all(dir.join(aux_name)).unwrap();
                if *with_node {
                    let mut space = vec![0u8; 0x200];
                    space[0x160] = 0;
                    fs::write(self.dir.path().join("dev").join(aux_name), space).unwrap();
                }
            }
        }
    }

    #[test]
    fn test_internal_panel_marker() {
        assert_eq!(ConnectorKind::from_name("card1-eDP-1"), ConnectorKind::InternalPanel);
        assert!(ConnectorKind::from_name("card0-eDP-1").is_internal_panel());
    }

    #[test]
    fn test_direct_external() {
        assert_eq!(ConnectorKind::from_name("card1-DP-3"), ConnectorKind::External);
        assert_eq!(ConnectorKind::from_name("card1-HDMI-A-1"), ConnectorKind::External);
        assert_eq!(ConnectorKind::from_name("DP-1"), ConnectorKind::External);
        assert!(!ConnectorKind::from_name("card1-DP-3").is_daisy_chained());
    }

    #[test]
    fn test_daisy_chained() {
        assert_eq!(
            ConnectorKind::from_name("card1-DP-1-DP-2"),
            ConnectorKind::DaisyChained { position: 2 }
        );
        assert!(ConnectorKind::from_name("card0-DP-5-DP-12").is_daisy_chained());
    }

    #[test]
    fn test_daisy_chain_needs_numeric_tail_and_port_token() {
        // Four segments but the tail isn't a position
        assert_eq!(ConnectorKind::from_name("card1-DP-1-DP"), ConnectorKind::External);
        // Four segments, numeric tail, no port token before it
        assert_eq!(ConnectorKind::from_name("card1-DP-1-2"), ConnectorKind::External);
    }

    #[test]
    fn test_status_attribute() {
        assert_eq!(ConnectionStatus::from_attribute(Some("connected\n")), ConnectionStatus::Connected);
        assert_eq!(ConnectionStatus::from_attribute(Some("disconnected")), ConnectionStatus::Disconnected);
        assert_eq!(ConnectionStatus::from_attribute(Some("Connected")), ConnectionStatus::Disconnected);
        assert_eq!(ConnectionStatus::from_attribute(None), ConnectionStatus::Unknown);
    }

    #[test]
    fn test_short_name() {
        assert_eq!(short_name("card1-DP-3"), "DP-3");
        assert_eq!(short_name("DP-3"), "DP-3");
    }

    #[test]
    fn test_scan_sysfs() {
        let tree = FakeTree::new();
        tree.connector("card1-eDP-1", Some("connected"), &[("drm_dp_aux0", true)]);
        tree.connector("card1-DP-3", Some("connected"), &[("drm_dp_aux3", true), ("drm_dp_aux4", false)]);
        tree.connector("card1-HDMI-A-1", None, &[]);
        fs::create_dir_all(tree.dir.path().join("sys/class/drm/card1")).unwrap();
        fs::write(tree.dir.path().join("sys/class/drm/version"), "drm 1.1.0").unwrap();

        let connectors = scan_sysfs(&tree.ctx());
        let names: Vec<_> = connectors.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["card1-DP-3", "card1-HDMI-A-1", "card1-eDP-1"]);

        let dp = &connectors[0];
        assert_eq!(dp.kind, ConnectorKind::External);
        assert_eq!(dp.status, ConnectionStatus::Connected);
        assert_eq!(dp.aux_nodes, vec![tree.dir.path().join("dev/drm_dp_aux3")]);

        assert_eq!(connectors[1].status, ConnectionStatus::Unknown);
        assert!(connectors[1].aux_nodes.is_empty());
        assert_eq!(connectors[2].kind, ConnectorKind::InternalPanel);
    }

    #[test]
    fn test_scan_missing_tree() {
        let ctx = DeviceContext::new("/nonexistent/sys", "/nonexistent/dev", "/nonexistent/debug");
        assert!(scan_sysfs(&ctx).is_empty());
    }
}
