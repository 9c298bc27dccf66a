use std::fs;
use std::path::{Path, PathBuf};

use crate::connector::AUX_ENTRY_PREFIX;
use crate::context::DeviceContext;

#[derive(Debug, Clone)]
pub struct PermissionCheckResult {
    pub requirements: Vec<PermissionRequirement>,
}

#[derive(Debug, Clone)]
pub struct PermissionRequirement {
    pub name: String,
    pub description: String,
    pub status: RequirementStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequirementStatus {
    Met,
    NotMet,
    NotApplicable,
    Partial,  // Some nodes accessible, but not all (informational, not blocking)
}

impl std::fmt::Display for RequirementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequirementStatus::Met => write!(f, "ok"),
            RequirementStatus::NotMet => write!(f, "MISSING"),
            RequirementStatus::NotApplicable => write!(f, "n/a"),
            RequirementStatus::Partial => write!(f, "partial"),
        }
    }
}

impl PermissionCheckResult {
    pub fn has_issues(&self) -> bool {
        self.requirements.iter().any(|r| r.status == RequirementStatus::NotMet)
    }

    pub fn summary(&self) -> String {
        let not_met: Vec<_> = self.requirements
            .iter()
            .filter(|r| r.status == RequirementStatus::NotMet)
            .collect();

        if not_met.is_empty() {
            let met_count = self.requirements.iter().filter(|r| r.status == RequirementStatus::Met).count();
            format!("All {} requirements met", met_count)
        } else {
            let names: Vec<_> = not_met.iter().map(|r| r.name.as_str()).collect();
            format!("{} requirement(s) not met: {}", not_met.len(), names.join(", "))
        }
    }
}

/// Check whether this process can reach the aux device nodes
///
/// Informational: the authoritative failure is still `PermissionDenied`
/// when a node is opened.
pub fn check_aux_permissions(ctx: &DeviceContext) -> PermissionCheckResult {
    let mut requirements = Vec::new();

    // 1. Aux device nodes present
    let aux_devices = find_aux_devices(ctx.dev_root());
    requirements.push(PermissionRequirement {
        name: "AUX devices".to_string(),
        description: if aux_devices.is_empty() {
            format!("No {}/{}* devices found", ctx.dev_root().display(), AUX_ENTRY_PREFIX)
        } else {
            format!("Found {} AUX device(s)", aux_devices.len())
        },
        status: if aux_devices.is_empty() {
            RequirementStatus::NotMet
        } else {
            RequirementStatus::Met
        },
    });

    // 2. Read/write access (DSC enable needs both)
    let accessible_count = aux_devices.iter()
        .filter(|d| can_read_write(d))
        .count();

    requirements.push(PermissionRequirement {
        name: "AUX read/write access".to_string(),
        description: if aux_devices.is_empty() {
            "N/A".to_string()
        } else if accessible_count == aux_devices.len() {
            format!("Can access all {} device(s)", accessible_count)
        } else if accessible_count > 0 {
            format!("Can access {}/{} device(s)", accessible_count, aux_devices.len())
        } else {
            "Cannot access any AUX devices".to_string()
        },
        status: if aux_devices.is_empty() {
            RequirementStatus::NotApplicable
        } else if accessible_count == aux_devices.len() {
            RequirementStatus::Met
        } else if accessible_count > 0 {
            RequirementStatus::Partial
        } else {
            RequirementStatus::NotMet
        },
    });

    // 3. Running as root
    let root = is_root();
    requirements.push(PermissionRequirement {
        name: "root".to_string(),
        description: if root {
            "Running as root".to_string()
        } else {
            "Not running as root (use sudo or a system service)".to_string()
        },
        status: if root {
            RequirementStatus::Met
        } else if accessible_count > 0 {
            // udev rules may grant access without root
            RequirementStatus::NotApplicable
        } else {
            RequirementStatus::NotMet
        },
    });

    PermissionCheckResult { requirements }
}

/// Find all aux device nodes
fn find_aux_devices(dev_root: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dev_root) else {
        return Vec::new();
    };

    let mut devices: Vec<PathBuf> = entries
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().starts_with(AUX_ENTRY_PREFIX))
        .map(|e| e.path())
        .collect();
    devices.sort();
    devices
}

fn can_read_write(path: &Path) -> bool {
    fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .is_ok()
}

fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::tests::FakeTree;

    #[test]
    fn test_no_aux_devices() {
        let tree = FakeTree::new();
        let result = check_aux_permissions(&tree.ctx());

        assert_eq!(result.requirements[0].status, RequirementStatus::NotMet);
        assert_eq!(result.requirements[1].status, RequirementStatus::NotApplicable);
        assert!(result.has_issues());
        assert!(result.summary().contains("AUX devices"));
    }

    #[test]
    fn test_accessible_aux_devices() {
        let tree = FakeTree::new();
        tree.connector("card1-DP-3", Some("connected"), &[("drm_dp_aux3", true)]);
        tree.connector("card1-DP-4", Some("connected"), &[("drm_dp_aux4", true)]);

        let result = check_aux_permissions(&tree.ctx());
        assert_eq!(result.requirements[0].description, "Found 2 AUX device(s)");
        assert_eq!(result.requirements[1].status, RequirementStatus::Met);
        // Files we created are always accessible, so root is never blocking here
        assert!(!result.has_issues());
    }
}
