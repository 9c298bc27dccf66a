// SPDX-License-Identifier: GPL-3.0-only
//! Display microcontroller firmware reporting
//!
//! Diagnostic only: the DMCUB version is logged alongside DSC changes since
//! DSC behaviour on amdgpu depends on it. Nothing here feeds a decision.

use std::fs;
use std::path::Path;

use crate::context::DeviceContext;

const FIRMWARE_INFO: &str = "amdgpu_firmware_info";
const DMCUB_MARKER: &str = "DMCUB";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareVersion {
    /// DRI minor number, e.g. `0` for `/sys/kernel/debug/dri/0`
    pub dri: u32,
    pub version: String,
}

/// DMCUB firmware versions of every DRI adapter that exposes one
///
/// Missing debugfs, adapters or files are skipped silently.
pub fn dmcub_versions(ctx: &DeviceContext) -> Vec<FirmwareVersion> {
    let Ok(entries) = fs::read_dir(ctx.dri_debug_dir()) else {
        return Vec::new();
    };

    let mut versions: Vec<FirmwareVersion> = entries
        .flatten()
        .filter_map(|entry| {
            let dri = entry.file_name().to_str()?.parse::<u32>().ok()?;
            Some((dri, entry.path()))
        })
        .flat_map(|(dri, dir)| {
            read_marker_versions(&dir)
                .into_iter()
                .map(move |version| FirmwareVersion { dri, version })
        })
        .collect();

    versions.sort_by_key(|v| v.dri);
    versions
}

/// Log the versions found
pub fn log_dmcub_versions(ctx: &DeviceContext) {
    for fw in dmcub_versions(ctx) {
        info!("DRI device {} DMCUB F/W version: {}", fw.dri, fw.version);
    }
}

fn read_marker_versions(dri_dir: &Path) -> Vec<String> {
    let Ok(text) = fs::read_to_string(dri_dir.join(FIRMWARE_INFO)) else {
        return Vec::new();
    };

    text.lines()
        .filter(|line| line.contains(DMCUB_MARKER))
        .filter_map(|line| line.split_whitespace().last())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::tests::FakeTree;

    const FIRMWARE_INFO_SAMPLE: &str = "\
VCE feature version: 0, firmware version: 0x00000000
DMCU feature version: 0, firmware version: 0x00000000
DMCUB feature version: 0, firmware version: 0x08004b00
SMC feature version: 0, program: 0, firmware version: 0x00415300 (65.83.0)
";

    #[test]
    fn test_reads_dmcub_lines() {
        let tree = FakeTree::new();
        let dri = tree.dir.path().join("debug/dri");
        fs::create_dir_all(dri.join("1")).unwrap();
        fs::write(dri.join("1").join(FIRMWARE_INFO), FIRMWARE_INFO_SAMPLE).unwrap();
        // Non-numeric entries and adapters without the file are ignored
        fs::create_dir_all(dri.join("0")).unwrap();
        fs::create_dir_all(dri.join("128")).unwrap();
        fs::write(dri.join("clients"), "").unwrap();

        assert_eq!(
            dmcub_versions(&tree.ctx()),
            vec![FirmwareVersion { dri: 1, version: "0x08004b00".to_string() }]
        );
    }

    #[test]
    fn test_missing_debugfs() {
        let tree = FakeTree::new();
        fs::remove_dir_all(tree.dir.path().join("debug")).unwrap();
        assert!(dmcub_versions(&tree.ctx()).is_empty());
    }
}
