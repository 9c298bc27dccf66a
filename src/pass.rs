// SPDX-License-Identifier: GPL-3.0-only
//! One discovery-and-update pass
//!
//! Devices are processed one after another; each device's register I/O
//! completes before the next is opened.

use std::path::{Path, PathBuf};

use crate::context::DeviceContext;
use crate::discovery::{self, Backend, ControlChannelDevice, Selection};
use crate::dpcd::DpcdRegister;
use crate::dpcd::aux::AuxChannel;
use crate::dsc::{DscMachine, DscOutcome};
use crate::error::{DscError, Result};

/// What happened to each device in a pass
#[derive(Debug, Default)]
pub struct PassReport {
    pub outcomes: Vec<(PathBuf, DscOutcome)>,
    /// Devices skipped after a per-device failure
    pub failed: Vec<PathBuf>,
}

impl PassReport {
    pub fn changed(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.wrote()).count()
    }
}

/// Discover devices for `selection` and update each of them
///
/// An empty device set is `NoDevicesFound`; the watcher treats that as a
/// no-op while one-shot runs exit on it.
pub fn run(
    ctx: &DeviceContext,
    selection: &Selection,
    backend: Backend,
    machine: DscMachine,
) -> Result<PassReport> {
    let devices = discovery::discover(ctx, selection, backend)?;
    if devices.is_empty() {
        return Err(DscError::NoDevicesFound {
            target: selection.target,
        });
    }

    update_devices(&devices, machine, |path| AuxChannel::open(path))
}

/// Update every device, opening each through `open`
///
/// Per-device failures are logged and skipped. `PermissionDenied` aborts
/// the pass since no other node will open either.
pub fn update_devices<R, F>(
    devices: &[ControlChannelDevice],
    machine: DscMachine,
    mut open: F,
) -> Result<PassReport>
where
    R: DpcdRegister,
    F: FnMut(&Path) -> Result<R>,
{
    let mut report = PassReport::default();

    for device in devices {
        info!(
            connector = %device.connector_name,
            status = %device.status,
            "Examining AUX node: {}",
            device.path.display()
        );

        let result = open(&device.path).and_then(|mut reg| machine.update(device, &mut reg));
        match result {
            Ok(outcome) => report.outcomes.push((device.path.clone(), outcome)),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(
                    device = %device.path.display(),
                    "{}. If the panel is off, turn it on and try again.",
                    e
                );
                report.failed.push(device.path.clone());
            }
        }
    }

    info!(
        "Pass complete: {} device(s), {} changed, {} failed",
        devices.len(),
        report.changed(),
        report.failed.len()
    );
    Ok(report)
}
