use std::os::fd::AsRawFd;
use std::path::PathBuf;

use tokio::sync::mpsc;
use tokio::sync::oneshot;

use super::{DockAction, DockEvent};
use crate::context::DeviceContext;
use crate::error::{DscError, Result};

/// Subsystem of Thunderbolt/USB4 devices such as docks
pub const THUNDERBOLT_SUBSYSTEM: &str = "thunderbolt";

/// Monitors udev for Thunderbolt hot-plug events
///
/// This runs in a dedicated blocking thread because udev's MonitorSocket is not Send.
/// It uses libc::poll() to wait for events on the udev socket.
pub struct UdevMonitor {
    socket: udev::MonitorSocket,
}

impl UdevMonitor {
    /// Subscribe to the Thunderbolt subsystem only
    pub fn new(ctx: &DeviceContext) -> std::io::Result<Self> {
        let socket = ctx.monitor(THUNDERBOLT_SUBSYSTEM)?;
        Ok(Self { socket })
    }

    /// Run the monitoring loop, calling the callback for each event
    ///
    /// Blocks indefinitely. Returns only on a poll error or when the
    /// callback asks to stop.
    pub fn run<F>(self, mut callback: F) -> std::io::Error
    where
        F: FnMut(DockEvent) -> bool, // Returns true to continue, false to stop
    {
        info!("Listening for Thunderbolt device events...");

        let fd = self.socket.as_raw_fd();

        loop {
            let mut poll_fd = libc::pollfd {
                fd,
                events: libc::POLLIN,
                revents: 0,
            };

            // Block until socket has data (negative timeout = wait forever)
            let poll_result = unsafe { libc::poll(&mut poll_fd, 1, -1) };

            if poll_result < 0 {
                let err = std::io::Error::last_os_error();
                if err.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                error!("Poll error: {}", err);
                return err;
            }

            if poll_result == 0 {
                continue;
            }

            let Some(event) = self.socket.iter().next() else {
                debug!("Poll indicated ready but no event available");
                continue;
            };

            debug!(
                "udev event: type={:?}, subsystem={:?}, devtype={:?}, syspath={:?}",
                event.event_type(),
                event.subsystem(),
                event.devtype(),
                event.syspath()
            );

            let action = match event.event_type() {
                udev::EventType::Add => DockAction::Add,
                udev::EventType::Remove => DockAction::Remove,
                _ => DockAction::Other,
            };
            let dock_event = DockEvent {
                action,
                subsystem: event
                    .subsystem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_default(),
                sys_path: PathBuf::from(event.syspath()),
            };

            if !callback(dock_event) {
                info!("Thunderbolt monitoring stopped by callback");
                return std::io::Error::new(std::io::ErrorKind::Interrupted, "Stopped by callback");
            }
        }
    }
}

/// Start the monitor thread feeding `tx`
///
/// Resolves once the subscription is in place, so a failure to subscribe
/// is reported to the caller instead of dying inside the thread.
pub async fn spawn_monitor_thread(ctx: DeviceContext, tx: mpsc::Sender<DockEvent>) -> Result<()> {
    let (ready_tx, ready_rx) = oneshot::channel();

    std::thread::spawn(move || {
        let monitor = match UdevMonitor::new(&ctx) {
            Ok(m) => {
                let _ = ready_tx.send(Ok(()));
                m
            }
            Err(e) => {
                let _ = ready_tx.send(Err(e));
                return;
            }
        };

        let err = monitor.run(|event| match tx.try_send(event) {
            Ok(_) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                debug!("Event queue full, dropping {:?} (a pass is pending)", event.action);
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });

        // Dropping `tx` below tells the watcher the stream has ended
        if tx.is_closed() {
            debug!("Thunderbolt monitor thread exiting");
        } else {
            error!("Thunderbolt monitor stopped: {}", err);
        }
    });

    match ready_rx.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(DscError::Udev(e)),
        Err(_) => Err(DscError::Udev(std::io::Error::other("monitor thread exited early"))),
    }
}
