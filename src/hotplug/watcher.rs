use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::{DockAction, DockEvent};
use crate::dock::DockFilter;
use crate::error::{DscError, Result};

/// Discovery-and-update pass run after a qualifying attach
pub type Trigger = Arc<dyn Fn() -> Result<()> + Send + Sync>;

/// Consumes dock events and triggers update passes
///
/// Events are handled strictly one at a time: the settle delay and the
/// whole pass finish before the next event is looked at, so two passes
/// never touch the same panels concurrently.
pub struct DockWatcher {
    filter: DockFilter,
    settle_delay: Duration,
    trigger: Trigger,
}

impl DockWatcher {
    pub fn new(filter: DockFilter, settle_delay: Duration, trigger: Trigger) -> Self {
        Self {
            filter,
            settle_delay,
            trigger,
        }
    }

    /// Run until `shutdown` resolves
    ///
    /// A fatal pass error (missing privilege) ends the loop early. The
    /// event stream closing means the monitor thread died, which is
    /// reported as a `Udev` error so the process exits non-zero.
    pub async fn run<S>(self, mut events: mpsc::Receiver<DockEvent>, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let event = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Exiting dock watcher");
                    return Ok(());
                }
                event = events.recv() => match event {
                    Some(event) => event,
                    None => {
                        error!("Hot-plug event stream ended, no longer watching for the dock");
                        return Err(DscError::Udev(std::io::Error::other(
                            "Thunderbolt event stream ended unexpectedly",
                        )));
                    }
                },
            };

            if !self.is_dock_attach(&event) {
                continue;
            }

            info!(
                "Target dock plugged in: {} ('{}'), waiting {:?} for displays to settle",
                event.sys_path.display(),
                event.identity().trim(),
                self.settle_delay
            );

            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Exiting dock watcher during settle delay");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.settle_delay) => {}
            }

            // One pass covers everything that enumerated meanwhile
            let mut drained_count = 0;
            while let Ok(queued) = events.try_recv() {
                if self.is_dock_attach(&queued) {
                    debug!("Dock attach on {} folded into the pending pass", queued.sys_path.display());
                }
                drained_count += 1;
            }
            if drained_count > 0 {
                info!("Drained {} additional hot-plug events", drained_count);
            }

            let trigger = Arc::clone(&self.trigger);
            match tokio::task::spawn_blocking(move || trigger()).await {
                Ok(Ok(())) => info!("Dock update pass complete, ready for next event"),
                Ok(Err(e)) if e.is_fatal() => {
                    error!("{}", e);
                    return Err(e);
                }
                Ok(Err(DscError::NoDevicesFound { target })) => {
                    info!("No connected {} displays behind the dock yet, nothing to do", target);
                }
                Ok(Err(e)) => error!("Dock update pass failed: {}", e),
                Err(e) => error!("Dock update pass panicked: {}", e),
            }
        }
    }

    /// Log events that do not start a pass; true for an attach of the target dock
    fn is_dock_attach(&self, event: &DockEvent) -> bool {
        match event.action {
            DockAction::Add => {}
            DockAction::Remove => {
                info!("TBT device unplugged: {}", event.sys_path.display());
                return false;
            }
            DockAction::Other => {
                debug!("Ignoring {} event on {}", event.subsystem, event.sys_path.display());
                return false;
            }
        }

        if !self.filter.is_target_dock(&event.sys_path) {
            info!(
                "TBT device plugged in but not the target dock: {} ('{}')",
                event.sys_path.display(),
                event.identity().trim()
            );
            return false;
        }
        true
    }
}
