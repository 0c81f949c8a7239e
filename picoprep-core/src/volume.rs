//! Volume observation and the drive watcher.
//!
//! Hardware state is only visible to this tool through mount points: the
//! bootloader and runtime identities of the board each appear as a removable
//! volume at a well-known path. [`VolumeObserver`] is the injectable
//! capability that answers "is this path a live mount right now?", so the
//! orchestrator can be driven in tests without real hardware.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{ProvisionError, Result};

pub trait VolumeObserver {
    /// `true` when the path exists and is an active mount point.
    fn is_mounted(&self, path: &Path) -> bool;
}

/// Real observer backed by the OS mount table.
pub struct SystemVolumes;

impl VolumeObserver for SystemVolumes {
    fn is_mounted(&self, path: &Path) -> bool {
        if !path.exists() {
            return false;
        }
        let disks = sysinfo::Disks::new_with_refreshed_list();
        disks.iter().any(|disk| disk.mount_point() == path)
    }
}

/// Knobs for a single blocking wait.
#[derive(Debug, Clone, Copy)]
pub struct WaitTiming {
    pub poll_interval: Duration,
    pub timeout: Duration,
    /// Extra pause after the mount is observed; the OS reports the path
    /// before the device is actually ready to take writes.
    pub settle_delay: Duration,
}

/// Block until `path` reports itself mounted, polling at a fixed interval.
///
/// Once the volume is detected, an additional settle delay elapses before the
/// function returns. `on_wait` fires on every unsuccessful poll with the time
/// waited so far, so a front-end can render progress.
///
/// # Errors
///
/// * [`ProvisionError::DriveTimeout`] when the deadline elapses first.
/// * [`ProvisionError::Cancelled`] when `running` is cleared.
pub fn wait_for_volume<F>(
    volumes: &dyn VolumeObserver,
    path: &Path,
    timing: &WaitTiming,
    running: &AtomicBool,
    mut on_wait: F,
) -> Result<()>
where
    F: FnMut(Duration),
{
    let start = Instant::now();
    log::debug!("waiting for {} to mount", path.display());

    loop {
        if !running.load(Ordering::SeqCst) {
            return Err(ProvisionError::Cancelled);
        }

        if volumes.is_mounted(path) {
            thread::sleep(timing.settle_delay);
            log::debug!(
                "volume {} ready after {:?}",
                path.display(),
                start.elapsed()
            );
            return Ok(());
        }

        if start.elapsed() >= timing.timeout {
            return Err(ProvisionError::DriveTimeout {
                path: PathBuf::from(path),
                timeout: timing.timeout,
            });
        }

        on_wait(start.elapsed());
        thread::sleep(timing.poll_interval);
    }
}
