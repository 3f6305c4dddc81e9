//! Interrupt-safe registry of benchmark files awaiting removal
//!
//! Every test file is registered before it is created and unregistered once
//! it has been torn down. If the process is interrupted in between, the
//! interrupt handler drains the registry and deletes whatever is left.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{info, warn};

use crate::{IoProbeError, Result};

/// Exit status used after cleaning up on SIGINT/SIGTERM
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Shared set of paths that must not outlive the process
#[derive(Debug, Clone, Default)]
pub struct CleanupRegistry {
    pending: Arc<Mutex<HashSet<PathBuf>>>,
}

/// Outcome of draining the registry
#[derive(Debug, Default)]
pub struct CleanupReport {
    /// Paths deleted, or already gone
    pub removed: Vec<PathBuf>,
    /// Paths that could not be deleted, with the reason
    pub failed: Vec<(PathBuf, io::Error)>,
}

impl CleanupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock leaves the set itself intact.
    fn lock(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a path before the file is created
    pub fn register(&self, path: &Path) {
        self.lock().insert(path.to_path_buf());
    }

    /// Forget a path after teardown. Returns false if it was not registered.
    pub fn unregister(&self, path: &Path) -> bool {
        self.lock().remove(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.lock().contains(path)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of the registered paths
    pub fn pending(&self) -> Vec<PathBuf> {
        self.lock().iter().cloned().collect()
    }

    /// Delete every registered file and empty the registry.
    ///
    /// A file that is already gone counts as removed. Failures are reported
    /// in the returned value and never abort the drain.
    pub fn drain(&self) -> CleanupReport {
        let paths: Vec<PathBuf> = self.lock().drain().collect();
        let mut report = CleanupReport::default();

        for path in paths {
            match std::fs::remove_file(&path) {
                Ok(()) => report.removed.push(path),
                Err(err) if err.kind() == io::ErrorKind::NotFound => report.removed.push(path),
                Err(err) => report.failed.push((path, err)),
            }
        }

        report
    }
}

/// Install a Ctrl-C / SIGTERM handler that drains `registry` and exits.
///
/// Only one handler can be installed per process.
pub fn install_interrupt_handler(registry: CleanupRegistry) -> Result<()> {
    ctrlc::set_handler(move || {
        info!("interrupted, cleaning up benchmark files");
        let report = registry.drain();
        for path in &report.removed {
            info!(path = %path.display(), "removed benchmark file");
        }
        for (path, err) in &report.failed {
            warn!(path = %path.display(), error = %err, "failed to remove benchmark file");
        }
        std::process::exit(INTERRUPTED_EXIT_CODE);
    })
    .map_err(|e| IoProbeError::SetupError(format!("Failed to install interrupt handler: {}", e)))
}
