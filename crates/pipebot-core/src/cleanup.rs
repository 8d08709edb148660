//! Per-chain cleanup set for transient files.
//!
//! Every path a chain creates is registered here before any bytes are written.
//! The set only grows until [`CleanupTracker::drain`] releases each path exactly
//! once. If the owning chain is dropped before draining (for example because its
//! future was cancelled), the last tracker reference removes the files
//! synchronously on drop.

use std::{
    collections::HashSet,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};

/// Counters describing one cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub created: usize,
    pub released: usize,
    pub failed: usize,
}

impl CleanupReport {
    /// Returns true when every tracked path was released.
    pub fn is_balanced(&self) -> bool {
        self.failed == 0 && self.created == self.released
    }
}

#[derive(Debug, Default)]
struct TrackerState {
    paths: Vec<PathBuf>,
    seen: HashSet<PathBuf>,
    drained: bool,
    late_releases: usize,
}

#[derive(Debug)]
struct TrackerInner {
    root_dir: Option<PathBuf>,
    state: Mutex<TrackerState>,
}

impl Drop for TrackerInner {
    fn drop(&mut self) {
        let state = match self.state.get_mut() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if state.drained {
            return;
        }
        for path in state.paths.drain(..) {
            if let Err(error) = std::fs::remove_file(&path) {
                if error.kind() != ErrorKind::NotFound {
                    tracing::warn!(
                        path = %path.display(),
                        error = %error,
                        "failed to release undrained temporary file"
                    );
                }
            }
        }
        if let Some(root_dir) = &self.root_dir {
            let _ = std::fs::remove_dir(root_dir);
        }
    }
}

/// Shared, additive registry of the temporary files owned by one chain.
#[derive(Debug, Clone)]
pub struct CleanupTracker {
    inner: Arc<TrackerInner>,
}

impl CleanupTracker {
    /// Creates a tracker. `root_dir`, when present, is removed after all files are released.
    pub fn new(root_dir: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                root_dir,
                state: Mutex::new(TrackerState::default()),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        match self.inner.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Registers `path` for release. Returns false when the path was already tracked.
    ///
    /// Paths registered after the tracker was drained are removed immediately.
    pub fn track(&self, path: &Path) -> bool {
        let mut state = self.lock();
        if state.drained {
            state.late_releases = state.late_releases.saturating_add(1);
            drop(state);
            tracing::warn!(
                path = %path.display(),
                "temporary file registered after cleanup; releasing immediately"
            );
            let _ = std::fs::remove_file(path);
            return false;
        }
        if !state.seen.insert(path.to_path_buf()) {
            return false;
        }
        state.paths.push(path.to_path_buf());
        true
    }

    /// Number of distinct paths registered so far.
    pub fn tracked_count(&self) -> usize {
        self.lock().paths.len()
    }

    /// Returns true once [`CleanupTracker::drain`] has run.
    pub fn is_drained(&self) -> bool {
        self.lock().drained
    }

    /// Releases every tracked path once. A second call releases nothing.
    ///
    /// Files that never materialized count as released. Other failures are
    /// logged and counted, never returned.
    pub async fn drain(&self) -> CleanupReport {
        let paths = {
            let mut state = self.lock();
            if state.drained {
                return CleanupReport::default();
            }
            state.drained = true;
            std::mem::take(&mut state.paths)
        };

        let mut report = CleanupReport {
            created: paths.len(),
            ..CleanupReport::default()
        };
        for path in paths {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => report.released = report.released.saturating_add(1),
                Err(error) if error.kind() == ErrorKind::NotFound => {
                    report.released = report.released.saturating_add(1);
                }
                Err(error) => {
                    report.failed = report.failed.saturating_add(1);
                    tracing::warn!(
                        path = %path.display(),
                        error = %error,
                        "failed to release temporary file"
                    );
                }
            }
        }

        if let Some(root_dir) = &self.inner.root_dir {
            match tokio::fs::remove_dir(root_dir).await {
                Ok(()) => {}
                Err(error) if error.kind() == ErrorKind::NotFound => {}
                Err(error) => tracing::warn!(
                    path = %root_dir.display(),
                    error = %error,
                    "failed to remove chain temp directory"
                ),
            }
        }
        report
    }
}
