//! Scratch resources of a single run.
//!
//! Each run owns a private directory under the worker's work dir. Every
//! local file the run creates is tracked and removed by [`RunResources::release`],
//! which is idempotent and never fails the run. Dropping an unreleased
//! handle releases it as a last resort.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use reel_models::ProjectId;

use crate::error::{WorkerError, WorkerResult};

/// Files removed and failures logged by a release.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReleaseSummary {
    pub removed: usize,
    pub failed: usize,
}

#[derive(Debug)]
pub struct RunResources {
    dir: Option<TempDir>,
    path: PathBuf,
    tracked: Vec<PathBuf>,
    released: bool,
}

impl RunResources {
    /// Create the run's scratch directory under `work_dir`.
    pub fn acquire(work_dir: &Path, project_id: &ProjectId) -> WorkerResult<Self> {
        std::fs::create_dir_all(work_dir).map_err(|e| {
            WorkerError::resource(format!("cannot create work dir {}: {}", work_dir.display(), e))
        })?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("run-{}-", project_id.as_str()))
            .tempdir_in(work_dir)
            .map_err(|e| WorkerError::resource(format!("cannot create scratch dir: {}", e)))?;
        let path = dir.path().to_path_buf();
        debug!(dir = %path.display(), "Acquired run scratch dir");

        Ok(Self {
            dir: Some(dir),
            path,
            tracked: Vec::new(),
            released: false,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.path
    }

    /// Path of a scratch file, tracked for cleanup.
    pub fn scratch(&mut self, name: &str) -> PathBuf {
        let path = self.path.join(name);
        self.track(path.clone());
        path
    }

    /// Track a file for cleanup. Paths outside the scratch dir are ignored.
    pub fn track(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !path.starts_with(&self.path) {
            warn!(path = %path.display(), "Refusing to track file outside run scratch dir");
            return;
        }
        if !self.tracked.contains(&path) {
            self.tracked.push(path);
        }
    }

    pub fn tracked(&self) -> &[PathBuf] {
        &self.tracked
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Remove tracked files and the scratch dir. Safe to call repeatedly.
    pub fn release(&mut self) -> ReleaseSummary {
        let mut summary = ReleaseSummary::default();
        if self.released {
            return summary;
        }
        self.released = true;

        for path in self.tracked.drain(..) {
            match std::fs::remove_file(&path) {
                Ok(()) => summary.removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    summary.failed += 1;
                    warn!(path = %path.display(), "Failed to remove scratch file: {}", e);
                }
            }
        }

        if let Some(dir) = self.dir.take() {
            if let Err(e) = dir.close() {
                summary.failed += 1;
                warn!(dir = %self.path.display(), "Failed to remove scratch dir: {}", e);
            }
        }

        debug!(
            dir = %self.path.display(),
            removed = summary.removed,
            failed = summary.failed,
            "Released run resources"
        );
        summary
    }
}

impl Drop for RunResources {
    fn drop(&mut self) {
        if !self.released {
            warn!(dir = %self.path.display(), "Run resources dropped without release");
            self.release();
        }
    }
}
