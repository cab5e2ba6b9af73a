//! Per-galaxy completion markers.
//!
//! A finished step leaves `{galaxy}-{suffix}.isdone` in the galaxy directory, a
//! failed one `{galaxy}-{suffix}.isfail`. The partitioner reads these to decide
//! what is left to do, so a rerun only touches galaxies without a marker.

use std::path::{Path, PathBuf};

use crate::domain::Galaxy;
use crate::error::StepError;

/// State of one galaxy's artifacts for a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactStatus {
    Done,
    Failed,
    Missing,
}

/// Source of truth for per-galaxy step completion.
pub trait ArtifactCheck: Send + Sync {
    fn status(&self, galaxy: &Galaxy, suffix: &str) -> ArtifactStatus;

    /// Record the outcome of a step. Only `Done` and `Failed` are recorded;
    /// `Missing` clears both markers.
    fn record(&self, galaxy: &Galaxy, suffix: &str, status: ArtifactStatus) -> Result<(), StepError>;
}

/// Marker files under `<data_dir>/<galaxy>/`.
#[derive(Debug, Clone)]
pub struct MarkerFiles {
    data_dir: PathBuf,
}

impl MarkerFiles {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn done_path(&self, galaxy: &str, suffix: &str) -> PathBuf {
        self.data_dir.join(galaxy).join(format!("{galaxy}-{suffix}.isdone"))
    }

    pub fn fail_path(&self, galaxy: &str, suffix: &str) -> PathBuf {
        self.data_dir.join(galaxy).join(format!("{galaxy}-{suffix}.isfail"))
    }
}

impl ArtifactCheck for MarkerFiles {
    fn status(&self, galaxy: &Galaxy, suffix: &str) -> ArtifactStatus {
        if self.done_path(&galaxy.galaxy, suffix).is_file() {
            ArtifactStatus::Done
        } else if self.fail_path(&galaxy.galaxy, suffix).is_file() {
            ArtifactStatus::Failed
        } else {
            ArtifactStatus::Missing
        }
    }

    fn record(&self, galaxy: &Galaxy, suffix: &str, status: ArtifactStatus) -> Result<(), StepError> {
        let done = self.done_path(&galaxy.galaxy, suffix);
        let fail = self.fail_path(&galaxy.galaxy, suffix);
        match status {
            ArtifactStatus::Done => {
                remove_if_present(&fail)?;
                touch(&done)
            }
            ArtifactStatus::Failed => {
                remove_if_present(&done)?;
                touch(&fail)
            }
            ArtifactStatus::Missing => {
                remove_if_present(&done)?;
                remove_if_present(&fail)
            }
        }
    }
}

fn touch(path: &Path) -> Result<(), StepError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StepError::io(parent, e))?;
    }
    std::fs::write(path, b"").map_err(|e| StepError::io(path, e))
}

fn remove_if_present(path: &Path) -> Result<(), StepError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StepError::io(path, e)),
    }
}
