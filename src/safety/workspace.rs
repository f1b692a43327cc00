//! Run-scoped workspace for one sandboxed execution
//! No cross-run artifact collision: every run gets a fresh uuid directory.

use crate::config::types::{Result, SieveError};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const OUTCOME_FILE: &str = "outcome.json";
const STDERR_FILE: &str = "stderr.log";

/// Workspace manager for isolated run artifacts
pub struct Workspace {
    run_id: String,
    run_dir: PathBuf,
    keep: bool,
}

impl Workspace {
    /// Create new workspace for a run
    pub fn new(base_dir: &Path) -> Result<Self> {
        let run_id = Uuid::new_v4().to_string();
        let run_dir = base_dir.join(&run_id);

        fs::create_dir_all(&run_dir).map_err(|e| {
            SieveError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to create workspace directory {}: {}", run_dir.display(), e),
            ))
        })?;

        Ok(Self {
            run_id,
            run_dir,
            keep: false,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Write the snippet source into the workspace
    pub fn write_source(&self, file_name: &str, content: &str) -> Result<PathBuf> {
        let source_path = self.run_dir.join(file_name);
        fs::write(&source_path, content).map_err(|e| {
            SieveError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to write source file {}: {}", source_path.display(), e),
            ))
        })?;
        Ok(source_path)
    }

    pub fn outcome_path(&self) -> PathBuf {
        self.run_dir.join(OUTCOME_FILE)
    }

    pub fn stderr_path(&self) -> PathBuf {
        self.run_dir.join(STDERR_FILE)
    }

    /// Leave the directory on disk when the workspace is dropped
    pub fn keep(&mut self) {
        self.keep = true;
    }

    /// Remove the run directory (idempotent)
    pub fn cleanup(&self) -> Result<()> {
        match fs::remove_dir_all(&self.run_dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SieveError::Io(e)),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.keep {
            log::debug!("Keeping workspace {}", self.run_dir.display());
            return;
        }
        if let Err(e) = self.cleanup() {
            log::warn!("Failed to clean workspace {}: {}", self.run_dir.display(), e);
        }
    }
}
