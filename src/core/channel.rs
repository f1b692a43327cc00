//! Write-once/read-once outcome handoff between the isolated child and its caller.
//!
//! The harness writes `<path>.tmp` and renames it over `<path>`, so a file
//! that exists is always complete. The caller consumes it exactly once.

use crate::config::types::{Result, SieveError};
use crate::record::value::Captured;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Report written by the snippet harness.
///
/// `input`/`output` are JSON `null` when the snippet never bound them;
/// a bound Python `None` arrives as `Captured::Null`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HarnessReport {
    #[serde(default)]
    pub input: Option<Captured>,
    #[serde(default)]
    pub output: Option<Captured>,
    #[serde(default)]
    pub stdout: String,
    /// Every identifier referenced anywhere in the snippet
    #[serde(default)]
    pub names: Vec<String>,
    /// Set when the snippet raised
    #[serde(default)]
    pub traceback: Option<String>,
}

#[derive(Debug)]
pub struct OutcomeChannel {
    path: PathBuf,
}

impl OutcomeChannel {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Consume the report. `Ok(None)` when the child never wrote one.
    pub fn take(self) -> Result<Option<HarnessReport>> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SieveError::Io(e)),
        };
        if let Err(e) = fs::remove_file(&self.path) {
            log::debug!("Failed to remove outcome file {}: {}", self.path.display(), e);
        }

        let report = serde_json::from_slice(&raw).map_err(|e| {
            SieveError::Record(format!(
                "Malformed outcome report {}: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(Some(report))
    }

    /// Caller-side writer mirroring the harness protocol (tests, alternative runtimes).
    pub fn publish(&self, report: &HarnessReport) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(report)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
