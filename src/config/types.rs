//! Core types and configuration structures for sievebox

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default wall-clock budget for a single snippet run
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Default wait budget for a single equivalence check
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(3);

/// Snippets with fewer statement lines than this are not executed
pub const DEFAULT_MIN_STATEMENT_LINES: usize = 6;

/// Integers with more decimal digits than this are nulled out
pub const DEFAULT_MAX_DIGITS: usize = 10_000;

/// Interpreter-side int/str conversion ceiling
pub const DEFAULT_DIGIT_CEILING: usize = 1_000_000;

pub const DEFAULT_EXTRACT_WORKERS: usize = 64;
pub const DEFAULT_FILTER_WORKERS: usize = 8;

/// Sandbox settings shared by every snippet run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Language adapter name (see `judge::registry`)
    pub language: String,
    /// Interpreter executable, resolved through PATH when relative
    pub interpreter: String,
    /// Wall-clock deadline for one run
    pub wall_time_limit: Duration,
    /// Minimum number of statement lines before a snippet is worth running
    pub min_statement_lines: usize,
    /// Oversize guard threshold (decimal digits)
    pub max_digits: usize,
    /// Digit ceiling handed to the interpreter before any parsing happens
    pub digit_ceiling: usize,
    /// Root directory for per-run workspaces
    pub workspace_root: PathBuf,
    /// Keep run workspaces on disk after the run (debugging aid)
    #[serde(default)]
    pub keep_workspaces: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            language: "python".to_string(),
            interpreter: "python3".to_string(),
            wall_time_limit: DEFAULT_EXECUTION_TIMEOUT,
            min_statement_lines: DEFAULT_MIN_STATEMENT_LINES,
            max_digits: DEFAULT_MAX_DIGITS,
            digit_ceiling: DEFAULT_DIGIT_CEILING,
            workspace_root: std::env::temp_dir().join("sievebox"),
            keep_workspaces: false,
        }
    }
}

/// Extraction stage configuration
#[derive(Clone, Debug)]
pub struct ExtractConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Pull the first fenced code block out of the `code` field
    pub extract_code: bool,
    pub workers: usize,
    pub sandbox: SandboxConfig,
}

impl ExtractConfig {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            extract_code: false,
            workers: DEFAULT_EXTRACT_WORKERS,
            sandbox: SandboxConfig::default(),
        }
    }
}

/// Filter stage configuration
#[derive(Clone, Debug)]
pub struct FilterConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub rejected_output: PathBuf,
    /// Cross-check captured output against the ground-truth answer
    pub compare_gt: bool,
    pub check_timeout: Duration,
    pub workers: usize,
    /// External grader command; the built-in comparison is used when empty
    pub oracle_command: Vec<String>,
}

impl FilterConfig {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        let output = output.into();
        Self {
            input: input.into(),
            rejected_output: derive_rejected_path(&output),
            output,
            compare_gt: false,
            check_timeout: DEFAULT_CHECK_TIMEOUT,
            workers: DEFAULT_FILTER_WORKERS,
            oracle_command: Vec::new(),
        }
    }
}

/// `data/out.jsonl` -> `data/out_rejected.jsonl`
pub fn derive_rejected_path(output: &Path) -> PathBuf {
    let text = output.to_string_lossy();
    let stem = text.strip_suffix(".jsonl").unwrap_or(&text);
    PathBuf::from(format!("{stem}_rejected.jsonl"))
}

/// Custom error types for sievebox
#[derive(Error, Debug)]
pub enum SieveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Worker pool error: {0}")]
    Pool(String),

    #[error("Record error: {0}")]
    Record(String),
}

impl From<nix::errno::Errno> for SieveError {
    fn from(err: nix::errno::Errno) -> Self {
        SieveError::Process(err.to_string())
    }
}

/// Result type alias for sievebox operations
pub type Result<T> = std::result::Result<T, SieveError>;
