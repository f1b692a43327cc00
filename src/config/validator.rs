// Config validation
// Startup validation fails fast with actionable errors; softer problems
// surface as logged warnings.

use crate::config::types::{ExtractConfig, FilterConfig, Result, SandboxConfig, SieveError};
use std::path::{Path, PathBuf};

/// Worker counts beyond this multiple of the CPU count draw a warning
const OVERSUBSCRIPTION_FACTOR: usize = 8;

/// Validation result with detailed errors
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, error: String) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Log warnings and turn accumulated errors into a config error
    fn finish(self, stage: &str) -> Result<ValidationResult> {
        for warning in &self.warnings {
            log::warn!("Configuration warning ({stage}): {warning}");
        }
        if self.is_valid() {
            return Ok(self);
        }
        Err(SieveError::Config(format!(
            "{stage} configuration is invalid:\n{}",
            self.errors.join("\n")
        )))
    }
}

/// Validate the extraction stage before any worker is spawned
pub fn validate_extract_config(config: &ExtractConfig) -> Result<ValidationResult> {
    let mut result = ValidationResult::new();

    validate_workers(config.workers, &mut result);
    validate_sandbox(&config.sandbox, &mut result);
    validate_distinct_paths(&config.input, &config.output, "input", "output", &mut result);

    result.finish("extract")
}

/// Validate the filter stage before reading any record
pub fn validate_filter_config(config: &FilterConfig) -> Result<ValidationResult> {
    let mut result = ValidationResult::new();

    validate_workers(config.workers, &mut result);
    if config.check_timeout.is_zero() {
        result.add_error("check timeout cannot be zero".to_string());
    }
    validate_distinct_paths(&config.input, &config.output, "input", "output", &mut result);
    validate_distinct_paths(
        &config.output,
        &config.rejected_output,
        "output",
        "rejected output",
        &mut result,
    );
    validate_distinct_paths(
        &config.input,
        &config.rejected_output,
        "input",
        "rejected output",
        &mut result,
    );
    if !config.compare_gt && !config.oracle_command.is_empty() {
        result.add_warning("oracle command is ignored without ground-truth comparison".to_string());
    }
    if let Some(program) = config.oracle_command.first() {
        if resolve_executable(program).is_none() {
            result.add_warning(format!("oracle program '{program}' was not found on PATH"));
        }
    }

    result.finish("filter")
}

fn validate_workers(workers: usize, result: &mut ValidationResult) {
    if workers == 0 {
        result.add_error("worker count cannot be zero".to_string());
        return;
    }

    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    if workers > cpus * OVERSUBSCRIPTION_FACTOR {
        result.add_warning(format!(
            "{workers} workers on {cpus} CPUs will oversubscribe the host"
        ));
    }
}

fn validate_sandbox(sandbox: &SandboxConfig, result: &mut ValidationResult) {
    if sandbox.wall_time_limit.is_zero() {
        result.add_error("execution timeout cannot be zero".to_string());
    }
    if sandbox.max_digits == 0 {
        result.add_error("max_digits cannot be zero".to_string());
    }
    if sandbox.digit_ceiling < sandbox.max_digits {
        result.add_error(format!(
            "digit ceiling ({}) must be >= max_digits ({})",
            sandbox.digit_ceiling, sandbox.max_digits
        ));
    }
    if sandbox.interpreter.trim().is_empty() {
        result.add_error("interpreter cannot be empty".to_string());
    } else if resolve_executable(&sandbox.interpreter).is_none() {
        result.add_warning(format!(
            "interpreter '{}' was not found; every snippet run will fail",
            sandbox.interpreter
        ));
    }
    if sandbox.keep_workspaces {
        result.add_warning(format!(
            "run workspaces are kept under {}",
            sandbox.workspace_root.display()
        ));
    }
}

fn validate_distinct_paths(
    a: &Path,
    b: &Path,
    a_name: &str,
    b_name: &str,
    result: &mut ValidationResult,
) {
    if a == b {
        result.add_error(format!(
            "{a_name} and {b_name} paths must differ: {}",
            a.display()
        ));
    }
}

/// Resolve a program name the way the shell would (absolute/relative path or PATH lookup)
pub fn resolve_executable(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(program))
        .find(|full| full.is_file())
}
