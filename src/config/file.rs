use crate::config::types::{ExtractConfig, FilterConfig, Result, SieveError};
/// Configuration loading from sievebox.json
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "sievebox.json";

/// Sandbox section of sievebox.json
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SandboxSection {
    pub interpreter: Option<String>,
    pub timeout_seconds: Option<f64>,
    pub min_statement_lines: Option<usize>,
    pub max_digits: Option<usize>,
    pub digit_ceiling: Option<usize>,
    pub workspace_root: Option<PathBuf>,
    pub keep_workspaces: Option<bool>,
}

/// Extraction section of sievebox.json
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractSection {
    pub workers: Option<usize>,
    pub extract_code: Option<bool>,
}

/// Filter section of sievebox.json
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterSection {
    pub workers: Option<usize>,
    pub timeout_seconds: Option<f64>,
    pub compare_gt: Option<bool>,
    pub oracle_command: Option<Vec<String>>,
}

/// Full sievebox.json structure. Every field is optional; command-line
/// flags override whatever the file provides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SieveFileConfig {
    #[serde(default)]
    pub sandbox: SandboxSection,
    #[serde(default)]
    pub extract: ExtractSection,
    #[serde(default)]
    pub filter: FilterSection,
}

impl SieveFileConfig {
    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SieveError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            SieveError::Config(format!("Failed to parse config file {}: {}", path.display(), e))
        })
    }

    /// Load the explicit file when given, otherwise ./sievebox.json if it
    /// exists, otherwise an empty configuration.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_file(path);
        }

        let candidate = std::env::current_dir()
            .map_err(|e| SieveError::Config(format!("Failed to get current directory: {}", e)))?
            .join(DEFAULT_CONFIG_FILE);

        if candidate.exists() {
            log::info!("Loading defaults from {}", candidate.display());
            Self::load_from_file(candidate)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply file-provided defaults to an extraction config
    pub fn apply_to_extract(&self, config: &mut ExtractConfig) -> Result<()> {
        let sandbox = &self.sandbox;
        if let Some(interpreter) = &sandbox.interpreter {
            config.sandbox.interpreter = interpreter.clone();
        }
        if let Some(seconds) = sandbox.timeout_seconds {
            config.sandbox.wall_time_limit = seconds_to_duration("sandbox.timeout_seconds", seconds)?;
        }
        if let Some(lines) = sandbox.min_statement_lines {
            config.sandbox.min_statement_lines = lines;
        }
        if let Some(digits) = sandbox.max_digits {
            config.sandbox.max_digits = digits;
        }
        if let Some(ceiling) = sandbox.digit_ceiling {
            config.sandbox.digit_ceiling = ceiling;
        }
        if let Some(root) = &sandbox.workspace_root {
            config.sandbox.workspace_root = root.clone();
        }
        if let Some(keep) = sandbox.keep_workspaces {
            config.sandbox.keep_workspaces = keep;
        }
        if let Some(workers) = self.extract.workers {
            config.workers = workers;
        }
        if let Some(extract_code) = self.extract.extract_code {
            config.extract_code = extract_code;
        }
        Ok(())
    }

    /// Apply file-provided defaults to a filter config
    pub fn apply_to_filter(&self, config: &mut FilterConfig) -> Result<()> {
        if let Some(workers) = self.filter.workers {
            config.workers = workers;
        }
        if let Some(seconds) = self.filter.timeout_seconds {
            config.check_timeout = seconds_to_duration("filter.timeout_seconds", seconds)?;
        }
        if let Some(compare_gt) = self.filter.compare_gt {
            config.compare_gt = compare_gt;
        }
        if let Some(command) = &self.filter.oracle_command {
            config.oracle_command = command.clone();
        }
        Ok(())
    }
}

pub fn seconds_to_duration(field: &str, seconds: f64) -> Result<Duration> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(SieveError::Config(format!(
            "{field} must be a positive number of seconds, got {seconds}"
        )));
    }
    Duration::try_from_secs_f64(seconds)
        .map_err(|e| SieveError::Config(format!("{field} is out of range: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_config() {
        let config: SieveFileConfig = serde_json::from_str(
            r#"{"sandbox": {"timeout_seconds": 2.5, "interpreter": "/usr/bin/python3"},
                "filter": {"workers": 4}}"#,
        )
        .unwrap();

        let mut extract = ExtractConfig::new("in.jsonl", "out.jsonl");
        config.apply_to_extract(&mut extract).unwrap();
        assert_eq!(extract.sandbox.wall_time_limit, Duration::from_millis(2500));
        assert_eq!(extract.sandbox.interpreter, "/usr/bin/python3");
        assert_eq!(extract.workers, 64);

        let mut filter = FilterConfig::new("in.jsonl", "out.jsonl");
        config.apply_to_filter(&mut filter).unwrap();
        assert_eq!(filter.workers, 4);
        assert_eq!(filter.check_timeout, Duration::from_secs(3));
    }

    #[test]
    fn rejects_unknown_fields() {
        let parsed: std::result::Result<SieveFileConfig, _> =
            serde_json::from_str(r#"{"sandbox": {"memory_mb": 64}}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn rejects_non_positive_timeouts() {
        let config = SieveFileConfig {
            filter: FilterSection {
                timeout_seconds: Some(0.0),
                ..Default::default()
            },
            ..Default::default()
        };
        let mut filter = FilterConfig::new("in.jsonl", "out.jsonl");
        assert!(config.apply_to_filter(&mut filter).is_err());
    }
}
