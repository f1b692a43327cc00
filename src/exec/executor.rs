use crate::config::types::{Result, SandboxConfig};
use crate::core::channel::OutcomeChannel;
use crate::core::supervisor::launch_with_deadline;
use crate::core::types::{LaunchOutcome, SandboxLaunchRequest};
use crate::judge::adapter::RuntimeAdapter;
use crate::judge::registry::adapter_for;
use crate::judge::HarnessRun;
use crate::record::value::Captured;
use crate::safety::workspace::Workspace;
use std::fs;
use std::time::Duration;

/// Error recorded for snippets below the statement-line minimum
pub const TOO_SHORT_ERROR: &str = "Code is too short";

/// Bytes of interpreter stderr quoted when a run produced no outcome
const STDERR_TAIL_BYTES: usize = 2048;

/// What a snippet run produced.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExecutionOutcome {
    pub input: Option<Captured>,
    pub output: Option<Captured>,
    pub error: Option<String>,
}

impl ExecutionOutcome {
    fn failed(error: String) -> Self {
        Self {
            input: None,
            output: None,
            error: Some(error),
        }
    }
}

/// Outcome plus launch evidence, for diagnostics and tests.
#[derive(Clone, Debug)]
pub struct ExecutionReport {
    pub outcome: ExecutionOutcome,
    /// None when no process was spawned
    pub launch: Option<LaunchOutcome>,
    pub run_id: Option<String>,
}

/// Runs one snippet at a time in an isolated interpreter child.
pub struct SnippetExecutor {
    config: SandboxConfig,
    adapter: Box<dyn RuntimeAdapter>,
}

impl SnippetExecutor {
    pub fn new(config: SandboxConfig) -> Result<Self> {
        let adapter = adapter_for(&config.language)?;
        Ok(Self { config, adapter })
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Run a snippet. Never fails: every failure becomes `error`.
    pub fn execute(&self, code: &str) -> ExecutionOutcome {
        self.execute_detailed(code).outcome
    }

    pub fn execute_detailed(&self, code: &str) -> ExecutionReport {
        if count_statement_lines(code) < self.config.min_statement_lines {
            return ExecutionReport {
                outcome: ExecutionOutcome::failed(TOO_SHORT_ERROR.to_string()),
                launch: None,
                run_id: None,
            };
        }

        let mut workspace = match Workspace::new(&self.config.workspace_root) {
            Ok(ws) => ws,
            Err(e) => return launch_failed(None, e),
        };
        if self.config.keep_workspaces {
            workspace.keep();
        }
        let run_id = Some(workspace.run_id().to_string());

        let source = match workspace.write_source(self.adapter.source_file_name(), code) {
            Ok(path) => path,
            Err(e) => return launch_failed(run_id, e),
        };
        let run = HarnessRun {
            source,
            outcome: workspace.outcome_path(),
            digit_ceiling: self.config.digit_ceiling as u64,
            max_digits: self.config.max_digits as u64,
        };
        let request = SandboxLaunchRequest::new(
            workspace.run_id(),
            self.adapter.run_command(&self.config.interpreter, &run),
            self.config.wall_time_limit,
        )
        .with_workdir(workspace.run_dir())
        .with_stderr(workspace.stderr_path());

        let launch = match launch_with_deadline(&request) {
            Ok(launch) => launch,
            Err(e) => return launch_failed(run_id, e),
        };

        let outcome = if launch.timed_out {
            ExecutionOutcome::failed(timeout_message(self.config.wall_time_limit))
        } else {
            match OutcomeChannel::new(run.outcome).take() {
                Ok(Some(report)) => outcome_from_report(report),
                Ok(None) => ExecutionOutcome::failed(format!(
                    "Sandbox exited without an outcome ({}): {}",
                    launch.status_label(),
                    stderr_tail(&workspace)
                )),
                Err(e) => ExecutionOutcome::failed(e.to_string()),
            }
        };

        ExecutionReport {
            outcome,
            launch: Some(launch),
            run_id,
        }
    }
}

fn launch_failed(run_id: Option<String>, err: impl std::fmt::Display) -> ExecutionReport {
    log::warn!("Sandbox launch failed: {}", err);
    ExecutionReport {
        outcome: ExecutionOutcome::failed(format!("Sandbox launch failed: {err}")),
        launch: None,
        run_id,
    }
}

fn outcome_from_report(report: crate::core::channel::HarnessReport) -> ExecutionOutcome {
    if let Some(traceback) = report.traceback {
        return ExecutionOutcome::failed(traceback);
    }

    let output = report
        .output
        .unwrap_or_else(|| Captured::Str(report.stdout.trim().to_string()));
    let unused = report
        .input
        .as_ref()
        .map(|input| unused_input_parameters(input, &report.names))
        .unwrap_or_default();
    let error = (!unused.is_empty()).then(|| format!("Unused input parameters: {}", unused.join(", ")));

    ExecutionOutcome {
        input: report.input,
        output: Some(output),
        error,
    }
}

/// Lines that count as statements: non-blank, not a comment, not an import.
pub fn count_statement_lines(code: &str) -> usize {
    code.trim()
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with("import"))
        .count()
}

/// Mapping keys of `input` that never appear among the snippet's identifiers.
pub fn unused_input_parameters(input: &Captured, names: &[String]) -> Vec<String> {
    match input.dict_keys() {
        Some(keys) => keys
            .filter(|key| !names.iter().any(|name| name == key))
            .map(str::to_string)
            .collect(),
        None => Vec::new(),
    }
}

pub fn timeout_message(deadline: Duration) -> String {
    let secs = deadline.as_secs_f64();
    if deadline.subsec_nanos() == 0 {
        format!("Timeout: execution exceeded {} seconds", deadline.as_secs())
    } else {
        format!("Timeout: execution exceeded {} seconds", secs)
    }
}

fn stderr_tail(workspace: &Workspace) -> String {
    let raw = match fs::read(workspace.stderr_path()) {
        Ok(raw) => raw,
        Err(_) => return "no stderr captured".to_string(),
    };
    let start = raw.len().saturating_sub(STDERR_TAIL_BYTES);
    let tail = String::from_utf8_lossy(&raw[start..]).trim().to_string();
    if tail.is_empty() {
        "no stderr captured".to_string()
    } else {
        tail
    }
}
