use crate::kernel::signal::KillReport;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Caller->supervisor launch contract.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SandboxLaunchRequest {
    pub instance_id: String,
    pub command: Vec<String>,
    pub workdir: Option<PathBuf>,
    pub environment: Vec<(String, String)>,
    pub wall_time_limit: Duration,
    /// File receiving the child's stderr; discarded when unset
    pub stderr_path: Option<PathBuf>,
}

impl SandboxLaunchRequest {
    pub fn new(instance_id: impl Into<String>, command: Vec<String>, wall_time_limit: Duration) -> Self {
        Self {
            instance_id: instance_id.into(),
            command,
            workdir: None,
            environment: Vec::new(),
            wall_time_limit,
            stderr_path: None,
        }
    }

    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    pub fn with_stderr(mut self, path: impl Into<PathBuf>) -> Self {
        self.stderr_path = Some(path.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.push((key.into(), value.into()));
        self
    }
}

/// Core launch output.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LaunchOutcome {
    pub pid: i32,
    pub exit_code: Option<i32>,
    pub term_signal: Option<i32>,
    pub timed_out: bool,
    pub wall_time: Duration,
    pub kill_report: Option<KillReport>,
    /// Group members still alive after the leader was reaped
    pub swept_descendants: bool,
}

impl LaunchOutcome {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Short wait-status description (`exit 1`, `signal 9`)
    pub fn status_label(&self) -> String {
        match (self.exit_code, self.term_signal) {
            (Some(code), _) => format!("exit {code}"),
            (None, Some(sig)) => format!("signal {sig}"),
            (None, None) => "unknown status".to_string(),
        }
    }
}
