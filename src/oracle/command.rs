use crate::core::supervisor::launch_with_deadline;
use crate::core::types::SandboxLaunchRequest;
use crate::oracle::{EquivalenceOracle, OracleError};
use std::time::Duration;

/// Oracle backed by an external grader: `<program> <args..> <output> <answer>`.
///
/// Exit 0 means equal, 1 means not equal; anything else is a command error.
/// The grader runs in its own process group under `deadline`.
#[derive(Clone, Debug)]
pub struct CommandOracle {
    command: Vec<String>,
    deadline: Duration,
}

impl CommandOracle {
    pub fn new(command: Vec<String>, deadline: Duration) -> Result<Self, OracleError> {
        if command.is_empty() {
            return Err(OracleError::Launch("empty oracle command".to_string()));
        }
        Ok(Self { command, deadline })
    }

    /// Split a whitespace-separated command line (`"prog --flag"`).
    pub fn from_command_line(line: &str, deadline: Duration) -> Result<Self, OracleError> {
        Self::new(line.split_whitespace().map(str::to_string).collect(), deadline)
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }
}

impl EquivalenceOracle for CommandOracle {
    fn equal(&self, output: &str, answer: &str) -> Result<bool, OracleError> {
        let mut command = self.command.clone();
        command.push(output.to_string());
        command.push(answer.to_string());

        let request = SandboxLaunchRequest::new("oracle", command, self.deadline);
        let outcome = launch_with_deadline(&request).map_err(|e| OracleError::Launch(e.to_string()))?;

        if outcome.timed_out {
            return Err(OracleError::Timeout(self.deadline));
        }
        match outcome.exit_code {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(OracleError::CommandError(outcome.status_label())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str, deadline: Duration) -> CommandOracle {
        CommandOracle::new(
            vec!["sh".to_string(), "-c".to_string(), script.to_string(), "oracle".to_string()],
            deadline,
        )
        .unwrap()
    }

    #[test]
    fn exit_codes_map_to_verdicts() {
        let oracle = sh(r#"[ "$1" = "$2" ]"#, Duration::from_secs(5));
        assert!(oracle.equal("7", "7").unwrap());
        assert!(!oracle.equal("7", "8").unwrap());
    }

    #[test]
    fn other_exit_is_command_error() {
        let err = sh("exit 3", Duration::from_secs(5)).equal("a", "b").unwrap_err();
        assert_eq!(err.kind(), "CommandError");
    }

    #[test]
    fn slow_grader_times_out() {
        let err = sh("sleep 30", Duration::from_millis(200)).equal("a", "b").unwrap_err();
        assert_eq!(err.kind(), "Timeout");
    }

    #[test]
    fn splits_command_line() {
        let oracle = CommandOracle::from_command_line("grader --strict", Duration::from_secs(1)).unwrap();
        assert_eq!(oracle.command(), ["grader", "--strict"]);
        assert!(CommandOracle::from_command_line("   ", Duration::from_secs(1)).is_err());
    }
}
