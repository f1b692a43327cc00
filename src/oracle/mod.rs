//! Equivalence oracles.
//!
//! The filter stage asks an oracle whether a captured output matches the
//! ground-truth answer. Oracles run inside forked pool workers, so a hang
//! or crash costs one item, never the run.

pub mod command;
pub mod exact;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub use command::CommandOracle;
pub use exact::ExactMatchOracle;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle exceeded {0:?}")]
    Timeout(Duration),

    #[error("oracle command failed: {0}")]
    CommandError(String),

    #[error("oracle could not be launched: {0}")]
    Launch(String),
}

impl OracleError {
    pub fn kind(&self) -> &'static str {
        match self {
            OracleError::Timeout(_) => "Timeout",
            OracleError::CommandError(_) => "CommandError",
            OracleError::Launch(_) => "LaunchError",
        }
    }
}

/// Decides whether a captured output and an answer are equivalent.
pub trait EquivalenceOracle: Send + Sync {
    fn equal(&self, output: &str, answer: &str) -> Result<bool, OracleError>;
}

/// Oracle error flattened for the trip back from a pool worker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OracleFailure {
    pub kind: String,
    pub message: String,
}

impl From<OracleError> for OracleFailure {
    fn from(err: OracleError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

impl<O: EquivalenceOracle + ?Sized> EquivalenceOracle for Box<O> {
    fn equal(&self, output: &str, answer: &str) -> Result<bool, OracleError> {
        (**self).equal(output, answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_keeps_kind_and_message() {
        let failure = OracleFailure::from(OracleError::CommandError("exit 2".to_string()));
        assert_eq!(failure.kind, "CommandError");
        assert_eq!(failure.message, "oracle command failed: exit 2");
    }

    #[test]
    fn boxed_oracle_delegates() {
        let oracle: Box<dyn EquivalenceOracle> = Box::new(ExactMatchOracle::default());
        assert!(oracle.equal("1/2", "0.5").unwrap());
    }
}
