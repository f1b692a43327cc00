//! Runtime adapters.
//!
//! The sandbox core stays language-agnostic. Adapters define the harness
//! command that runs a snippet and reports its bindings for each language.

pub mod adapter;
pub mod languages;
pub mod registry;

use std::path::PathBuf;

/// Paths and limits handed to an adapter when it builds a run command.
#[derive(Clone, Debug)]
pub struct HarnessRun {
    pub source: PathBuf,
    pub outcome: PathBuf,
    /// Interpreter-side integer/string conversion ceiling
    pub digit_ceiling: u64,
    /// Top-level integers longer than this are reported unrendered
    pub max_digits: u64,
}
