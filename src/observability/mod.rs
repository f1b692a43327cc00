//! Observability
//!
//! Stage progress logging for long dataset runs.

pub mod progress;
