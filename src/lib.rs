//! sievebox: sandboxed snippet execution and dataset filtering
//! Runs model-written code snippets under a supervised interpreter, captures
//! their `input`/`output` bindings, and splits the results into valid and
//! rejected JSONL streams.
//!
//! # Architecture
//!
//! ## Kernel Primitives ([`kernel`])
//! - [`kernel::signal`]: Process-group termination, sweeping, reaping, parent-death signal
//!
//! ## Sandbox Core ([`core`])
//! - [`core::supervisor`]: Deadline-bounded launch of one child in its own process group
//! - [`core::channel`]: Outcome file handoff from the harness back to the parent
//! - [`core::types`]: Launch requests and outcomes
//!
//! ## Runtime Adapters ([`judge`])
//! - [`judge::adapter`]: Per-language harness command contract
//! - [`judge::languages`]: Python harness
//! - [`judge::registry`]: Language name to adapter lookup
//!
//! ## Execution ([`exec`])
//! - [`exec::executor`]: Snippet to captured outcome, with line-count and unused-parameter checks
//!
//! ## Records ([`record`])
//! - [`record::value`]: Captured value model
//! - [`record::normalize`]: JSON-safe normalization and oversize guard
//! - [`record::extract`]: Markdown code-block extraction
//! - [`record::io`]: JSONL reading and flushed writing
//!
//! ## Pipeline ([`pipeline`])
//! - [`pipeline::pool`]: Forked worker pool with crash isolation and per-item deadlines
//! - [`pipeline::extract`]: Extraction stage
//! - [`pipeline::filter`]: Validity and equivalence filtering stage
//!
//! ## Equivalence ([`oracle`])
//! - [`oracle::exact`]: Built-in numeric/textual comparison
//! - [`oracle::command`]: External grader command
//!
//! ## Safety & Cleanup ([`safety`])
//! - [`safety::workspace`]: Run-scoped scratch directories
//!
//! ## Observability ([`observability`])
//! - [`observability::progress`]: Stage progress logging
//!
//! ## Configuration ([`config`])
//! - [`config::types`]: Stage configs and the crate error type
//! - [`config::file`]: Optional JSON config file
//! - [`config::validator`]: Startup validation
//!
//! ## Utilities ([`utils`])
//! - [`utils::fd_closure`]: FD closure in forked workers

// Kernel Primitives
pub mod kernel;

// Sandbox core
pub mod core;

// Runtime adapters
pub mod judge;

// Snippet execution
pub mod exec;

// Dataset records
pub mod record;

// Dataset pipeline
pub mod pipeline;

// Equivalence oracles
pub mod oracle;

// Safety & Cleanup
pub mod safety;

// Observability
pub mod observability;

// Configuration
pub mod config;

// Utilities
pub mod utils;

// CLI entrypoint
pub mod cli;

pub use config::types::*;
