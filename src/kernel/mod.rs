//! Thin wrappers around Linux kernel primitives.
//!
//! All `unsafe` signal and process-group calls are concentrated here.

pub mod signal;
