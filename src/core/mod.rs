//! Language-agnostic sandbox core.
//!
//! Core owns the launch lifecycle of isolated children (process group,
//! deadline, termination, reaping) and the outcome handoff back from them.
//! Language-specific launch details live in judge adapters.

pub mod channel;
pub mod supervisor;
pub mod types;
