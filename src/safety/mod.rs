//! Safety and cleanup
//!
//! Run-scoped scratch directories that never outlive a snippet run.

pub mod workspace;
