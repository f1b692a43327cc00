//! Snippet execution
//!
//! Turns a code string into captured input/output through a workspace,
//! a runtime adapter and the supervised launch in [`crate::core`].

pub mod executor;
