//! Utilities
//!
//! FD closure for freshly forked pool workers.

pub mod fd_closure;
