//! Configuration
//!
//! Stage configuration types, file-provided defaults, and startup validation.

pub mod file;
pub mod types;
pub mod validator;
