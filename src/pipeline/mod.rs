//! Dataset pipeline
//!
//! Two stages over JSONL files, each fanned out over a [`pool::ProcessPool`]:
//! extraction runs every snippet in the sandbox, filtering splits records
//! into valid and rejected streams.

pub mod extract;
pub mod filter;
pub mod pool;
