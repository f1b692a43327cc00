use crate::config::types::{ExtractConfig, Result, SieveError};
use crate::config::validator::validate_extract_config;
use crate::exec::executor::SnippetExecutor;
use crate::observability::progress::ProgressReporter;
use crate::pipeline::pool::ProcessPool;
use crate::record::extract::extract_code_block;
use crate::record::io::{read_lines, JsonlWriter};
use crate::record::normalize::{apply_oversize_guard, normalize};
use crate::record::{json_kind, parse_entry, DatasetEntry};
use serde_json::{Number, Value};
use std::fmt;
use std::time::Instant;

/// Runs one raw record through the sandbox and writes the results back.
pub struct ExtractionWorker {
    executor: SnippetExecutor,
    extract_code: bool,
}

impl ExtractionWorker {
    pub fn new(config: &ExtractConfig) -> Result<Self> {
        Ok(Self::from_parts(
            SnippetExecutor::new(config.sandbox.clone())?,
            config.extract_code,
        ))
    }

    pub fn from_parts(executor: SnippetExecutor, extract_code: bool) -> Self {
        Self {
            executor,
            extract_code,
        }
    }

    /// Process one JSONL line. Unusable lines are logged and dropped.
    pub fn process_line(&self, line: &str) -> Option<DatasetEntry> {
        if line.trim().is_empty() {
            return None;
        }
        match parse_entry(line) {
            Ok(entry) => self.process_record(entry),
            Err(e) => {
                log::warn!("Dropping record: {}", e);
                None
            }
        }
    }

    /// Process a pre-parsed record.
    pub fn process_record(&self, mut entry: DatasetEntry) -> Option<DatasetEntry> {
        let code_field = match entry.get("code") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(code)) => code.clone(),
            Some(other) => {
                log::warn!("Dropping record: code field is a {}", json_kind(other));
                return None;
            }
        };
        let problem = entry.get("problem").cloned().unwrap_or_else(|| Value::from(""));
        let answer = entry.get("answer").cloned().unwrap_or_else(|| Value::from(""));

        let code = if self.extract_code {
            extract_code_block(&code_field)
        } else {
            code_field
        };

        let started = Instant::now();
        let mut outcome = self.executor.execute(&code);
        let execution_time = started.elapsed().as_secs_f64();

        let max_digits = self.executor.config().max_digits;
        apply_oversize_guard("input", &mut outcome.input, max_digits, &mut outcome.error);
        apply_oversize_guard("output", &mut outcome.output, max_digits, &mut outcome.error);

        entry.insert("code".to_string(), Value::String(code));
        entry.insert(
            "input".to_string(),
            outcome.input.map(normalize).unwrap_or(Value::Null),
        );
        entry.insert(
            "output".to_string(),
            outcome.output.map(normalize).unwrap_or(Value::Null),
        );
        entry.insert(
            "execution_time".to_string(),
            Number::from_f64(execution_time)
                .map(Value::Number)
                .unwrap_or(Value::Null),
        );
        entry.insert(
            "error".to_string(),
            outcome.error.map(Value::String).unwrap_or(Value::Null),
        );
        entry.insert("problem".to_string(), problem);
        entry.insert("answer".to_string(), answer);
        Some(entry)
    }
}

/// Extraction stage accounting. `submitted == written + dropped + failed`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtractionSummary {
    pub submitted: usize,
    pub written: usize,
    /// Records the worker declined (blank, malformed, unusable code field)
    pub dropped: usize,
    /// Units whose handler panicked or whose worker died
    pub failed: usize,
}

impl fmt::Display for ExtractionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Extraction Summary ===")?;
        writeln!(f, "Submitted: {}", self.submitted)?;
        writeln!(f, "Written:   {}", self.written)?;
        writeln!(f, "Dropped:   {}", self.dropped)?;
        write!(f, "Failed:    {}", self.failed)
    }
}

/// Fan `lines` out to forked workers running `process`; write each record
/// as soon as it completes.
pub fn run_extraction<F>(
    lines: Vec<String>,
    workers: usize,
    process: F,
    sink: &mut JsonlWriter,
) -> Result<ExtractionSummary>
where
    F: Fn(String) -> Option<DatasetEntry>,
{
    let mut summary = ExtractionSummary {
        submitted: lines.len(),
        ..Default::default()
    };
    let mut progress = ProgressReporter::new("extract", lines.len());
    let mut sink_error: Option<SieveError> = None;

    let mut pool = ProcessPool::new("extract", workers, process)?;
    pool.run_unordered(lines, |seq, result| {
        progress.tick();
        match result {
            Ok(Some(entry)) => {
                if sink_error.is_none() {
                    match sink.write(&entry) {
                        Ok(()) => summary.written += 1,
                        Err(e) => sink_error = Some(e),
                    }
                }
            }
            Ok(None) => summary.dropped += 1,
            Err(failure) => {
                summary.failed += 1;
                log::warn!("Extraction of line {} failed ({}): {}", seq + 1, failure.kind(), failure);
            }
        }
    })?;
    pool.shutdown();
    progress.finish();

    match sink_error {
        Some(e) => Err(e),
        None => Ok(summary),
    }
}

/// Whole extraction stage: validate, read, fan out, write.
pub fn run_extract_stage(config: &ExtractConfig) -> Result<ExtractionSummary> {
    validate_extract_config(config)?;
    let input = read_lines(&config.input)?;
    let worker = ExtractionWorker::new(config)?;
    let mut sink = JsonlWriter::create(&config.output)?;

    log::info!(
        "Extracting {} -> {} ({} workers, extract_code={})",
        config.input.display(),
        config.output.display(),
        config.workers,
        config.extract_code
    );
    let mut summary = run_extraction(
        input.lines,
        config.workers,
        |line| worker.process_line(&line),
        &mut sink,
    )?;
    summary.submitted += input.undecodable;
    summary.dropped += input.undecodable;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::SandboxConfig;
    use serde_json::json;

    fn offline_worker() -> ExtractionWorker {
        let mut sandbox = SandboxConfig::default();
        sandbox.interpreter = "/nonexistent/python".to_string();
        ExtractionWorker::from_parts(SnippetExecutor::new(sandbox).unwrap(), true)
    }

    #[test]
    fn blank_and_malformed_lines_are_dropped() {
        let worker = offline_worker();
        assert!(worker.process_line("   ").is_none());
        assert!(worker.process_line("{not json").is_none());
        assert!(worker.process_line("[1, 2]").is_none());
        assert!(worker.process_line(r#"{"code": 5}"#).is_none());
    }

    #[test]
    fn short_code_is_written_back_with_error() {
        let worker = offline_worker();
        let entry = worker
            .process_line(r#"{"id": 7, "code": "```python\nx = 1\n```"}"#)
            .unwrap();

        assert_eq!(entry["id"], json!(7));
        assert_eq!(entry["code"], json!("x = 1"));
        assert_eq!(entry["input"], Value::Null);
        assert_eq!(entry["output"], Value::Null);
        assert_eq!(entry["error"], json!("Code is too short"));
        assert_eq!(entry["problem"], json!(""));
        assert_eq!(entry["answer"], json!(""));
        assert!(entry["execution_time"].is_number());
    }

    #[test]
    fn summary_display_lists_counts() {
        let summary = ExtractionSummary {
            submitted: 4,
            written: 2,
            dropped: 1,
            failed: 1,
        };
        let text = summary.to_string();
        assert!(text.contains("Submitted: 4"));
        assert!(text.contains("Failed:    1"));
    }

    #[test]
    fn run_extraction_accounts_for_every_line() {
        let dir = std::env::temp_dir().join(format!("sievebox-extract-{}", uuid::Uuid::new_v4()));
        let mut sink = JsonlWriter::create(&dir.join("out.jsonl")).unwrap();
        let lines: Vec<String> = (0..12).map(|i| format!(r#"{{"n": {i}}}"#)).collect();

        let summary = run_extraction(
            lines,
            4,
            |line| {
                let entry = parse_entry(&line).ok()?;
                let n = entry["n"].as_u64().unwrap_or(0);
                if n == 3 {
                    panic!("boom");
                }
                (n % 4 != 0).then_some(entry)
            },
            &mut sink,
        )
        .unwrap();

        assert_eq!(summary.submitted, 12);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.dropped, 3);
        assert_eq!(summary.written, 8);
        assert_eq!(read_lines(&dir.join("out.jsonl")).unwrap().lines.len(), 8);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn undecodable_input_lines_are_dropped_not_fatal() {
        let dir = std::env::temp_dir().join(format!("sievebox-extract-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let input = dir.join("raw.jsonl");
        std::fs::write(
            &input,
            b"{\"code\": \"x = 1\"}\n{\"code\": \"\xff\xfe\"}\n{\"code\": \"y = 2\"}\n",
        )
        .unwrap();

        let mut config = ExtractConfig::new(&input, dir.join("out.jsonl"));
        config.workers = 2;
        let summary = run_extract_stage(&config).unwrap();
        assert_eq!(summary.submitted, 3);
        assert_eq!(summary.written, 2);
        assert_eq!(summary.dropped, 1);
        assert_eq!(read_lines(&config.output).unwrap().lines.len(), 2);
        std::fs::remove_dir_all(dir).unwrap();
    }
}
