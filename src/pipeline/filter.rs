use crate::config::types::{FilterConfig, Result, SieveError};
use crate::config::validator::validate_filter_config;
use crate::observability::progress::ProgressReporter;
use crate::oracle::{CommandOracle, EquivalenceOracle, ExactMatchOracle, OracleFailure};
use crate::pipeline::pool::ProcessPool;
use crate::record::io::{read_lines, JsonlWriter};
use crate::record::{parse_entry, DatasetEntry};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

pub const REJECTION_FIELD: &str = "rejection_reason";

/// Why a record went to the rejection stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RejectionReason {
    InvalidEntry,
    MathNotEqual,
    /// The equivalence check itself failed (`Timeout`, `CommandError`, `Panic`, ...)
    Exception(String),
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::InvalidEntry => write!(f, "invalid_entry"),
            RejectionReason::MathNotEqual => write!(f, "math_not_equal"),
            RejectionReason::Exception(kind) => write!(f, "exception:{kind}"),
        }
    }
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

/// A record is structurally valid when it has an input and an output and
/// carries no error.
pub fn is_valid(entry: &DatasetEntry) -> bool {
    !is_blank(entry.get("output"))
        && !is_blank(entry.get("input"))
        && matches!(entry.get("error"), None | Some(Value::Null))
}

/// One equivalence check as shipped to a pool worker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EquivalenceTask {
    pub index: usize,
    pub output: String,
    pub answer: String,
}

impl EquivalenceTask {
    pub fn from_entry(index: usize, entry: &DatasetEntry) -> Self {
        Self {
            index,
            output: entry.get("output").map(value_text).unwrap_or_default(),
            answer: entry.get("answer").map(value_text).unwrap_or_default(),
        }
    }
}

/// Text handed to the oracle: strings pass through, everything else is
/// rendered the way the interpreter's `str()` renders the captured value.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => {
            let mut out = String::new();
            write_python(other, &mut out);
            out
        }
    }
}

fn write_python(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("None"),
        Value::Bool(true) => out.push_str("True"),
        Value::Bool(false) => out.push_str("False"),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_python_repr(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_python(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push('{');
            for (i, (key, item)) in map.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_python_repr(key, out);
                out.push_str(": ");
                write_python(item, out);
            }
            out.push('}');
        }
    }
}

// Single quotes unless the text has a single quote and no double quote.
fn write_python_repr(text: &str, out: &mut String) {
    let quote = if text.contains('\'') && !text.contains('"') { '"' } else { '\'' };
    out.push(quote);
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
}

#[derive(Clone, Debug)]
pub struct FilterOptions {
    pub compare_gt: bool,
    pub workers: usize,
    pub check_timeout: Duration,
}

impl From<&FilterConfig> for FilterOptions {
    fn from(config: &FilterConfig) -> Self {
        Self {
            compare_gt: config.compare_gt,
            workers: config.workers,
            check_timeout: config.check_timeout,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterSummary {
    pub lines: usize,
    pub malformed: usize,
    pub invalid: usize,
    /// Structurally valid records
    pub loaded: usize,
    /// Equivalence checks resolved
    pub checked: usize,
    pub valid: usize,
    pub not_equal: usize,
    pub exceptions: usize,
}

impl fmt::Display for FilterSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Filter Summary ===")?;
        writeln!(f, "Lines read:        {}", self.lines)?;
        writeln!(f, "Malformed:         {}", self.malformed)?;
        writeln!(f, "Invalid entries:   {}", self.invalid)?;
        writeln!(f, "Loaded:            {}", self.loaded)?;
        writeln!(f, "Checked:           {}", self.checked)?;
        writeln!(f, "Valid entries:     {}", self.valid)?;
        writeln!(f, "Not equal:         {}", self.not_equal)?;
        write!(f, "Exception count:   {}", self.exceptions)
    }
}

fn reject(
    sink: &mut JsonlWriter,
    mut entry: DatasetEntry,
    reason: RejectionReason,
) -> Result<()> {
    entry.insert(REJECTION_FIELD.to_string(), Value::String(reason.to_string()));
    sink.write(&entry)
}

/// Split records into valid and rejected streams, optionally checking each
/// valid output against its answer. Results are consumed in input order.
pub fn run_filter<O>(
    lines: &[String],
    options: &FilterOptions,
    oracle: &O,
    valid_sink: &mut JsonlWriter,
    rejected_sink: &mut JsonlWriter,
) -> Result<FilterSummary>
where
    O: EquivalenceOracle + ?Sized,
{
    let mut summary = FilterSummary {
        lines: lines.len(),
        ..Default::default()
    };

    let mut entries = Vec::new();
    for (lineno, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let entry = match parse_entry(line) {
            Ok(entry) => entry,
            Err(e) => {
                summary.malformed += 1;
                log::warn!("Skipping line {}: {}", lineno + 1, e);
                continue;
            }
        };
        if is_valid(&entry) {
            entries.push(entry);
        } else {
            summary.invalid += 1;
            reject(rejected_sink, entry, RejectionReason::InvalidEntry)?;
        }
    }
    summary.loaded = entries.len();
    log::info!("Loaded {}/{} valid entries for filtering", summary.loaded, summary.lines);

    if !options.compare_gt {
        for entry in &entries {
            valid_sink.write(entry)?;
        }
        summary.valid = entries.len();
        return Ok(summary);
    }

    let tasks: Vec<EquivalenceTask> = entries
        .iter()
        .enumerate()
        .map(|(index, entry)| EquivalenceTask::from_entry(index, entry))
        .collect();
    let mut entries: Vec<Option<DatasetEntry>> = entries.into_iter().map(Some).collect();
    let mut progress = ProgressReporter::new("filter", tasks.len());
    let mut sink_error: Option<SieveError> = None;

    let mut pool = ProcessPool::new("filter", options.workers, |task: EquivalenceTask| {
        oracle
            .equal(&task.output, &task.answer)
            .map_err(OracleFailure::from)
    })?;
    pool.run_ordered(tasks, options.check_timeout, |index, result| {
        progress.tick();
        summary.checked += 1;
        let Some(entry) = entries.get_mut(index).and_then(Option::take) else {
            return;
        };

        let written = match result {
            Ok(Ok(true)) => {
                summary.valid += 1;
                valid_sink.write(&entry)
            }
            Ok(Ok(false)) => {
                summary.not_equal += 1;
                reject(rejected_sink, entry, RejectionReason::MathNotEqual)
            }
            Ok(Err(failure)) => {
                summary.exceptions += 1;
                log::warn!("Exception in processing entry {}: {}", index, failure.message);
                reject(rejected_sink, entry, RejectionReason::Exception(failure.kind))
            }
            Err(failure) => {
                summary.exceptions += 1;
                log::warn!("Exception in processing entry {}: {}", index, failure);
                reject(
                    rejected_sink,
                    entry,
                    RejectionReason::Exception(failure.kind().to_string()),
                )
            }
        };
        if let Err(e) = written {
            sink_error.get_or_insert(e);
        }
    })?;
    pool.shutdown();
    progress.finish();

    match sink_error {
        Some(e) => Err(e),
        None => Ok(summary),
    }
}

/// Oracle selected by configuration: external grader when configured,
/// built-in comparison otherwise.
pub fn oracle_for(config: &FilterConfig) -> Result<Box<dyn EquivalenceOracle>> {
    if config.oracle_command.is_empty() {
        return Ok(Box::new(ExactMatchOracle::default()));
    }
    let oracle = CommandOracle::new(config.oracle_command.clone(), config.check_timeout)
        .map_err(|e| SieveError::Config(e.to_string()))?;
    Ok(Box::new(oracle))
}

/// Whole filter stage: validate, read, split, write both streams.
pub fn run_filter_stage(config: &FilterConfig) -> Result<FilterSummary> {
    validate_filter_config(config)?;
    let input = read_lines(&config.input)?;
    let oracle = oracle_for(config)?;
    let mut valid_sink = JsonlWriter::create(&config.output)?;
    let mut rejected_sink = JsonlWriter::create(&config.rejected_output)?;

    log::info!(
        "Filtering {} -> {} (rejected: {}, compare_gt={})",
        config.input.display(),
        config.output.display(),
        config.rejected_output.display(),
        config.compare_gt
    );
    let mut summary = run_filter(
        &input.lines,
        &FilterOptions::from(config),
        oracle.as_ref(),
        &mut valid_sink,
        &mut rejected_sink,
    )?;
    summary.lines += input.undecodable;
    summary.malformed += input.undecodable;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::OracleError;
    use serde_json::json;

    fn entry(value: Value) -> DatasetEntry {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn validity_rules() {
        assert!(is_valid(&entry(json!({"input": 1, "output": 2, "error": null}))));
        assert!(is_valid(&entry(json!({"input": {"a": 1}, "output": "x"}))));
        assert!(!is_valid(&entry(json!({"input": 1, "output": ""}))));
        assert!(!is_valid(&entry(json!({"input": null, "output": 2}))));
        assert!(!is_valid(&entry(json!({"output": 2}))));
        assert!(!is_valid(&entry(json!({"input": 1, "output": 2, "error": "Code is too short"}))));
        assert!(is_valid(&entry(json!({"input": 0, "output": false}))));
    }

    #[test]
    fn rejection_reasons_render() {
        assert_eq!(RejectionReason::InvalidEntry.to_string(), "invalid_entry");
        assert_eq!(RejectionReason::MathNotEqual.to_string(), "math_not_equal");
        assert_eq!(
            RejectionReason::Exception("Timeout".to_string()).to_string(),
            "exception:Timeout"
        );
    }

    #[test]
    fn tasks_stringify_non_strings() {
        let task = EquivalenceTask::from_entry(3, &entry(json!({"output": [1, 2], "answer": "[1, 2]"})));
        assert_eq!(task.index, 3);
        assert_eq!(task.output, "[1, 2]");
        assert_eq!(task.answer, "[1, 2]");

        let task = EquivalenceTask::from_entry(
            1,
            &entry(json!({"output": {"a": [true, null, "x"], "b": "it's"}, "answer": 2.5})),
        );
        assert_eq!(task.output, r#"{'a': [True, None, 'x'], 'b': "it's"}"#);
        assert_eq!(task.answer, "2.5");

        let task = EquivalenceTask::from_entry(0, &entry(json!({"output": false, "answer": ["a\\b\n"]})));
        assert_eq!(task.output, "False");
        assert_eq!(task.answer, r"['a\\b\n']");

        let task = EquivalenceTask::from_entry(0, &entry(json!({"output": "7"})));
        assert_eq!(task.answer, "");
    }

    struct Scripted;

    impl EquivalenceOracle for Scripted {
        fn equal(&self, output: &str, answer: &str) -> std::result::Result<bool, OracleError> {
            match answer {
                "error" => Err(OracleError::CommandError("scripted".to_string())),
                _ => Ok(output == answer),
            }
        }
    }

    fn scratch() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("sievebox-filter-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn routes_records_by_verdict() {
        let dir = scratch();
        let mut valid = JsonlWriter::create(&dir.join("valid.jsonl")).unwrap();
        let mut rejected = JsonlWriter::create(&dir.join("rejected.jsonl")).unwrap();
        let lines: Vec<String> = vec![
            json!({"input": 1, "output": 4, "answer": "4"}).to_string(),
            json!({"input": 1, "output": 5, "answer": "4"}).to_string(),
            json!({"input": 1, "output": 5, "answer": "error"}).to_string(),
            json!({"input": null, "output": 5, "answer": "5"}).to_string(),
            "".to_string(),
            "{broken".to_string(),
        ];
        let options = FilterOptions {
            compare_gt: true,
            workers: 2,
            check_timeout: Duration::from_secs(5),
        };

        let summary = run_filter(&lines, &options, &Scripted, &mut valid, &mut rejected).unwrap();
        assert_eq!(
            summary,
            FilterSummary {
                lines: 6,
                malformed: 1,
                invalid: 1,
                loaded: 3,
                checked: 3,
                valid: 1,
                not_equal: 1,
                exceptions: 1,
            }
        );

        let rejected = read_lines(&dir.join("rejected.jsonl")).unwrap().lines;
        let reasons: Vec<String> = rejected
            .iter()
            .map(|l| parse_entry(l).unwrap()[REJECTION_FIELD].as_str().unwrap().to_string())
            .collect();
        assert_eq!(reasons, ["invalid_entry", "math_not_equal", "exception:CommandError"]);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn without_comparison_every_valid_record_passes() {
        let dir = scratch();
        let mut valid = JsonlWriter::create(&dir.join("valid.jsonl")).unwrap();
        let mut rejected = JsonlWriter::create(&dir.join("rejected.jsonl")).unwrap();
        let lines = vec![
            json!({"input": 1, "output": 5, "answer": "4"}).to_string(),
            json!({"input": 1, "output": null}).to_string(),
        ];
        let options = FilterOptions {
            compare_gt: false,
            workers: 1,
            check_timeout: Duration::from_secs(1),
        };

        let summary = run_filter(&lines, &options, &Scripted, &mut valid, &mut rejected).unwrap();
        assert_eq!(summary.valid, 1);
        assert_eq!(summary.invalid, 1);
        assert_eq!(summary.checked, 0);
        assert_eq!(valid.written(), 1);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn undecodable_input_lines_count_as_malformed() {
        let dir = scratch();
        let input = dir.join("executed.jsonl");
        let mut body = json!({"input": 1, "output": 2, "error": null}).to_string().into_bytes();
        body.extend_from_slice(b"\n{\"output\": \"\xff\"}\n");
        std::fs::write(&input, body).unwrap();

        let mut config = FilterConfig::new(&input, dir.join("valid.jsonl"));
        config.workers = 1;
        let summary = run_filter_stage(&config).unwrap();
        assert_eq!(summary.lines, 2);
        assert_eq!(summary.malformed, 1);
        assert_eq!(summary.valid, 1);
        std::fs::remove_dir_all(dir).unwrap();
    }
}
