//! Integration tests for the snippet sandbox
//!
//! These run real snippets through the interpreter harness. Each test
//! returns early when `python3` is not installed.

use nix::unistd::Pid;
use sievebox::config::types::{ExtractConfig, SandboxConfig};
use sievebox::exec::executor::{SnippetExecutor, TOO_SHORT_ERROR};
use sievebox::kernel::signal::process_exists;
use sievebox::pipeline::extract::ExtractionWorker;
use sievebox::record::normalize::normalize;
use sievebox::record::value::Captured;
use serde_json::{json, Value};
use std::process::Command;
use std::time::{Duration, Instant};

fn python_available() -> bool {
    let ok = Command::new("python3")
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false);
    if !ok {
        eprintln!("python3 not available; skipping");
    }
    ok
}

fn executor() -> SnippetExecutor {
    executor_with(SandboxConfig::default())
}

fn executor_with(config: SandboxConfig) -> SnippetExecutor {
    SnippetExecutor::new(config).expect("python adapter")
}

const SQUARE: &str = r#"
import math
# square the input
input = {"n": 12}
n = input["n"]
result = n * n
doubled = result * 2
half = doubled // 2
output = half
"#;

#[test]
fn test_captures_input_and_output() {
    if !python_available() {
        return;
    }
    let outcome = executor().execute(SQUARE);
    assert_eq!(outcome.error, None);
    assert_eq!(outcome.output, Some(Captured::Int("144".to_string())));
    assert_eq!(normalize(outcome.input.unwrap()), json!({"n": 12}));
}

#[test]
fn test_stdout_becomes_output_when_unbound() {
    if !python_available() {
        return;
    }
    let code = "input = [3, 4]\na = input[0]\nb = input[1]\nc = a * a + b * b\nd = c ** 0.5\nprint(int(d))\n";
    let outcome = executor().execute(code);
    assert_eq!(outcome.error, None);
    assert_eq!(outcome.output, Some(Captured::Str("5".to_string())));
}

#[test]
fn test_unused_parameters_are_warned() {
    if !python_available() {
        return;
    }
    let code = "input = {'a': 1, 'b': 2}\na = input['a']\ny = a + 1\nz = y + 1\nw = z + 1\noutput = w\n";
    let outcome = executor().execute(code);
    assert_eq!(outcome.error.as_deref(), Some("Unused input parameters: b"));
    assert!(outcome.input.is_some());
    assert_eq!(outcome.output, Some(Captured::Int("4".to_string())));
}

#[test]
fn test_exception_yields_traceback() {
    if !python_available() {
        return;
    }
    let code = "input = 1\na = 2\nb = 3\nc = 4\nd = 5\noutput = a / 0\n";
    let outcome = executor().execute(code);
    assert!(outcome.input.is_none());
    assert!(outcome.output.is_none());
    let error = outcome.error.unwrap();
    assert!(error.contains("Traceback"), "{error}");
    assert!(error.contains("ZeroDivisionError"), "{error}");
}

#[test]
fn test_system_exit_is_an_exception() {
    if !python_available() {
        return;
    }
    let code = "import sys\ninput = 1\na = 2\nb = 3\nc = 4\nd = 5\nsys.exit(3)\noutput = 1\n";
    let outcome = executor().execute(code);
    assert!(outcome.error.unwrap().contains("SystemExit"));
}

#[test]
fn test_short_snippet_is_not_run() {
    let report = executor().execute_detailed("import os\n# note\noutput = 1\n");
    assert_eq!(report.outcome.error.as_deref(), Some(TOO_SHORT_ERROR));
    assert!(report.launch.is_none());
}

#[test]
fn test_timeout_kills_the_snippet() {
    if !python_available() {
        return;
    }
    let mut config = SandboxConfig::default();
    config.wall_time_limit = Duration::from_secs(1);
    let code = "input = 1\na = 1\nb = 2\nc = 3\nd = 4\nwhile True:\n    a += 1\n";

    let started = Instant::now();
    let report = executor_with(config).execute_detailed(code);
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(
        report.outcome.error.as_deref(),
        Some("Timeout: execution exceeded 1 seconds")
    );
    assert!(report.outcome.input.is_none());
    assert!(report.outcome.output.is_none());

    let launch = report.launch.expect("child was launched");
    assert!(launch.timed_out);
    assert!(!process_exists(Pid::from_raw(launch.pid)));
}

#[test]
fn test_sleeping_descendants_are_swept() {
    if !python_available() {
        return;
    }
    let code = "import subprocess\ninput = 1\nchild = subprocess.Popen(['sleep', '30'])\na = 1\nb = 2\nc = 3\noutput = child.pid\n";
    let outcome = executor().execute(code);
    assert_eq!(outcome.error, None);
    let Some(Captured::Int(pid)) = outcome.output else {
        panic!("expected the child pid");
    };

    // The orphan is reparented; give init a moment to reap it.
    let pid = Pid::from_raw(pid.parse().unwrap());
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline && process_is_running(pid) {
        std::thread::sleep(Duration::from_millis(20));
    }
    assert!(!process_is_running(pid));
}

// Zombies count as gone: a container init may never reap them.
fn process_is_running(pid: Pid) -> bool {
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => !stat
            .rsplit_once(')')
            .map(|(_, rest)| rest.trim_start().starts_with('Z'))
            .unwrap_or(false),
        Err(_) => false,
    }
}

#[test]
fn test_huge_integers_survive_transport() {
    if !python_available() {
        return;
    }
    let code = "input = 10\na = 7\nb = a ** 5000\nc = b + 1\nd = c - 1\noutput = d\n";
    let outcome = executor().execute(code);
    assert_eq!(outcome.error, None);
    match outcome.output {
        Some(Captured::Int(digits)) => assert_eq!(digits.len(), 4226),
        other => panic!("unexpected output {other:?}"),
    }
}

#[test]
fn test_tuples_and_opaque_values() {
    if !python_available() {
        return;
    }
    let code = "input = (1, 'x')\na = {1: 2.5}\nb = {3}\nc = None\nd = float('nan')\noutput = [a, b, c, d]\n";
    let outcome = executor().execute(code);
    assert_eq!(outcome.error, None);
    assert_eq!(normalize(outcome.input.unwrap()), json!([1, "x"]));
    assert_eq!(
        normalize(outcome.output.unwrap()),
        json!([{"1": 2.5}, "{3}", null, "nan"])
    );
}

#[test]
fn test_missing_interpreter_reports_launch_failure() {
    let mut config = SandboxConfig::default();
    config.interpreter = "/nonexistent/python3".to_string();
    let outcome = executor_with(config).execute(SQUARE);
    assert!(outcome.error.unwrap().starts_with("Sandbox launch failed"));
}

#[test]
fn test_workspaces_are_removed() {
    if !python_available() {
        return;
    }
    let root = std::env::temp_dir().join(format!("sievebox-ws-{}", uuid::Uuid::new_v4()));
    let mut config = SandboxConfig::default();
    config.workspace_root = root.clone();
    let outcome = executor_with(config).execute(SQUARE);
    assert_eq!(outcome.error, None);
    let leftovers = std::fs::read_dir(&root).map(|d| d.count()).unwrap_or(0);
    assert_eq!(leftovers, 0);
    let _ = std::fs::remove_dir_all(root);
}

fn extraction_worker() -> ExtractionWorker {
    ExtractionWorker::new(&ExtractConfig::new("raw.jsonl", "executed.jsonl")).expect("python adapter")
}

fn extract_with_output(expr: &str) -> sievebox::record::DatasetEntry {
    let code = format!("input = {{'n': 1}}\na = input['n']\nb = a + 1\nc = b + 1\nd = c + 1\noutput = {expr}\n");
    let line = json!({"problem": "p", "answer": "a", "code": code}).to_string();
    extraction_worker().process_line(&line).expect("record kept")
}

#[test]
fn test_output_over_max_digits_is_nulled_with_marker() {
    if !python_available() {
        return;
    }
    let entry = extract_with_output("10 ** 10001");
    assert_eq!(entry["output"], Value::Null);
    assert_eq!(entry["input"], json!({"n": 1}));
    let error = entry["error"].as_str().unwrap();
    assert!(error.starts_with("output is too large (> "), "{error}");
}

#[test]
fn test_output_at_max_digits_is_preserved() {
    if !python_available() {
        return;
    }
    let entry = extract_with_output("10 ** 9999");
    assert_eq!(entry["error"], Value::Null);
    let digits = entry["output"].to_string();
    assert_eq!(digits.len(), 10_000);
    assert!(digits.starts_with('1'));
}

#[test]
fn test_one_digit_over_the_limit_is_rejected() {
    if !python_available() {
        return;
    }
    let entry = extract_with_output("10 ** 10000");
    assert_eq!(entry["output"], Value::Null);
    assert_eq!(entry["error"], json!("output is too large (> 10001 digits)"));

    let entry = extract_with_output("-(10 ** 9999)");
    assert_eq!(entry["output"], Value::Null);
    assert_eq!(entry["error"], json!("output is too large (> 10001 digits)"));
}

#[test]
fn test_output_over_interpreter_ceiling_is_flagged_quickly() {
    if !python_available() {
        return;
    }
    let started = Instant::now();
    let entry = extract_with_output("10 ** 1000001");
    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(entry["output"], Value::Null);
    assert_eq!(entry["input"], json!({"n": 1}));
    assert_eq!(entry["error"], json!("output is too large (> 1000001 digits)"));
}

#[test]
fn test_large_output_does_not_spend_the_deadline_rendering() {
    if !python_available() {
        return;
    }
    let started = Instant::now();
    let entry = extract_with_output("7 ** 400000");
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(entry["output"], Value::Null);
    assert!(entry["error"].as_str().unwrap().starts_with("output is too large"));
}

#[test]
fn test_lone_surrogate_output_still_reports() {
    if !python_available() {
        return;
    }
    let code = "input = 1\na = 2\nb = 3\nc = 4\nd = 5\noutput = 'a\\ud800b'\n";
    let outcome = executor().execute(code);
    assert_eq!(outcome.error, None);
    assert_eq!(outcome.output, Some(Captured::Str("a?b".to_string())));
}
