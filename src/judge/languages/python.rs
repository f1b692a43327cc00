use crate::judge::adapter::RuntimeAdapter;
use crate::judge::HarnessRun;

#[derive(Debug, Clone, Default)]
pub struct PythonAdapter;

/// Snippet harness, run as
/// `python3 -B -c HARNESS <source> <outcome> <ceiling> <max_digits>`.
///
/// Reports `input`/`output` bindings in the tagged `Captured` form, the
/// buffered stdout, every `Name` identifier in the source, and the
/// traceback of anything raised (`SystemExit` included). The report is
/// written to a temp file and renamed into place.
///
/// A top-level integer whose digit count, estimated from its bit length,
/// already exceeds `max_digits` is reported as `oversized_int` without
/// calling `str()` on it. Lone surrogates are written as `?`.
pub const HARNESS: &str = r#"
import ast, io, json, os, sys, traceback
from contextlib import redirect_stdout

source_path, outcome_path = sys.argv[1], sys.argv[2]
ceiling, max_digits = int(sys.argv[3]), int(sys.argv[4])
if hasattr(sys, "set_int_max_str_digits"):
    sys.set_int_max_str_digits(ceiling)

_UNSET = object()

def _opaque(value):
    try:
        return {"opaque": str(value)}
    except BaseException:
        return {"opaque": "<unprintable %s>" % type(value).__name__}

def _min_digits(value):
    # Lower bound on len(str(value)), sign included.
    bits = abs(value).bit_length()
    return int((bits - 1) * 0.3010299956639812) + 1 + (value < 0)

def encode(value, depth=0):
    if depth > 200:
        return _opaque(value)
    try:
        if value is None:
            return "null"
        if isinstance(value, bool):
            return {"bool": value}
        if isinstance(value, int):
            if depth == 0 and _min_digits(value) > max_digits:
                return {"oversized_int": {"digits": _min_digits(value)}}
            try:
                return {"int": str(value)}
            except ValueError:
                return {"oversized_int": {"digits": int(value.bit_length() * 0.30103) + 1}}
        if isinstance(value, float):
            return {"float": repr(value)}
        if isinstance(value, str):
            return {"str": value}
        if isinstance(value, list):
            return {"list": [encode(v, depth + 1) for v in value]}
        if isinstance(value, tuple):
            return {"tuple": [encode(v, depth + 1) for v in value]}
        if isinstance(value, dict):
            return {"dict": [[str(k), encode(v, depth + 1)] for k, v in value.items()]}
    except RecursionError:
        pass
    return _opaque(value)

with open(source_path, encoding="utf-8") as fh:
    source = fh.read()

report = {"input": None, "output": None, "stdout": "", "names": [], "traceback": None}
buffer = io.StringIO()
scope = {}
try:
    tree = ast.parse(source)
    report["names"] = sorted({n.id for n in ast.walk(tree) if isinstance(n, ast.Name)})
    with redirect_stdout(buffer):
        exec(compile(tree, "snippet.py", "exec"), scope)
    value = scope.get("input", _UNSET)
    if value is not _UNSET:
        report["input"] = encode(value)
    value = scope.get("output", _UNSET)
    if value is not _UNSET:
        report["output"] = encode(value)
except BaseException:
    report["input"] = None
    report["output"] = None
    report["traceback"] = traceback.format_exc()
report["stdout"] = buffer.getvalue()

tmp_path = outcome_path + ".tmp"
with open(tmp_path, "w", encoding="utf-8", errors="replace") as fh:
    json.dump(report, fh, ensure_ascii=False)
os.replace(tmp_path, outcome_path)
"#;

const PROBE: &str = "import ast, json, sys; print(sys.version.split()[0])";

impl RuntimeAdapter for PythonAdapter {
    fn language(&self) -> &'static str {
        "python"
    }

    fn source_file_name(&self) -> &'static str {
        "snippet.py"
    }

    fn run_command(&self, interpreter: &str, run: &HarnessRun) -> Vec<String> {
        vec![
            interpreter.to_string(),
            "-B".to_string(),
            "-c".to_string(),
            HARNESS.to_string(),
            run.source.to_string_lossy().to_string(),
            run.outcome.to_string_lossy().to_string(),
            run.digit_ceiling.to_string(),
            run.max_digits.to_string(),
        ]
    }

    fn probe_command(&self, interpreter: &str) -> Vec<String> {
        vec![interpreter.to_string(), "-c".to_string(), PROBE.to_string()]
    }
}
