use crate::config::file::{seconds_to_duration, SieveFileConfig};
use crate::config::types::{ExtractConfig, FilterConfig, SandboxConfig};
use crate::exec::executor::SnippetExecutor;
use crate::judge::registry::adapter_for;
use crate::pipeline::extract::run_extract_stage;
use crate::pipeline::filter::run_filter_stage;
use crate::record::value::Captured;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

/// Filter-stage parallelism when neither a flag nor the config file sets it
const CLI_FILTER_PROCESSES: usize = 64;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every record's code snippet in the sandbox and capture input/output
    Extract {
        /// Input JSONL file path
        #[arg(long)]
        input: PathBuf,
        /// Output JSONL file path
        #[arg(long)]
        output: PathBuf,
        /// Extract code from a markdown block in the code field
        #[arg(long)]
        extract: bool,
        /// Execution timeout per snippet in seconds
        #[arg(long)]
        timeout: Option<f64>,
        /// Number of worker processes
        #[arg(long)]
        workers: Option<usize>,
        /// Python interpreter used for snippets
        #[arg(long)]
        interpreter: Option<String>,
        /// Keep per-run workspaces on disk
        #[arg(long)]
        keep_workspaces: bool,
        /// Configuration file (default: ./sievebox.json when present)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Split executed records into valid and rejected streams
    Filter {
        /// Input JSONL file path
        #[arg(long)]
        input: PathBuf,
        /// Output (valid) JSONL file path
        #[arg(long)]
        output: PathBuf,
        /// Rejected JSONL file path (default: <output>_rejected.jsonl)
        #[arg(long)]
        rejected_output: Option<PathBuf>,
        /// Compare captured outputs with the ground-truth answer
        #[arg(long)]
        compare_gt: bool,
        /// Timeout per equivalence check in seconds
        #[arg(long)]
        timeout: Option<f64>,
        /// Number of parallel processes
        #[arg(long)]
        num_processes: Option<usize>,
        /// External grader: "<program> [args..]", called with <output> <answer>
        #[arg(long)]
        oracle_cmd: Option<String>,
        /// Configuration file (default: ./sievebox.json when present)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Extract into <output>_executed.jsonl, then filter into <output>
    Run {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long)]
        extract: bool,
        #[arg(long)]
        compare_gt: bool,
        /// Execution timeout per snippet in seconds
        #[arg(long)]
        exec_timeout: Option<f64>,
        /// Timeout per equivalence check in seconds
        #[arg(long)]
        check_timeout: Option<f64>,
        /// Extraction worker processes
        #[arg(long)]
        workers: Option<usize>,
        /// Filter worker processes
        #[arg(long)]
        num_processes: Option<usize>,
        #[arg(long)]
        interpreter: Option<String>,
        #[arg(long)]
        oracle_cmd: Option<String>,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Check that the snippet interpreter is installed and usable
    CheckDeps {
        /// Verbose output showing detailed version information
        #[arg(long)]
        verbose: bool,
        #[arg(long)]
        interpreter: Option<String>,
    },
}

extern "C" fn signal_handler(sig: i32) {
    // Only async-signal-safe calls here: raw write(2) and _exit.
    // Pool workers and sandbox children follow through their parent-death signal.
    let msg = b"sievebox: signal received, exiting\n";
    unsafe {
        libc::write(2, msg.as_ptr() as *const libc::c_void, msg.len());
        libc::_exit(128 + sig);
    }
}

fn handler_address() -> libc::sighandler_t {
    signal_handler as extern "C" fn(i32) as *const () as libc::sighandler_t
}

fn setup_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGTERM, handler_address());
        libc::signal(libc::SIGINT, handler_address());
    }
}

pub fn run() -> Result<()> {
    setup_signal_handlers();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if !cfg!(unix) {
        anyhow::bail!("sievebox requires a Unix-like system (fork, process groups)");
    }

    let cli = Cli::parse();
    match cli.command {
        Commands::Extract {
            input,
            output,
            extract,
            timeout,
            workers,
            interpreter,
            keep_workspaces,
            config,
        } => {
            let file = SieveFileConfig::load_or_default(config.as_deref())?;
            let mut cfg = ExtractConfig::new(input, output);
            file.apply_to_extract(&mut cfg)?;
            apply_extract_flags(&mut cfg, extract, timeout, workers, interpreter, keep_workspaces)?;

            let summary = run_extract_stage(&cfg).context("extraction stage failed")?;
            println!("{summary}");
            println!("Processing complete. Output saved to {}", cfg.output.display());
            Ok(())
        }
        Commands::Filter {
            input,
            output,
            rejected_output,
            compare_gt,
            timeout,
            num_processes,
            oracle_cmd,
            config,
        } => {
            let file = SieveFileConfig::load_or_default(config.as_deref())?;
            let mut cfg = FilterConfig::new(input, output);
            file.apply_to_filter(&mut cfg)?;
            apply_filter_flags(&mut cfg, &file, compare_gt, timeout, num_processes, oracle_cmd)?;
            if let Some(path) = rejected_output {
                cfg.rejected_output = path;
            }

            let summary = run_filter_stage(&cfg).context("filter stage failed")?;
            println!("{summary}");
            Ok(())
        }
        Commands::Run {
            input,
            output,
            extract,
            compare_gt,
            exec_timeout,
            check_timeout,
            workers,
            num_processes,
            interpreter,
            oracle_cmd,
            config,
        } => {
            let file = SieveFileConfig::load_or_default(config.as_deref())?;
            let executed = derive_executed_path(&output);

            let mut extract_cfg = ExtractConfig::new(input, &executed);
            file.apply_to_extract(&mut extract_cfg)?;
            apply_extract_flags(&mut extract_cfg, extract, exec_timeout, workers, interpreter, false)?;

            let mut filter_cfg = FilterConfig::new(&executed, output);
            file.apply_to_filter(&mut filter_cfg)?;
            apply_filter_flags(&mut filter_cfg, &file, compare_gt, check_timeout, num_processes, oracle_cmd)?;

            let extracted = run_extract_stage(&extract_cfg).context("extraction stage failed")?;
            println!("{extracted}");
            let filtered = run_filter_stage(&filter_cfg).context("filter stage failed")?;
            println!("{filtered}");
            Ok(())
        }
        Commands::CheckDeps {
            verbose,
            interpreter,
        } => check_dependencies(verbose, interpreter),
    }
}

fn apply_extract_flags(
    cfg: &mut ExtractConfig,
    extract: bool,
    timeout: Option<f64>,
    workers: Option<usize>,
    interpreter: Option<String>,
    keep_workspaces: bool,
) -> Result<()> {
    if extract {
        cfg.extract_code = true;
    }
    if let Some(seconds) = timeout {
        cfg.sandbox.wall_time_limit = seconds_to_duration("--timeout", seconds)?;
    }
    if let Some(workers) = workers {
        cfg.workers = workers;
    }
    if let Some(interpreter) = interpreter {
        cfg.sandbox.interpreter = interpreter;
    }
    if keep_workspaces {
        cfg.sandbox.keep_workspaces = true;
    }
    Ok(())
}

fn apply_filter_flags(
    cfg: &mut FilterConfig,
    file: &SieveFileConfig,
    compare_gt: bool,
    timeout: Option<f64>,
    num_processes: Option<usize>,
    oracle_cmd: Option<String>,
) -> Result<()> {
    if compare_gt {
        cfg.compare_gt = true;
    }
    if let Some(seconds) = timeout {
        cfg.check_timeout = seconds_to_duration("--timeout", seconds)?;
    }
    cfg.workers = num_processes
        .or(file.filter.workers)
        .unwrap_or(CLI_FILTER_PROCESSES);
    if let Some(line) = oracle_cmd {
        cfg.oracle_command = line.split_whitespace().map(str::to_string).collect();
    }
    Ok(())
}

/// `out/final.jsonl` -> `out/final_executed.jsonl`, `final` -> `final_executed.jsonl`
fn derive_executed_path(output: &Path) -> PathBuf {
    let text = output.to_string_lossy();
    let stem = text.strip_suffix(".jsonl").unwrap_or(&text);
    PathBuf::from(format!("{stem}_executed.jsonl"))
}

fn check_dependencies(verbose: bool, interpreter: Option<String>) -> Result<()> {
    use std::process::Command;

    let mut sandbox = SandboxConfig::default();
    if let Some(interpreter) = interpreter {
        sandbox.interpreter = interpreter;
    }
    let adapter = adapter_for(&sandbox.language)?;

    println!("Checking snippet runtime dependencies...");
    let probe = adapter.probe_command(&sandbox.interpreter);
    let version = match Command::new(&probe[0]).args(&probe[1..]).output() {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout).trim().to_string(),
        Ok(out) => {
            println!("❌ {} - FAILED ({})", sandbox.interpreter, out.status);
            if verbose {
                println!("  {}", String::from_utf8_lossy(&out.stderr).trim());
            }
            anyhow::bail!("interpreter '{}' is missing ast/json support", sandbox.interpreter);
        }
        Err(e) => {
            println!("❌ {} - NOT FOUND", sandbox.interpreter);
            anyhow::bail!("interpreter '{}' could not be started: {}", sandbox.interpreter, e);
        }
    };
    println!("✅ {} - OK", adapter.language());
    if verbose {
        println!("  {} -> {}", sandbox.interpreter, version);
    }

    // End-to-end harness run through the real sandbox path.
    let mut smoke = sandbox.clone();
    smoke.min_statement_lines = 0;
    let executor = SnippetExecutor::new(smoke)?;
    let outcome = executor.execute("input = {'n': 6}\noutput = input['n'] * 7\n");
    match (&outcome.output, &outcome.error) {
        (Some(Captured::Int(value)), None) if value == "42" => {
            println!("✅ sandbox harness - OK");
            Ok(())
        }
        _ => {
            println!("❌ sandbox harness - FAILED");
            if verbose {
                println!("  {:?}", outcome);
            }
            anyhow::bail!("sandbox harness smoke run failed")
        }
    }
}
