use crate::config::types::{Result, SieveError};
use crate::core::types::{LaunchOutcome, SandboxLaunchRequest};
use crate::kernel::signal::{self, KillReport, TERM_GRACE};
use nix::unistd::Pid;
use std::fs::File;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

fn to_process_error(prefix: &str, err: impl std::fmt::Display) -> SieveError {
    SieveError::Process(format!("{}: {}", prefix, err))
}

/// Launch a command in its own process group and supervise it until it
/// exits or `wall_time_limit` elapses.
///
/// On expiry the group gets SIGTERM, then SIGKILL after [`TERM_GRACE`]; the
/// leader is always reaped. The group is swept with SIGKILL afterwards in
/// every case, so backgrounded descendants never outlive the launch.
pub fn launch_with_deadline(req: &SandboxLaunchRequest) -> Result<LaunchOutcome> {
    let program = req
        .command
        .first()
        .ok_or_else(|| SieveError::Process("empty launch command".to_string()))?;

    let mut cmd = Command::new(program);
    cmd.args(&req.command[1..])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .process_group(0);

    match &req.stderr_path {
        Some(path) => {
            let log = File::create(path)
                .map_err(|e| to_process_error(&format!("create {}", path.display()), e))?;
            cmd.stderr(Stdio::from(log));
        }
        None => {
            cmd.stderr(Stdio::null());
        }
    }
    if let Some(dir) = &req.workdir {
        cmd.current_dir(dir);
    }
    for (key, value) in &req.environment {
        cmd.env(key, value);
    }

    // SAFETY: the hook only issues prctl, which is async-signal-safe.
    unsafe {
        cmd.pre_exec(signal::set_parent_death_signal);
    }

    let started = Instant::now();
    let mut child = cmd.spawn().map_err(|e| to_process_error("spawn", e))?;
    let pid = Pid::from_raw(child.id() as i32);
    log::debug!("[{}] launched {} as pid {}", req.instance_id, program, pid);

    let (status, timed_out, kill_report) = supervise(&mut child, pid, req.wall_time_limit, started)?;
    let wall_time = started.elapsed();

    let swept_descendants = signal::sweep_group(pid);
    if swept_descendants {
        log::debug!("[{}] swept leftover members of group {}", req.instance_id, pid);
    }

    Ok(LaunchOutcome {
        pid: pid.as_raw(),
        exit_code: status.code(),
        term_signal: status.signal(),
        timed_out,
        wall_time,
        kill_report,
        swept_descendants,
    })
}

fn supervise(
    child: &mut Child,
    pid: Pid,
    wall_limit: Duration,
    started: Instant,
) -> Result<(ExitStatus, bool, Option<KillReport>)> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok((status, false, None)),
            Ok(None) => {
                if started.elapsed() >= wall_limit {
                    break;
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                let _ = signal::kill_and_reap(pid);
                return Err(to_process_error("try_wait", e));
            }
        }
    }

    let mut exited = None;
    let report = signal::terminate_group(pid, TERM_GRACE, || {
        if let Ok(Some(status)) = child.try_wait() {
            exited = Some(status);
        }
        exited.is_some()
    });
    let status = match exited {
        Some(status) => status,
        None => child.wait().map_err(|e| to_process_error("wait", e))?,
    };
    log::debug!(
        "pid {} exceeded {:?} (term_sent={}, kill_sent={}, waited {}ms)",
        pid,
        wall_limit,
        report.term_sent,
        report.kill_sent,
        report.waited_ms
    );
    Ok((status, true, Some(report)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str, limit: Duration) -> SandboxLaunchRequest {
        SandboxLaunchRequest::new(
            "supervisor-test",
            vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            limit,
        )
    }

    #[test]
    fn reports_exit_code() {
        let outcome = launch_with_deadline(&sh("exit 3", Duration::from_secs(5))).unwrap();
        assert_eq!(outcome.exit_code, Some(3));
        assert!(!outcome.timed_out);
        assert!(outcome.kill_report.is_none());
    }

    #[test]
    fn deadline_terminates_and_reaps() {
        let started = Instant::now();
        let outcome = launch_with_deadline(&sh("sleep 30", Duration::from_millis(200))).unwrap();
        assert!(outcome.timed_out);
        assert!(!outcome.success());
        assert!(outcome.kill_report.as_ref().map(|r| r.term_sent).unwrap_or(false));
        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(!signal::process_exists(Pid::from_raw(outcome.pid)));
    }

    #[test]
    fn stderr_goes_to_file() {
        let dir = std::env::temp_dir().join(format!("sievebox-sup-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let log = dir.join("stderr.log");
        let req = sh("echo oops >&2", Duration::from_secs(5)).with_stderr(&log);
        let outcome = launch_with_deadline(&req).unwrap();
        assert!(outcome.success());
        assert_eq!(std::fs::read_to_string(&log).unwrap().trim(), "oops");
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn missing_program_is_a_launch_error() {
        let req = SandboxLaunchRequest::new(
            "supervisor-test",
            vec!["/nonexistent/sievebox-interpreter".to_string()],
            Duration::from_secs(1),
        );
        assert!(matches!(launch_with_deadline(&req), Err(SieveError::Process(_))));
    }
}
