//! Process-group termination, reaping, and parent-death wiring.
//!
//! Every process sievebox starts is either a process-group leader (sandbox
//! children, pool workers) or a member of one, so termination always
//! targets the whole group and never leaves descendants behind.

use crate::config::types::{Result, SieveError};
use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Grace period between SIGTERM and SIGKILL on forced termination
pub const TERM_GRACE: Duration = Duration::from_millis(200);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Signal escalation report for timeout/forced termination paths.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct KillReport {
    pub term_sent: bool,
    pub kill_sent: bool,
    pub waited_ms: u64,
    pub notes: Vec<String>,
}

/// Terminate a process group: SIGTERM, wait up to `grace` for `has_exited`
/// to report the leader gone, then SIGKILL whatever is left in the group.
///
/// The caller still owns reaping the leader.
pub fn terminate_group(
    leader: Pid,
    grace: Duration,
    mut has_exited: impl FnMut() -> bool,
) -> KillReport {
    let mut report = KillReport::default();
    let start = Instant::now();

    match killpg(leader, Signal::SIGTERM) {
        Ok(()) => report.term_sent = true,
        Err(Errno::ESRCH) => report.notes.push("group already gone at SIGTERM".to_string()),
        Err(err) => {
            let _ = kill(leader, Signal::SIGTERM);
            report.term_sent = true;
            report
                .notes
                .push(format!("group SIGTERM fallback used: {err}"));
        }
    }

    while start.elapsed() < grace && !has_exited() {
        std::thread::sleep(POLL_INTERVAL);
    }

    // The group may outlive its leader, so SIGKILL is sent regardless.
    match killpg(leader, Signal::SIGKILL) {
        Ok(()) => report.kill_sent = true,
        Err(Errno::ESRCH) => {}
        Err(err) => {
            let _ = kill(leader, Signal::SIGKILL);
            report.kill_sent = true;
            report
                .notes
                .push(format!("group SIGKILL fallback used: {err}"));
        }
    }

    report.waited_ms = start.elapsed().as_millis() as u64;
    report
}

/// SIGKILL every remaining member of a process group.
/// Returns true when something was still alive.
pub fn sweep_group(pgid: Pid) -> bool {
    match killpg(pgid, Signal::SIGKILL) {
        Ok(()) => true,
        Err(Errno::ESRCH) => false,
        Err(err) => {
            log::warn!("Failed to sweep process group {}: {}", pgid, err);
            false
        }
    }
}

/// Arrange for SIGKILL when the parent dies.
///
/// Safe to call between fork and exec: no allocation, no logging.
pub fn set_parent_death_signal() -> std::io::Result<()> {
    #[cfg(target_os = "linux")]
    {
        nix::sys::prctl::set_pdeathsig(Signal::SIGKILL)
            .map_err(|e| std::io::Error::from_raw_os_error(e as i32))
    }

    #[cfg(not(target_os = "linux"))]
    {
        Ok(())
    }
}

/// Blocking reap of one child, retrying on EINTR
pub fn reap(pid: Pid) -> Result<WaitStatus> {
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::StillAlive) => continue,
            Ok(status) => return Ok(status),
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(SieveError::Process(format!("waitpid({pid}): {e}"))),
        }
    }
}

/// Wait up to `grace` for a child to exit on its own, then kill its group
/// and reap it. Never returns with the child still unreaped.
pub fn reap_with_grace(pid: Pid, grace: Duration) -> Result<WaitStatus> {
    let start = Instant::now();
    loop {
        match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => {
                if start.elapsed() >= grace {
                    log::debug!("Child {} ignored shutdown for {:?}; killing", pid, grace);
                    let _ = killpg(pid, Signal::SIGKILL);
                    let _ = kill(pid, Signal::SIGKILL);
                    return reap(pid);
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Ok(status) => return Ok(status),
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(SieveError::Process(format!("waitpid({pid}): {e}"))),
        }
    }
}

/// Kill a child's whole group immediately and reap the child
pub fn kill_and_reap(pid: Pid) -> Result<WaitStatus> {
    if killpg(pid, Signal::SIGKILL).is_err() {
        let _ = kill(pid, Signal::SIGKILL);
    }
    reap(pid)
}

/// True while `pid` names a live (or unreaped) process
pub fn process_exists(pid: Pid) -> bool {
    !matches!(kill(pid, None), Err(Errno::ESRCH))
}

/// True while any member of process group `pgid` exists
pub fn group_exists(pgid: Pid) -> bool {
    !matches!(killpg(pgid, None), Err(Errno::ESRCH))
}
