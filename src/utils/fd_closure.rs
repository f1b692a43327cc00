//! File descriptor closure for forked pool workers
//!
//! A forked worker inherits every descriptor of the orchestrator, including
//! the sockets of its sibling workers. Holding those open would keep the
//! siblings from ever seeing EOF, so each worker closes everything except
//! stdio and its own socket right after fork.
//! - Prefer close_range
//! - Fallback to iterating /proc/self/fd

use crate::config::types::{Result, SieveError};
use std::fs;
use std::os::unix::io::RawFd;

use nix::unistd::close;

/// Close all file descriptors above stderr except `keep`
pub fn close_inherited_fds_except(keep: RawFd) -> Result<()> {
    #[cfg(target_os = "linux")]
    {
        let below = keep <= 3 || try_close_range(3, (keep - 1) as u32);
        if below && try_close_range((keep + 1) as u32, u32::MAX) {
            return Ok(());
        }
    }

    close_fds_via_proc(keep)
}

/// Try to use the close_range syscall (Linux 5.9+)
#[cfg(target_os = "linux")]
fn try_close_range(first: u32, last: u32) -> bool {
    // Same number on every architecture that has the syscall.
    const SYS_CLOSE_RANGE: libc::c_long = 436;

    let result = unsafe { libc::syscall(SYS_CLOSE_RANGE, first, last, 0 as libc::c_uint) };
    result == 0
}

/// Close FDs by iterating /proc/self/fd
fn close_fds_via_proc(keep: RawFd) -> Result<()> {
    // Collect first: the directory handle itself lives in this listing.
    let fds = get_open_fds()?;

    let mut failed = Vec::new();
    for fd in fds.into_iter().filter(|fd| *fd > 2 && *fd != keep) {
        if let Err(e) = close(fd) {
            if e != nix::errno::Errno::EBADF {
                failed.push(format!("fd {fd}: {e}"));
            }
        }
    }

    if !failed.is_empty() {
        return Err(SieveError::Process(format!(
            "Failed to close {} inherited FD(s): {}",
            failed.len(),
            failed.join(", ")
        )));
    }
    Ok(())
}

/// Get list of open file descriptors
pub fn get_open_fds() -> Result<Vec<RawFd>> {
    let fd_dir = "/proc/self/fd";

    let entries = fs::read_dir(fd_dir)
        .map_err(|e| SieveError::Process(format!("Failed to read {}: {}", fd_dir, e)))?;

    let mut fds: Vec<RawFd> = entries
        .flatten()
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter_map(|name| name.parse::<RawFd>().ok())
        .collect();

    fds.sort_unstable();
    Ok(fds)
}
