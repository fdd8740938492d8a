//! Terminal detachment
//!
//! Standard double-fork daemonization: redirect the stdio descriptors to
//! the null device, fork and let the parent exit, start a new session, then
//! fork once more so the surviving process is not a session leader and can
//! never reacquire a controlling terminal.

use nix::unistd::{fork, setsid, ForkResult};
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::process;
use thiserror::Error;

/// Errors from the daemonization sequence. All are fatal; fork failure in
/// particular signals resource exhaustion that a retry will not fix.
#[derive(Debug, Error)]
pub enum DaemonizeError {
    #[error("failed to redirect {stream} to /dev/null: {source}")]
    Redirect {
        stream: &'static str,
        source: io::Error,
    },

    #[error("fork failed: {0}")]
    Fork(#[source] io::Error),

    #[error("setsid failed: {0}")]
    Setsid(#[source] io::Error),
}

/// Detach from the controlling terminal.
///
/// On success the calling process is the final daemon: stdio points at the
/// null device, it belongs to a fresh session, and it is not the session
/// leader. The intermediate parents exit with status 0 inside this call.
pub fn daemonize() -> Result<(), DaemonizeError> {
    redirect_stdio()?;

    fork_and_continue_in_child()?;
    setsid().map_err(|e| DaemonizeError::Setsid(errno_to_io(e)))?;
    fork_and_continue_in_child()?;

    Ok(())
}

/// Point stdin at /dev/null for reading, stdout and stderr at it for
/// writing. Descriptor redirection happens before the first fork so any
/// failure is still reported on the original stderr.
fn redirect_stdio() -> Result<(), DaemonizeError> {
    let null_in = File::open("/dev/null").map_err(|source| DaemonizeError::Redirect {
        stream: "stdin",
        source,
    })?;
    dup_onto(null_in.as_raw_fd(), libc::STDIN_FILENO, "stdin")?;

    let null_out = OpenOptions::new()
        .write(true)
        .open("/dev/null")
        .map_err(|source| DaemonizeError::Redirect {
            stream: "stdout/stderr",
            source,
        })?;
    dup_onto(null_out.as_raw_fd(), libc::STDOUT_FILENO, "stdout/stderr")?;
    dup_onto(null_out.as_raw_fd(), libc::STDERR_FILENO, "stdout/stderr")?;

    Ok(())
}

fn dup_onto(src: i32, dst: i32, stream: &'static str) -> Result<(), DaemonizeError> {
    if unsafe { libc::dup2(src, dst) } < 0 {
        return Err(DaemonizeError::Redirect {
            stream,
            source: io::Error::last_os_error(),
        });
    }
    Ok(())
}

fn fork_and_continue_in_child() -> Result<(), DaemonizeError> {
    // SAFETY: single-threaded at this point in startup; no other threads
    // exist until the worker pool starts.
    match unsafe { fork() } {
        Ok(ForkResult::Parent { .. }) => process::exit(0),
        Ok(ForkResult::Child) => Ok(()),
        Err(e) => Err(DaemonizeError::Fork(errno_to_io(e))),
    }
}

fn errno_to_io(errno: nix::errno::Errno) -> io::Error {
    io::Error::from_raw_os_error(errno as i32)
}
