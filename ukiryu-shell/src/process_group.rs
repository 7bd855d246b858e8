//! Each command runs as the leader of its own process group so a timeout
//! can take down everything it started.

#![allow(unsafe_code)]

use std::io;

use crate::error::ExecError;

/// Called from `pre_exec` in the forked child.
///
/// Starts a new session, or just a new process group when the child
/// already leads a session. On Linux the child also gets `SIGKILL` if the
/// runner dies first; `parent_pid` is read before `fork` so a parent that
/// is already gone is noticed.
pub(crate) fn lead_new_group(parent_pid: libc::pid_t) -> io::Result<()> {
    if unsafe { libc::setsid() } == -1 && unsafe { libc::setpgid(0, 0) } == -1 {
        return Err(io::Error::last_os_error());
    }

    #[cfg(target_os = "linux")]
    {
        if unsafe { libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL) } == -1 {
            return Err(io::Error::last_os_error());
        }
        if unsafe { libc::getppid() } != parent_pid {
            unsafe { libc::raise(libc::SIGKILL) };
        }
    }
    #[cfg(not(target_os = "linux"))]
    let _ = parent_pid;

    Ok(())
}

/// `SIGKILL` the group led by `leader`. A group that has already exited
/// counts as killed.
pub(crate) fn kill_group(leader: u32, executable: &str) -> Result<(), ExecError> {
    let io_error = |source| ExecError::Io {
        executable: executable.to_string(),
        source,
    };
    let pgid = libc::pid_t::try_from(leader)
        .map_err(|_| io_error(io::Error::from(io::ErrorKind::InvalidInput)))?;

    if unsafe { libc::killpg(pgid, libc::SIGKILL) } == 0 {
        return Ok(());
    }
    match io::Error::last_os_error() {
        err if err.raw_os_error() == Some(libc::ESRCH) => Ok(()),
        err => Err(io_error(err)),
    }
}
