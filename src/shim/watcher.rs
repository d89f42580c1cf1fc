//! Waiting for proxy-process exit without polling.
//!
//! A pidfd becomes readable when the process it refers to exits. The watcher
//! polls the pidfd together with a stop pipe so an explicit stop (from
//! `Kill`, before signal delivery, to avoid racing the exit event) can wake
//! it without emitting anything.

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags};
use nix::unistd;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExitReason {
    /// The pidfd became readable: the process is gone.
    ProcessExited,
    /// An explicit stop was requested; no event should be emitted.
    WatcherStopped,
}

pub struct ProcessWatcher {
    pidfd: OwnedFd,
    stop_rx: OwnedFd,
}

/// Wakes the matching watcher. Dropping the handle (e.g. when a new watcher
/// replaces it) has the same effect as calling [`StopHandle::stop`].
pub struct StopHandle {
    stop_tx: OwnedFd,
}

impl ProcessWatcher {
    pub fn new(pid: i32) -> io::Result<(Self, StopHandle)> {
        let pidfd = pidfd_open(pid)?;
        let (stop_rx, stop_tx) =
            unistd::pipe().map_err(|errno| io::Error::from_raw_os_error(errno as i32))?;
        Ok((
            Self {
                pidfd,
                stop_rx: unsafe { OwnedFd::from_raw_fd(stop_rx) },
            },
            StopHandle {
                stop_tx: unsafe { OwnedFd::from_raw_fd(stop_tx) },
            },
        ))
    }

    /// Block until the watched process exits or the stop handle fires.
    /// Consumes the watcher; both descriptors close on return.
    pub fn wait_for_exit(self) -> ExitReason {
        let mut fds = [
            PollFd::new(self.pidfd.as_raw_fd(), PollFlags::POLLIN),
            PollFd::new(self.stop_rx.as_raw_fd(), PollFlags::POLLIN),
        ];
        loop {
            match poll(&mut fds, -1) {
                Ok(_) => {}
                Err(Errno::EINTR) => continue,
                // Without a working poll the process can no longer be
                // observed; report it gone so the shim winds down.
                Err(_) => return ExitReason::ProcessExited,
            }
            // A stop request wins over a simultaneous exit.
            if event_pending(&fds[1]) {
                return ExitReason::WatcherStopped;
            }
            if event_pending(&fds[0]) {
                return ExitReason::ProcessExited;
            }
        }
    }
}

fn event_pending(fd: &PollFd) -> bool {
    fd.revents().map_or(false, |revents| !revents.is_empty())
}

impl StopHandle {
    pub fn stop(self) {
        let _ = unistd::write(self.stop_tx.as_raw_fd(), &[1]);
    }
}

fn pidfd_open(pid: i32) -> io::Result<OwnedFd> {
    let fd = unsafe { libc::syscall(libc::SYS_pidfd_open, pid as libc::pid_t, 0 as libc::c_uint) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(unsafe { OwnedFd::from_raw_fd(fd as RawFd) })
}
