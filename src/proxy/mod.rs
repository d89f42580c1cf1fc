//! The proxy process: a user-space stand-in for a running co-processor.
//!
//! Container engines expect every container to expose a host PID that can be
//! signaled and waited on. The workload here is firmware on a co-processor,
//! so `create` spawns a long-lived child of our own binary whose lifetime
//! tracks the device:
//!
//! * Phase 1 (armed): waits for SIGUSR1; SIGTERM/SIGINT exit 0 without
//!   touching the device.
//! * Phase 2 (running): boots the device, then polls its state at 1 Hz.
//!   SIGTERM/SIGINT stop the device and exit 0; the device leaving the
//!   `running` state on its own exits 1.

mod namespaces;

pub use namespaces::{linux_clone_flags, namespace_clone_flags};

use crate::error::{Result, RuntimeError};
use crate::remoteproc::{self, DeviceState};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use signal_hook::consts::signal::{SIGINT, SIGTERM, SIGUSR1};
use signal_hook::flag;
use std::env;
use std::io;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Cooperative scheduling quantum of the proxy's event loop. Signals are
/// honored within one tick.
const TICK: Duration = Duration::from_millis(100);

/// Cadence of device state polling in phase 2.
const STATE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Handle to a spawned proxy process.
#[derive(Clone, Copy, Debug)]
pub struct Proxy {
    pub pid: i32,
}

/// Spawn the proxy for `device_path` by re-executing our own binary with the
/// hidden `proxy` subcommand. The child starts its own process group so the
/// CLI can exit without tearing it down, and enters the namespaces named by
/// `clone_flags`.
pub fn spawn(device_path: &Path, clone_flags: libc::c_int) -> Result<Proxy> {
    let exe = env::current_exe()
        .map_err(RuntimeError::io_ctx("failed to locate runtime executable"))?;

    let mut cmd = Command::new(exe);
    cmd.arg("proxy").arg("--device-path").arg(device_path);
    unsafe {
        cmd.pre_exec(move || {
            if libc::setpgid(0, 0) != 0 {
                return Err(io::Error::last_os_error());
            }
            if clone_flags != 0 && libc::unshare(clone_flags) != 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let child = cmd
        .spawn()
        .map_err(RuntimeError::io_ctx("failed to start proxy process"))?;
    Ok(Proxy {
        pid: child.id() as i32,
    })
}

/// Ask the proxy to boot the firmware.
pub fn start_firmware(pid: i32) -> Result<()> {
    send_signal(pid, Signal::SIGUSR1)
}

/// Ask the proxy to stop the firmware and exit.
pub fn stop_firmware(pid: i32) -> Result<()> {
    send_signal(pid, Signal::SIGTERM)
}

pub fn send_signal(pid: i32, sig: Signal) -> Result<()> {
    signal::kill(Pid::from_raw(pid), sig).map_err(|errno| {
        RuntimeError::io_ctx(format!("failed to send {sig} to proxy {pid}"))(
            io::Error::from_raw_os_error(errno as i32),
        )
    })
}

/// The proxy child's main loop. Returns the process exit code.
pub fn run(device_path: &Path) -> Result<i32> {
    let terminate = Arc::new(AtomicBool::new(false));
    let start_requested = Arc::new(AtomicBool::new(false));
    flag::register(SIGTERM, Arc::clone(&terminate))?;
    flag::register(SIGINT, Arc::clone(&terminate))?;
    flag::register(SIGUSR1, Arc::clone(&start_requested))?;

    // Phase 1: armed.
    loop {
        if terminate.load(Ordering::Relaxed) {
            return Ok(0);
        }
        if start_requested.load(Ordering::Relaxed) {
            break;
        }
        thread::sleep(TICK);
    }

    // Phase 2: running.
    remoteproc::start(device_path)?;
    let mut last_poll = Instant::now();
    loop {
        if terminate.load(Ordering::Relaxed) {
            // Teardown failures must not keep the proxy alive.
            if let Err(err) = remoteproc::stop(device_path) {
                eprintln!("failed to stop remote processor: {err}");
            }
            return Ok(0);
        }
        if last_poll.elapsed() >= STATE_POLL_INTERVAL {
            last_poll = Instant::now();
            match remoteproc::get_state(device_path) {
                Ok(DeviceState::Running) => {}
                Ok(state) => {
                    eprintln!("remote processor no longer running, current state: {state}");
                    return Ok(1);
                }
                Err(err) => eprintln!("failed to get remote processor state: {err}"),
            }
        }
        thread::sleep(TICK);
    }
}
