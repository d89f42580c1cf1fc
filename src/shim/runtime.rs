//! Invocations of the `remoteproc-runtime` binary, one per task RPC.

use crate::oci::ContainerState;
use anyhow::{bail, Context, Result};
use log::warn;
use nix::sys::signal::Signal;
use std::ffi::OsStr;
use std::path::Path;
use std::process::{Command, Output};

const RUNTIME_BIN: &str = "remoteproc-runtime";

fn run(args: &[&OsStr]) -> Result<Output> {
    let output = Command::new(RUNTIME_BIN)
        .args(args)
        .output()
        .with_context(|| format!("failed to invoke {RUNTIME_BIN}"))?;
    if !output.status.success() {
        let subcommand = args
            .first()
            .map(|arg| arg.to_string_lossy())
            .unwrap_or_default();
        bail!(
            "{RUNTIME_BIN} {subcommand} failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(output)
}

pub fn create(container_id: &str, bundle: &Path) -> Result<()> {
    run(&[
        OsStr::new("create"),
        OsStr::new("--bundle"),
        bundle.as_os_str(),
        OsStr::new(container_id),
    ])?;
    Ok(())
}

pub fn start(container_id: &str) -> Result<()> {
    run(&[OsStr::new("start"), OsStr::new(container_id)])?;
    Ok(())
}

pub fn kill(container_id: &str, signal: Signal) -> Result<()> {
    let signum = (signal as i32).to_string();
    run(&[
        OsStr::new("kill"),
        OsStr::new(container_id),
        OsStr::new(&signum),
    ])?;
    Ok(())
}

pub fn delete(container_id: &str) -> Result<()> {
    run(&[OsStr::new("delete"), OsStr::new(container_id)])?;
    Ok(())
}

pub fn state(container_id: &str) -> Result<ContainerState> {
    let output = run(&[OsStr::new("state"), OsStr::new(container_id)])?;
    serde_json::from_slice(&output.stdout).context("failed to parse state JSON")
}

/// The container's proxy PID, defaulting to 0 when the state is unreadable
/// so RPC responses can still be formed.
pub fn pid(container_id: &str) -> i32 {
    match state(container_id) {
        Ok(state) => state.pid,
        Err(err) => {
            warn!("failed to get PID for container {container_id}, defaulting to 0: {err}");
            0
        }
    }
}
