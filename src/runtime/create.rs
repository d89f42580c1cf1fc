use crate::error::{Result, RuntimeError};
use crate::oci::{self, annotations, ContainerState, Status};
use crate::{proxy, remoteproc};
use log::{debug, warn};
use nix::unistd::Uid;
use std::fs;
use std::path::Path;

/// Create a container from an OCI bundle: validate the bundle against the
/// device inventory, spawn the proxy process and persist the state record.
///
/// Every side effect after the proxy spawn is rolled back in reverse order
/// on failure; a failed create leaves neither a proxy nor a state record
/// behind.
pub fn create(container_id: &str, bundle: &Path, pid_file: Option<&Path>) -> Result<()> {
    let spec = oci::read_spec(bundle)?;
    let name = oci::device_name(&spec)?;
    let device_path = remoteproc::find_device_path(name)?;

    let firmware_source = oci::firmware_source(&spec, bundle)?;
    if !firmware_source.exists() {
        return Err(RuntimeError::FirmwareMissing {
            path: firmware_source,
        });
    }

    let clone_flags = proxy::linux_clone_flags(Uid::effective().is_root(), &spec);
    let spawned = proxy::spawn(&device_path, clone_flags)?;
    debug!(
        "spawned proxy process {} for device {}",
        spawned.pid,
        device_path.display()
    );

    let mut state = ContainerState::new(container_id, bundle);
    state.status = Status::Created;
    state.pid = spawned.pid;
    state
        .annotations
        .insert(annotations::SPEC_NAME.to_owned(), name.to_owned());
    state.annotations.insert(
        annotations::STATE_RESOLVED_PATH.to_owned(),
        device_path.display().to_string(),
    );
    state.annotations.insert(
        annotations::STATE_FIRMWARE_PATH.to_owned(),
        firmware_source.display().to_string(),
    );

    if let Err(err) = persist(&state, pid_file) {
        rollback(&state, &err);
        return Err(err);
    }
    Ok(())
}

fn persist(state: &ContainerState, pid_file: Option<&Path>) -> Result<()> {
    oci::create_state_dir(&state.id)?;
    oci::write_state(state)?;
    if let Some(pid_file) = pid_file {
        fs::write(pid_file, state.pid.to_string()).map_err(RuntimeError::io_ctx(format!(
            "failed to write PID file {}",
            pid_file.display()
        )))?;
    }
    Ok(())
}

fn rollback(state: &ContainerState, cause: &RuntimeError) {
    if let Err(err) = proxy::stop_firmware(state.pid) {
        warn!("create rollback: failed to stop proxy {}: {err}", state.pid);
    }
    // A conflicting create must not wipe the existing container's record.
    if !matches!(cause, RuntimeError::ContainerExists(_)) {
        if let Err(err) = oci::remove_state(&state.id) {
            warn!("create rollback: failed to remove state: {err}");
        }
    }
}
