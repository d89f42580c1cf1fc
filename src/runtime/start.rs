use crate::error::{Result, RuntimeError};
use crate::oci::{self, annotations, ContainerState, Status};
use crate::{proxy, remoteproc};
use log::debug;
use std::path::{Path, PathBuf};

/// Start a created container: stage the firmware into the kernel's current
/// search directory, point the device at it and signal the proxy.
pub fn start(container_id: &str) -> Result<()> {
    let mut state = oci::read_state(
        container_id,
        &[
            annotations::STATE_RESOLVED_PATH,
            annotations::STATE_FIRMWARE_PATH,
        ],
    )?;
    match state.status {
        Status::Created => {}
        Status::Running => return Err(RuntimeError::AlreadyRunning),
        other => {
            return Err(RuntimeError::InvalidState {
                expected: "created",
                actual: other.to_string(),
            })
        }
    }

    let device_path = PathBuf::from(annotations::require(
        &state.annotations,
        annotations::STATE_RESOLVED_PATH,
    )?);
    let source = PathBuf::from(annotations::require(
        &state.annotations,
        annotations::STATE_FIRMWARE_PATH,
    )?);

    let firmware_dir = remoteproc::system_firmware_path()?;
    if firmware_dir.as_os_str().is_empty() {
        // An empty search path means the kernel cannot find anything we
        // stage; defaulting silently would load stale firmware.
        return Err(RuntimeError::FirmwareStageFailed {
            path: source,
            reason: "kernel firmware search path override is empty".to_owned(),
        });
    }

    let staged = remoteproc::store_firmware(&source, &firmware_dir)?;
    let staged_name = remoteproc::staged_basename(&staged)?;
    debug!("staged firmware {}", staged.display());

    state.annotations.insert(
        annotations::STATE_STORED_FIRMWARE_PATH.to_owned(),
        staged.display().to_string(),
    );
    state
        .annotations
        .insert(annotations::STATE_FIRMWARE.to_owned(), staged_name.clone());

    if let Err(err) = activate(&mut state, &device_path, &staged_name) {
        remoteproc::remove_firmware(&staged);
        return Err(err);
    }
    Ok(())
}

fn activate(state: &mut ContainerState, device_path: &Path, firmware: &str) -> Result<()> {
    remoteproc::set_firmware(device_path, firmware)?;
    proxy::start_firmware(state.pid)?;
    state.status = Status::Running;
    oci::write_state(state)
}
