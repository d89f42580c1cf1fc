use crate::error::{Result, RuntimeError};
use crate::oci::{self, annotations, Status};
use crate::{proxy, remoteproc};
use log::warn;
use nix::sys::signal::Signal;

/// Remove a container and everything it owns: the staged firmware file and
/// the state directory.
///
/// A running container is refused unless `force` is set. Under force every
/// step is best-effort and only logged, so the host always ends up clean.
pub fn delete(container_id: &str, force: bool) -> Result<()> {
    let state = match oci::read_state(container_id, &[]) {
        Ok(state) => Some(state),
        Err(err) if force => {
            warn!("cannot read state for container {container_id}: {err}");
            None
        }
        Err(err) => return Err(err),
    };

    if let Some(state) = &state {
        if state.status == Status::Running {
            if !force {
                return Err(RuntimeError::ContainerRunning);
            }
            if state.pid > 0 {
                if let Err(err) = proxy::send_signal(state.pid, Signal::SIGKILL) {
                    warn!("failed to kill proxy process {}: {err}", state.pid);
                }
            }
        }
        if let Some(staged) = state
            .annotations
            .get(annotations::STATE_STORED_FIRMWARE_PATH)
        {
            remoteproc::remove_firmware(staged);
        }
    }

    oci::remove_state(container_id)
}
