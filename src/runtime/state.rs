use crate::error::Result;
use crate::oci::{self, ContainerState};

/// Read a container's state record, unchanged.
pub fn state(container_id: &str) -> Result<ContainerState> {
    oci::read_state(container_id, &[])
}
