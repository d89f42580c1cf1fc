//! OCI bundle and container state handling.

pub mod annotations;

mod spec;
mod state;

pub use spec::{device_name, firmware_name, firmware_source, read_spec};
pub use state::{
    create_state_dir, read_state, remove_state, write_state, ContainerState, Status, OCI_VERSION,
};
