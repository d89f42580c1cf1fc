//! containerd shim entry point.
//!
//! The framework owns socket bootstrap (including the fd-3 convention for
//! re-executed children) and logging; registering the task service here is
//! the one deliberate boot step.

use remoteproc_runtime::shim::Service;

fn main() {
    containerd_shim::run::<Service>("io.containerd.remoteproc.v1", None)
}
