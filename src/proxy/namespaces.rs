//! Mapping the bundle's requested Linux namespaces onto clone flags for the
//! proxy process.

use log::warn;
use oci_spec::runtime::{LinuxNamespace, LinuxNamespaceType, Spec};

fn clone_flag(typ: LinuxNamespaceType) -> libc::c_int {
    match typ {
        LinuxNamespaceType::Cgroup => libc::CLONE_NEWCGROUP,
        LinuxNamespaceType::Ipc => libc::CLONE_NEWIPC,
        LinuxNamespaceType::Mount => libc::CLONE_NEWNS,
        LinuxNamespaceType::Network => libc::CLONE_NEWNET,
        LinuxNamespaceType::Pid => libc::CLONE_NEWPID,
        LinuxNamespaceType::Time => libc::CLONE_NEWTIME,
        LinuxNamespaceType::User => libc::CLONE_NEWUSER,
        LinuxNamespaceType::Uts => libc::CLONE_NEWUTS,
    }
}

fn joins_existing(ns: &LinuxNamespace) -> bool {
    // A namespace with a path asks us to join an existing one; creation
    // flags do not apply to it.
    matches!(ns.path(), Some(path) if !path.as_os_str().is_empty())
}

/// Clone-flag bitmap for the namespaces the bundle asks the runtime to
/// create.
pub fn namespace_clone_flags(spec: &Spec) -> libc::c_int {
    spec.linux()
        .as_ref()
        .and_then(|linux| linux.namespaces().as_ref())
        .map(|namespaces| {
            namespaces
                .iter()
                .filter(|ns| !joins_existing(ns))
                .fold(0, |flags, ns| flags | clone_flag(ns.typ()))
        })
        .unwrap_or(0)
}

/// The bitmap actually applied at spawn. Unprivileged callers cannot create
/// most namespaces, so for them the bitmap is cleared with a warning rather
/// than failing the create.
pub fn linux_clone_flags(is_root: bool, spec: &Spec) -> libc::c_int {
    let flags = namespace_clone_flags(spec);
    if !is_root && flags != 0 {
        warn!("running non-root; namespace isolation disabled");
        return 0;
    }
    flags
}
