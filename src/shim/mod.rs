//! The containerd task shim: maps the task RPC surface onto the runtime CLI
//! and projects proxy-process exits back as task events.

mod events;
mod runtime;
mod service;
mod watcher;

pub use service::Service;
pub use watcher::{ExitReason, ProcessWatcher, StopHandle};
