//! Error handling helpers and primitives.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = RuntimeError> = std::result::Result<T, E>;

/// Errors surfaced at the runtime boundary.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("invalid bundle: {0}")]
    InvalidSpec(String),

    #[error(
        "remote processor {requested} does not exist, available remote processors: {}",
        available.join(", ")
    )]
    DeviceNotFound {
        requested: String,
        available: Vec<String>,
    },

    #[error("requested firmware does not exist: {}", path.display())]
    FirmwareMissing { path: PathBuf },

    #[error("failed to stage firmware {}: {reason}", path.display())]
    FirmwareStageFailed { path: PathBuf, reason: String },

    #[error("remote processor is already running")]
    AlreadyRunning,

    #[error("unknown remote processor state {raw:?}")]
    UnknownDeviceState { raw: String },

    /// Part of the exported boundary contract for bundles naming a
    /// namespace type outside the supported set. Not produced by the
    /// current call sites: the typed bundle parser rejects such a
    /// `config.json` at load time as [`RuntimeError::InvalidSpec`], before
    /// the clone-flag mapping runs.
    #[error("unknown namespace type {typ:?}")]
    UnknownNamespace { typ: String },

    #[error("container is running, stop it first or use force")]
    ContainerRunning,

    #[error("container {0} already exists")]
    ContainerExists(String),

    #[error("container is {actual}, expected {expected}")]
    InvalidState {
        expected: &'static str,
        actual: String,
    },

    #[error("missing {key} in annotations")]
    MissingAnnotation { key: String },

    #[error("unsupported signal {0}")]
    UnsupportedSignal(String),

    #[error("failed to resolve current user: {0}")]
    UserLookup(String),

    #[error(transparent)]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("{context}: {source}")]
    IoPath {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl RuntimeError {
    /// Wrap an I/O error with the path-bearing context the diagnostics need.
    pub(crate) fn io_ctx(context: impl Into<String>) -> impl FnOnce(io::Error) -> Self {
        let context = context.into();
        move |source| Self::IoPath { context, source }
    }
}

/// Chain creates a string from an error stack.
pub fn chain(res: anyhow::Error) -> String {
    res.chain()
        .map(|x| x.to_string())
        .collect::<Vec<_>>()
        .join(": ")
}
