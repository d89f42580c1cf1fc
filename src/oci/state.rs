//! The per-container state record and its on-disk store.
//!
//! One JSON document per container at `<runtime_dir>/<id>/state.json`,
//! written atomically so a crashed CLI invocation never leaves a torn
//! record behind.

use super::annotations;
use crate::error::{Result, RuntimeError};
use crate::{fsutil, userdirs};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use strum::{AsRefStr, Display};

/// OCI runtime-spec version the state record conforms to.
pub const OCI_VERSION: &str = "1.2.0";

const STATE_FILE: &str = "state.json";

/// Container lifecycle position. Monotonic, except that `Stopped` may be
/// reached from any non-terminal state.
#[derive(
    AsRefStr, Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Status {
    Creating,
    Created,
    Running,
    Stopped,
}

/// The state record persisted per container, shaped like the OCI runtime
/// state document.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ContainerState {
    #[serde(rename = "ociVersion")]
    pub version: String,
    pub id: String,
    pub status: Status,
    #[serde(default)]
    pub pid: i32,
    pub bundle: PathBuf,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
}

impl ContainerState {
    pub fn new(id: impl Into<String>, bundle: impl Into<PathBuf>) -> Self {
        Self {
            version: OCI_VERSION.to_owned(),
            id: id.into(),
            status: Status::Creating,
            pid: 0,
            bundle: bundle.into(),
            annotations: HashMap::new(),
        }
    }
}

/// Reserve `<runtime_dir>/<id>/` for a new container. The directory is
/// created exclusively, so a concurrent `create` with the same ID loses.
pub fn create_state_dir(id: &str) -> Result<()> {
    create_state_dir_in(&userdirs::runtime_dir()?, id)
}

fn create_state_dir_in(runtime_dir: &Path, id: &str) -> Result<()> {
    fsutil::create_dir_0755(runtime_dir).map_err(RuntimeError::io_ctx(format!(
        "failed to create runtime directory {}",
        runtime_dir.display()
    )))?;
    let container_dir = runtime_dir.join(id);
    fs::DirBuilder::new()
        .mode(0o755)
        .create(&container_dir)
        .map_err(|err| match err.kind() {
            io::ErrorKind::AlreadyExists => RuntimeError::ContainerExists(id.to_owned()),
            _ => RuntimeError::io_ctx(format!(
                "failed to create state directory {}",
                container_dir.display()
            ))(err),
        })
}

/// Persist a state record atomically.
pub fn write_state(state: &ContainerState) -> Result<()> {
    write_state_in(&userdirs::runtime_dir()?, state)
}

pub(crate) fn write_state_in(runtime_dir: &Path, state: &ContainerState) -> Result<()> {
    let container_dir = runtime_dir.join(&state.id);
    fsutil::create_dir_0755(&container_dir).map_err(RuntimeError::io_ctx(format!(
        "failed to create state directory {}",
        container_dir.display()
    )))?;
    let json = serde_json::to_vec_pretty(state)?;
    fsutil::atomic_write(&container_dir.join(STATE_FILE), &json, 0o644).map_err(
        RuntimeError::io_ctx(format!("failed to write state for container {}", state.id)),
    )?;
    Ok(())
}

/// Load a state record, validating that the annotations the caller is about
/// to rely on are present.
pub fn read_state(id: &str, required_annotations: &[&str]) -> Result<ContainerState> {
    read_state_in(&userdirs::runtime_dir()?, id, required_annotations)
}

pub(crate) fn read_state_in(
    runtime_dir: &Path,
    id: &str,
    required_annotations: &[&str],
) -> Result<ContainerState> {
    let state_file = runtime_dir.join(id).join(STATE_FILE);
    let data = fs::read(&state_file).map_err(RuntimeError::io_ctx(format!(
        "failed to read state for container {id}"
    )))?;
    let state: ContainerState = serde_json::from_slice(&data)?;
    annotations::validate(&state.annotations, required_annotations)?;
    Ok(state)
}

/// Remove a container's state directory recursively. Missing directories
/// are not an error, so `delete` stays idempotent under force.
pub fn remove_state(id: &str) -> Result<()> {
    let container_dir = userdirs::runtime_dir()?.join(id);
    match fs::remove_dir_all(&container_dir) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(RuntimeError::io_ctx(format!(
            "cannot remove container state dir {}",
            container_dir.display()
        ))(err)),
    }
}
