//! Reading the bundle's `config.json` and extracting what this runtime
//! consumes from it: the requested device name and the firmware image.

use super::annotations;
use crate::error::{Result, RuntimeError};
use oci_spec::runtime::Spec;
use std::path::{Path, PathBuf};

/// Load `<bundle>/config.json`.
pub fn read_spec(bundle: &Path) -> Result<Spec> {
    let config = bundle.join("config.json");
    Spec::load(&config).map_err(|err| {
        RuntimeError::InvalidSpec(format!("failed to read {}: {err}", config.display()))
    })
}

/// The logical device name requested via the `remoteproc.name` annotation.
pub fn device_name(spec: &Spec) -> Result<&str> {
    spec.annotations()
        .as_ref()
        .and_then(|annotations| annotations.get(annotations::SPEC_NAME))
        .map(String::as_str)
        .ok_or_else(|| {
            RuntimeError::InvalidSpec(format!(
                "missing {} annotation",
                annotations::SPEC_NAME
            ))
        })
}

/// The firmware filename: the single entry of `process.args`.
pub fn firmware_name(spec: &Spec) -> Result<&str> {
    let args = spec
        .process()
        .as_ref()
        .and_then(|process| process.args().as_ref())
        .ok_or_else(|| RuntimeError::InvalidSpec("missing process arguments".to_owned()))?;
    match args.as_slice() {
        [firmware] => Ok(firmware),
        _ => Err(RuntimeError::InvalidSpec(
            "expected exactly one process argument".to_owned(),
        )),
    }
}

/// Absolute path of the firmware image inside the bundle's root filesystem.
pub fn firmware_source(spec: &Spec, bundle: &Path) -> Result<PathBuf> {
    let root = spec
        .root()
        .as_ref()
        .ok_or_else(|| RuntimeError::InvalidSpec("missing root filesystem".to_owned()))?;
    let root_path = root.path();
    let absolute = if root_path.is_absolute() {
        root_path.clone()
    } else {
        bundle.join(root_path)
    };
    Ok(absolute.join(firmware_name(spec)?))
}
