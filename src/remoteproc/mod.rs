//! Typed wrapper over the kernel's sysfs remoteproc interface.
//!
//! Devices live under `<root>/sys/class/remoteproc/<N>/` and expose the
//! attributes `name`, `state` and `firmware`. Writing `start`/`stop` to
//! `state` and a basename to `firmware` are non-idempotent side effects, so
//! every verb here pre-flights the current state where the kernel would
//! otherwise reject or misbehave.

mod state;

pub use state::DeviceState;

use crate::error::{Result, RuntimeError};
use crate::{fsutil, rootpath};
use log::warn;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Resolve a logical device name to its sysfs directory.
///
/// Enumerates the class directory and compares each device's trimmed `name`
/// attribute. The error for a mismatch carries every discovered name so the
/// engine can present them.
pub fn find_device_path(name: &str) -> Result<PathBuf> {
    find_device_path_in(&rootpath::remoteproc_class_dir(), name)
}

fn find_device_path_in(class_dir: &Path, name: &str) -> Result<PathBuf> {
    let entries = fs::read_dir(class_dir).map_err(RuntimeError::io_ctx(format!(
        "failed to read remoteproc directory {}",
        class_dir.display()
    )))?;

    let mut available = Vec::new();
    for entry in entries {
        let entry = entry?;
        // Class entries are symlinks to the device directories on a real
        // sysfs, plain directories on a fake one.
        if !entry.path().is_dir() {
            continue;
        }
        // Devices without a readable name attribute are skipped rather than
        // failing the whole enumeration.
        let contents = match fs::read_to_string(entry.path().join("name")) {
            Ok(contents) => contents,
            Err(_) => continue,
        };
        let device_name = contents.trim();
        if device_name == name {
            return Ok(entry.path());
        }
        available.push(device_name.to_owned());
    }

    available.sort();
    Err(RuntimeError::DeviceNotFound {
        requested: name.to_owned(),
        available,
    })
}

/// Read and parse a device's `state` attribute.
pub fn get_state(device_dir: &Path) -> Result<DeviceState> {
    let state_file = device_dir.join("state");
    let raw = fs::read_to_string(&state_file).map_err(RuntimeError::io_ctx(format!(
        "failed to read device state {}",
        state_file.display()
    )))?;
    DeviceState::parse(&raw)
}

fn ensure_not_running(device_dir: &Path) -> Result<()> {
    if get_state(device_dir)? == DeviceState::Running {
        return Err(RuntimeError::AlreadyRunning);
    }
    Ok(())
}

/// Point the device at a staged firmware image. `firmware` must be a bare
/// basename; the kernel resolves it against its firmware search path.
pub fn set_firmware(device_dir: &Path, firmware: &str) -> Result<()> {
    ensure_not_running(device_dir)?;
    fs::write(device_dir.join("firmware"), firmware).map_err(RuntimeError::io_ctx(format!(
        "failed to set firmware on {}",
        device_dir.display()
    )))?;
    Ok(())
}

/// Boot the device by writing the `start` verb.
pub fn start(device_dir: &Path) -> Result<()> {
    ensure_not_running(device_dir)?;
    write_state_verb(device_dir, "start")
}

/// Halt the device by writing the `stop` verb.
pub fn stop(device_dir: &Path) -> Result<()> {
    write_state_verb(device_dir, "stop")
}

fn write_state_verb(device_dir: &Path, verb: &str) -> Result<()> {
    fs::write(device_dir.join("state"), verb).map_err(RuntimeError::io_ctx(format!(
        "failed to write {} to {}",
        verb,
        device_dir.display()
    )))?;
    Ok(())
}

/// The directory the kernel currently searches for firmware: the value of
/// the `firmware_class.path` parameter when the parameter file exists, the
/// default `<root>/lib/firmware` otherwise.
///
/// An existing but empty parameter file yields an empty path. Callers must
/// reject that instead of falling back, since the kernel would do the same.
pub fn system_firmware_path() -> Result<PathBuf> {
    system_firmware_path_from(
        &rootpath::firmware_search_override_file(),
        rootpath::default_firmware_dir(),
    )
}

fn system_firmware_path_from(override_file: &Path, default_dir: PathBuf) -> Result<PathBuf> {
    match fs::read_to_string(override_file) {
        Ok(contents) => Ok(PathBuf::from(contents.trim())),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(default_dir),
        Err(err) => Err(RuntimeError::io_ctx(format!(
            "failed to read firmware search override {}",
            override_file.display()
        ))(err)),
    }
}

/// Copy a firmware image into `dest_dir` under a collision-resistant name
/// and return the full staged path. The staged basename keeps the source
/// extension so the kernel's loader heuristics still apply.
pub fn store_firmware(source: &Path, dest_dir: &Path) -> Result<PathBuf> {
    let stage_failed = |reason: String| RuntimeError::FirmwareStageFailed {
        path: source.to_path_buf(),
        reason,
    };

    let data =
        fs::read(source).map_err(|err| stage_failed(format!("failed to read source: {err}")))?;
    let file_name = source
        .file_name()
        .ok_or_else(|| stage_failed("source path has no file name".to_owned()))?;

    fsutil::create_dir_0755(dest_dir).map_err(|err| {
        stage_failed(format!(
            "failed to create firmware directory {}: {err}",
            dest_dir.display()
        ))
    })?;

    let dest = dest_dir.join(unique_name(file_name));
    fsutil::atomic_write(&dest, &data, 0o644)
        .map_err(|err| stage_failed(format!("failed to write {}: {err}", dest.display())))?;
    Ok(dest)
}

/// The basename of a staged firmware path, as written to the device's
/// `firmware` attribute.
pub fn staged_basename(staged: &Path) -> Result<String> {
    staged
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| RuntimeError::FirmwareStageFailed {
            path: staged.to_path_buf(),
            reason: "staged path has no file name".to_owned(),
        })
}

/// Best-effort unlink of a staged firmware file. A bare basename is resolved
/// against the current system firmware directory. Never fatal to callers.
pub fn remove_firmware(staged: impl AsRef<Path>) {
    let staged = staged.as_ref();
    let path = if staged.is_absolute() {
        staged.to_path_buf()
    } else {
        match system_firmware_path() {
            Ok(dir) => dir.join(staged),
            Err(err) => {
                warn!("cannot resolve firmware directory for {}: {err}", staged.display());
                return;
            }
        }
    };
    if let Err(err) = fs::remove_file(&path) {
        if err.kind() != io::ErrorKind::NotFound {
            warn!("failed to remove staged firmware {}: {err}", path.display());
        }
    }
}

fn unique_name(file_name: &OsStr) -> String {
    let name = Path::new(file_name);
    let stem = name
        .file_stem()
        .unwrap_or(file_name)
        .to_string_lossy()
        .into_owned();
    let suffix = unique_suffix();
    match name.extension() {
        Some(ext) => format!("{stem}{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}{suffix}"),
    }
}

fn unique_suffix() -> String {
    format!(
        "_{}_{:08x}",
        chrono::Local::now().format("%Y%m%d_%H%M%S"),
        rand::random::<u32>()
    )
}
