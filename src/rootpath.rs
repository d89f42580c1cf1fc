//! Process-wide filesystem root prefix.
//!
//! Every absolute path the runtime hands to the OS flows through this module,
//! which lets an installation relocate the sysfs and firmware trees and lets
//! the integration tests point the whole runtime at a fake sysfs. Nothing
//! outside this module hard-codes the kernel paths.

use crate::error::Result;
use crate::userdirs;
use lazy_static::lazy_static;
use std::env;
use std::path::{Path, PathBuf};

/// Consulted once, at first use. Set before launching the runtime to
/// relocate every absolute path it touches.
pub const ROOT_ENV: &str = "REMOTEPROC_ROOT";

/// Build-time default for the prefix, the install-time counterpart of
/// [`ROOT_ENV`].
const ROOT_DEFAULT: &str = match option_env!("REMOTEPROC_ROOT_DEFAULT") {
    Some(prefix) => prefix,
    None => "/",
};

lazy_static! {
    static ref PREFIX: PathBuf = init_prefix();
}

fn init_prefix() -> PathBuf {
    let raw = env::var(ROOT_ENV).unwrap_or_else(|_| ROOT_DEFAULT.to_owned());
    match expand_tilde(&raw) {
        Ok(prefix) => prefix,
        // The prefix is load-bearing for every later syscall; a bad value
        // must not survive initialization.
        Err(err) => panic!("failed to expand root prefix {}: {}", raw, err),
    }
}

/// Expand a leading `~` against the user database home directory.
pub fn expand_tilde(path: &str) -> Result<PathBuf> {
    if path == "~" {
        return userdirs::home_dir();
    }
    if let Some(rest) = path.strip_prefix("~/") {
        return Ok(userdirs::home_dir()?.join(rest));
    }
    Ok(PathBuf::from(path))
}

/// Join `path` under the configured prefix. A leading `/` in `path` is
/// ignored so callers can pass the canonical absolute form.
pub fn join(path: impl AsRef<Path>) -> PathBuf {
    join_under(&PREFIX, path.as_ref())
}

fn join_under(prefix: &Path, path: &Path) -> PathBuf {
    prefix.join(path.strip_prefix("/").unwrap_or(path))
}

/// `<root>/sys/class/remoteproc`, the device class directory.
pub fn remoteproc_class_dir() -> PathBuf {
    join("/sys/class/remoteproc")
}

/// `<root>/sys/module/firmware_class/parameters/path`, the kernel's
/// firmware search path override.
pub fn firmware_search_override_file() -> PathBuf {
    join("/sys/module/firmware_class/parameters/path")
}

/// `<root>/lib/firmware`, the kernel's default firmware search directory.
pub fn default_firmware_dir() -> PathBuf {
    join("/lib/firmware")
}
