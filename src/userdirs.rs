//! Per-user directory resolution.

use crate::error::{Result, RuntimeError};
use nix::unistd::{self, Uid};
use std::env;
use std::path::PathBuf;

const RUNTIME_DIR_NAME: &str = "remoteproc-runtime";

/// The per-user directory holding container state records.
///
/// Prefers `XDG_RUNTIME_DIR`; container engines usually run the runtime with
/// a sanitized environment, so the fallback resolves the home directory from
/// the user database instead of `$HOME` and descends into `.local/run`.
pub fn runtime_dir() -> Result<PathBuf> {
    match env::var("XDG_RUNTIME_DIR") {
        Ok(dir) if !dir.is_empty() => Ok(PathBuf::from(dir).join(RUNTIME_DIR_NAME)),
        _ => Ok(home_dir()?.join(".local/run").join(RUNTIME_DIR_NAME)),
    }
}

/// Home directory of the effective user, from the system user database.
pub fn home_dir() -> Result<PathBuf> {
    let uid = Uid::effective();
    let user = unistd::User::from_uid(uid)
        .map_err(|err| RuntimeError::UserLookup(err.to_string()))?
        .ok_or_else(|| RuntimeError::UserLookup(format!("uid {} has no passwd entry", uid)))?;
    Ok(user.dir)
}
