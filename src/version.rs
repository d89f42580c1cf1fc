//! Version identifiers baked into both binaries.

use lazy_static::lazy_static;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Set `GIT_COMMIT` in the build environment to stamp release binaries.
pub const GIT_COMMIT: &str = match option_env!("GIT_COMMIT") {
    Some(commit) => commit,
    None => "unknown",
};

lazy_static! {
    static ref LONG: String = format!("{} (commit {})", VERSION, GIT_COMMIT);
}

/// Version string including the git revision, for `--version` output.
pub fn long() -> &'static str {
    &LONG
}
