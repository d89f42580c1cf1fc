//! Device state tokens of the sysfs remoteproc interface.

use crate::error::{Result, RuntimeError};
use strum::{AsRefStr, Display, EnumString};

/// Contents of a device's `state` attribute.
#[derive(AsRefStr, Display, EnumString, Clone, Copy, Debug, Eq, PartialEq)]
#[strum(serialize_all = "lowercase")]
pub enum DeviceState {
    Offline,
    Suspended,
    Running,
    Crashed,
    Invalid,
}

impl DeviceState {
    /// Parse a raw `state` file read. The kernel appends a trailing newline;
    /// anything left over after trimming that is not one of the five legal
    /// tokens is an error carrying the offending token.
    pub fn parse(raw: &str) -> Result<Self> {
        let token = raw.trim();
        token
            .parse()
            .map_err(|_| RuntimeError::UnknownDeviceState {
                raw: token.to_owned(),
            })
    }
}
