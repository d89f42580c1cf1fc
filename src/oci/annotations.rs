//! Annotation keys carried on bundles and state records.

use crate::error::{Result, RuntimeError};
use std::collections::HashMap;

/// Bundle annotation naming the requested remote processor.
pub const SPEC_NAME: &str = "remoteproc.name";

/// State annotation: resolved sysfs device directory.
pub const STATE_RESOLVED_PATH: &str = "remoteproc.resolved-path";

/// State annotation: firmware basename as the kernel expects it.
pub const STATE_FIRMWARE: &str = "remoteproc.firmware";

/// State annotation: absolute path of the firmware image inside the bundle.
pub const STATE_FIRMWARE_PATH: &str = "remoteproc.firmware-path";

/// State annotation: full path of the staged copy in the kernel firmware
/// search directory. Present once `start` has staged the image.
pub const STATE_STORED_FIRMWARE_PATH: &str = "remoteproc.stored-firmware-path";

/// Fail with the first missing key. Call sites name the annotations they
/// are about to rely on.
pub fn validate(annotations: &HashMap<String, String>, keys: &[&str]) -> Result<()> {
    for key in keys {
        if !annotations.contains_key(*key) {
            return Err(RuntimeError::MissingAnnotation {
                key: (*key).to_owned(),
            });
        }
    }
    Ok(())
}

/// Fetch a required annotation value.
pub fn require<'a>(annotations: &'a HashMap<String, String>, key: &str) -> Result<&'a str> {
    annotations
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| RuntimeError::MissingAnnotation {
            key: key.to_owned(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_names_the_missing_key() {
        let mut annotations = HashMap::new();
        annotations.insert(STATE_RESOLVED_PATH.to_owned(), "/sys/x".to_owned());

        assert!(validate(&annotations, &[STATE_RESOLVED_PATH]).is_ok());

        let err = validate(&annotations, &[STATE_RESOLVED_PATH, STATE_FIRMWARE]).unwrap_err();
        match err {
            RuntimeError::MissingAnnotation { key } => assert_eq!(key, STATE_FIRMWARE),
            other => panic!("unexpected error: {other}"),
        }
    }
}
