//! Small filesystem primitives shared by the state store and the driver.

use std::fs;
use std::io;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::Path;

/// Write `content` to `path` atomically: the data lands in `<path>.tmp`
/// first and is renamed over the destination. The temp file is removed when
/// the rename fails.
pub(crate) fn atomic_write(path: &Path, content: &[u8], mode: u32) -> io::Result<()> {
    let tmp = path.with_extension(match path.extension() {
        Some(ext) => format!("{}.tmp", ext.to_string_lossy()),
        None => "tmp".to_owned(),
    });

    {
        use io::Write;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(mode)
            .open(&tmp)?;
        file.write_all(content)?;
    }

    if let Err(err) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(err);
    }
    Ok(())
}

/// Create `dir` (and missing parents) with mode 0755.
pub(crate) fn create_dir_0755(dir: &Path) -> io::Result<()> {
    fs::DirBuilder::new().recursive(true).mode(0o755).create(dir)
}
