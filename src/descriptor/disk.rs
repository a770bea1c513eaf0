//! Block-storage image creation.

use std::{
    fs::{self, OpenOptions},
    io,
    path::Path,
};

use crate::error::{ConfigError, ConfigStage};
use crate::platform::Platform;

/// Creates a sparse image of `size` bytes at `path`.
///
/// Fails with [`io::ErrorKind::AlreadyExists`] without touching an existing
/// file. If sizing fails the new file is removed again.
pub fn create_sparse_image(path: &Path, size: u64) -> io::Result<()> {
    let file = OpenOptions::new().write(true).create_new(true).open(path)?;
    if let Err(e) = file.set_len(size) {
        drop(file);
        let _ = fs::remove_file(path);
        return Err(e);
    }
    Ok(())
}

/// Makes sure a disk image exists at `path`.
///
/// Returns `true` when a new image was created. An existing file is success
/// and is left as is.
pub fn ensure_disk_image<P: Platform>(
    platform: &P,
    path: &Path,
    size: u64,
) -> Result<bool, ConfigError> {
    match platform.create_disk_image(path, size) {
        Ok(()) => {
            tracing::info!(path = %path.display(), size, "disk image created");
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(ConfigError::io(ConfigStage::DiskImage, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::sim::{SimScript, SimulatedPlatform};

    #[test]
    fn test_second_call_keeps_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Disk.img");
        let platform = SimulatedPlatform::new(SimScript::default());

        assert!(ensure_disk_image(&platform, &path, 1 << 20).unwrap());
        assert_eq!(fs::metadata(&path).unwrap().len(), 1 << 20);

        fs::write(&path, b"guest data").unwrap();
        assert!(!ensure_disk_image(&platform, &path, 1 << 20).unwrap());
        assert_eq!(fs::read(&path).unwrap(), b"guest data");
    }

    #[test]
    fn test_other_io_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("Disk.img");
        let platform = SimulatedPlatform::new(SimScript::default());

        let err = ensure_disk_image(&platform, &path, 1024).unwrap_err();
        assert_eq!(err.stage(), ConfigStage::DiskImage);
        assert!(!path.exists());
    }
}
