//! Flash filesystem adapter.
//!
//! Implements [`FileSystem`] over `std::fs` rooted at a directory.  On the
//! device that directory is a SPIFFS partition registered with the ESP-IDF
//! VFS by [`mount_spiffs`]; on the host it is any scratch directory.
//!
//! SPIFFS is flat, so every persisted name is a single path component.

use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

use log::warn;

use crate::app::ports::{FileSystem, StorageError};

#[cfg(target_os = "espidf")]
use crate::error::Error;

/// VFS mount point of the data partition.
pub const MOUNT_POINT: &str = "/data";
#[cfg(target_os = "espidf")]
const PARTITION_LABEL: &core::ffi::CStr = c"storage";
#[cfg(target_os = "espidf")]
const MOUNT_POINT_C: &core::ffi::CStr = c"/data";
#[cfg(target_os = "espidf")]
const MAX_OPEN_FILES: usize = 4;

/// Register the SPIFFS data partition at [`MOUNT_POINT`], formatting it
/// if it cannot be mounted.
#[cfg(target_os = "espidf")]
pub fn mount_spiffs() -> Result<(), Error> {
    use esp_idf_svc::sys::{ESP_OK, esp_vfs_spiffs_conf_t, esp_vfs_spiffs_register};
    use log::info;

    let conf = esp_vfs_spiffs_conf_t {
        base_path: MOUNT_POINT_C.as_ptr(),
        partition_label: PARTITION_LABEL.as_ptr(),
        max_files: MAX_OPEN_FILES,
        format_if_mount_failed: true,
    };
    // SAFETY: called once from the main task before any file access; the
    // C strings are 'static.
    let ret = unsafe { esp_vfs_spiffs_register(&conf) };
    if ret != ESP_OK {
        return Err(Error::Init("SPIFFS mount failed"));
    }
    info!("FlashFs: SPIFFS mounted at {}", MOUNT_POINT);
    Ok(())
}

fn map_io(e: &std::io::Error) -> StorageError {
    match e.kind() {
        ErrorKind::NotFound => StorageError::NotFound,
        ErrorKind::StorageFull | ErrorKind::QuotaExceeded => StorageError::Full,
        ErrorKind::InvalidInput => StorageError::InvalidPath,
        _ => StorageError::IoError,
    }
}

pub struct FlashFs {
    root: PathBuf,
}

impl FlashFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        if path.is_empty() || path.contains('/') || path == "." || path == ".." {
            return Err(StorageError::InvalidPath);
        }
        Ok(self.root.join(path))
    }
}

impl FileSystem for FlashFs {
    fn read(&self, path: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let full = self.resolve(path)?;
        let mut file = std::fs::File::open(&full).map_err(|e| map_io(&e))?;
        let len = file.metadata().map_err(|e| map_io(&e))?.len();
        if len > buf.len() as u64 {
            return Err(StorageError::TooLarge);
        }
        let len = len as usize;
        file.read_exact(&mut buf[..len]).map_err(|e| map_io(&e))?;
        Ok(len)
    }

    fn write(&mut self, path: &str, data: &[u8]) -> Result<(), StorageError> {
        let full = self.resolve(path)?;
        std::fs::write(&full, data).map_err(|e| {
            warn!("FlashFs: write {} failed: {}", path, e);
            map_io(&e)
        })
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<(), StorageError> {
        let src = self.resolve(from)?;
        let dst = self.resolve(to)?;
        // SPIFFS rename does not replace an existing target.
        match std::fs::remove_file(&dst) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(map_io(&e)),
        }
        std::fs::rename(&src, &dst).map_err(|e| map_io(&e))
    }

    fn remove(&mut self, path: &str) -> Result<(), StorageError> {
        let full = self.resolve(path)?;
        match std::fs::remove_file(&full) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(map_io(&e)),
        }
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_ok_and(|p| p.is_file())
    }
}
