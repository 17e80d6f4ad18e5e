//! Atomic blob replacement on a plain filesystem.
//!
//! ```text
//!   write  path.tmp
//!   remove path.bak          (stale from an earlier crash)
//!   rename path     -> path.bak
//!   rename path.tmp -> path
//!   remove path.bak
//! ```
//!
//! A power cut at any point leaves either the old or the new content
//! reachable: readers fall back to `path.bak` when `path` is missing, and
//! [`DurableStore::recover`] promotes an orphaned backup at boot.

use log::{debug, error, info, warn};

use crate::app::ports::{FileSystem, StorageError};

/// Longest path (including the `.tmp`/`.bak` suffix) the store handles.
pub const MAX_PATH_LEN: usize = 64;
/// Largest blob [`DurableStore::copy`] will move.
pub const MAX_BLOB_SIZE: usize = 4096;

const TMP_SUFFIX: &str = ".tmp";
const BAK_SUFFIX: &str = ".bak";

type SiblingPath = heapless::String<MAX_PATH_LEN>;

fn sibling(path: &str, suffix: &str) -> Result<SiblingPath, StorageError> {
    if path.is_empty() {
        return Err(StorageError::InvalidPath);
    }
    let mut s = SiblingPath::new();
    s.push_str(path).map_err(|()| StorageError::InvalidPath)?;
    s.push_str(suffix).map_err(|()| StorageError::InvalidPath)?;
    Ok(s)
}

pub struct DurableStore<F> {
    fs: F,
}

impl<F: FileSystem> DurableStore<F> {
    pub fn new(fs: F) -> Self {
        Self { fs }
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    pub fn fs_mut(&mut self) -> &mut F {
        &mut self.fs
    }

    fn discard(&mut self, path: &str) {
        if let Err(e) = self.fs.remove(path) {
            debug!("Store: could not remove {} ({})", path, e);
        }
    }

    /// Replace `path` with `data` so that a reader never sees a partial
    /// write.  On error the previous content is still in place.
    pub fn write_atomic(&mut self, path: &str, data: &[u8]) -> Result<(), StorageError> {
        let tmp = sibling(path, TMP_SUFFIX)?;
        let bak = sibling(path, BAK_SUFFIX)?;

        if let Err(e) = self.fs.write(&tmp, data) {
            warn!("Store: temp write for {} failed ({})", path, e);
            self.discard(&tmp);
            return Err(e);
        }

        if let Err(e) = self.fs.remove(&bak) {
            self.discard(&tmp);
            return Err(e);
        }

        let had_primary = self.fs.exists(path);
        if had_primary {
            if let Err(e) = self.fs.rename(path, &bak) {
                warn!("Store: could not back up {} ({})", path, e);
                self.discard(&tmp);
                return Err(e);
            }
        }

        if let Err(e) = self.fs.rename(&tmp, path) {
            warn!("Store: commit of {} failed ({}), restoring", path, e);
            if had_primary {
                if let Err(re) = self.fs.rename(&bak, path) {
                    // Readers still reach the old content through the backup.
                    error!("Store: restore of {} failed ({})", path, re);
                }
            }
            self.discard(&tmp);
            return Err(e);
        }

        self.discard(&bak);
        Ok(())
    }

    /// Read `path`, falling back to its backup when the primary is missing.
    pub fn read(&self, path: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        match self.fs.read(path, buf) {
            Err(StorageError::NotFound) => {
                let bak = sibling(path, BAK_SUFFIX)?;
                self.fs.read(&bak, buf)
            }
            other => other,
        }
    }

    pub fn exists(&self, path: &str) -> bool {
        self.fs.exists(path) || sibling(path, BAK_SUFFIX).is_ok_and(|bak| self.fs.exists(&bak))
    }

    /// Delete `path` together with any temp or backup copy.
    pub fn remove(&mut self, path: &str) -> Result<(), StorageError> {
        let tmp = sibling(path, TMP_SUFFIX)?;
        let bak = sibling(path, BAK_SUFFIX)?;
        let primary = self.fs.remove(path);
        let temp = self.fs.remove(&tmp);
        let backup = self.fs.remove(&bak);
        primary.and(temp).and(backup)
    }

    /// Boot-time cleanup after an interrupted write.  Returns `true` when an
    /// orphaned backup was promoted back to `path`.
    pub fn recover(&mut self, path: &str) -> Result<bool, StorageError> {
        let tmp = sibling(path, TMP_SUFFIX)?;
        let bak = sibling(path, BAK_SUFFIX)?;

        let promoted = if !self.fs.exists(path) && self.fs.exists(&bak) {
            self.fs.rename(&bak, path)?;
            info!("Store: recovered {} from backup", path);
            true
        } else {
            if self.fs.exists(&bak) {
                self.discard(&bak);
            }
            false
        };

        if self.fs.exists(&tmp) {
            debug!("Store: dropping stale {}", tmp);
            self.discard(&tmp);
        }
        Ok(promoted)
    }

    /// Atomically copy one blob over another.
    pub fn copy(&mut self, from: &str, to: &str) -> Result<(), StorageError> {
        let mut buf = vec![0u8; MAX_BLOB_SIZE];
        let n = self.read(from, &mut buf)?;
        self.write_atomic(to, &buf[..n])
    }
}
