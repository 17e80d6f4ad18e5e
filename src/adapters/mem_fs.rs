//! In-memory filesystem adapter.
//!
//! Implements [`FileSystem`] over a shared `HashMap`, for host-side
//! simulation and tests.  Clones share the same backing map, so a test can
//! keep a handle and inspect or corrupt files behind the store's back.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::app::ports::{FileSystem, StorageError};

#[derive(Clone, Default)]
pub struct MemFs {
    files: Rc<RefCell<HashMap<String, Vec<u8>>>>,
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of every stored file, sorted.
    pub fn paths(&self) -> Vec<String> {
        let mut v: Vec<String> = self.files.borrow().keys().cloned().collect();
        v.sort();
        v
    }

    /// Raw contents of a file, bypassing the port.
    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        self.files.borrow().get(path).cloned()
    }
}

impl FileSystem for MemFs {
    fn read(&self, path: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let files = self.files.borrow();
        let data = files.get(path).ok_or(StorageError::NotFound)?;
        if data.len() > buf.len() {
            return Err(StorageError::TooLarge);
        }
        buf[..data.len()].copy_from_slice(data);
        Ok(data.len())
    }

    fn write(&mut self, path: &str, data: &[u8]) -> Result<(), StorageError> {
        self.files
            .borrow_mut()
            .insert(path.to_string(), data.to_vec());
        Ok(())
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<(), StorageError> {
        let mut files = self.files.borrow_mut();
        let data = files.remove(from).ok_or(StorageError::NotFound)?;
        files.insert(to.to_string(), data);
        Ok(())
    }

    fn remove(&mut self, path: &str) -> Result<(), StorageError> {
        self.files.borrow_mut().remove(path);
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        self.files.borrow().contains_key(path)
    }
}
