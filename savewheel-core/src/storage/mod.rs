/*!
Storage adapters for archive blobs.

This module defines the storage abstraction (port) and concrete
implementations (adapters). The engine hands finished archive bytes to a
[`StorageAdapter`] and never touches the archive directory itself.
*/

pub mod local;

use std::path::Path;

use crate::Result;

/// Storage abstraction for saving and loading archive blobs
#[cfg_attr(test, mockall::automock)]
pub trait StorageAdapter {
    /// Save archive data to the specified location, replacing what was there
    ///
    /// # Arguments
    /// * `data` - The archive bytes to save
    /// * `path` - The storage location (interpretation depends on implementation)
    fn save(&self, data: &[u8], path: &Path) -> Result<()>;

    /// Load archive data from the specified location
    ///
    /// # Arguments
    /// * `path` - The storage location to load from
    ///
    /// # Returns
    /// The loaded data bytes or an error
    fn load(&self, path: &Path) -> Result<Vec<u8>>;

    /// Remove a directory tree and everything in it
    ///
    /// Removing a path that does not exist is not an error.
    fn remove_dir_all(&self, path: &Path) -> Result<()>;

    /// Move a directory from `from` to `to`
    ///
    /// `to` must not exist. Both paths are expected to sit on the same volume.
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;
}

pub use local::LocalFileStorage;

/// Memory-based storage adapter for testing
///
/// This implementation stores archives in memory using a HashMap.
/// Useful for unit testing without touching the archive directory.
#[cfg(test)]
pub struct MemoryStorage {
    data: std::sync::Arc<std::sync::Mutex<std::collections::HashMap<std::path::PathBuf, Vec<u8>>>>,
}

#[cfg(test)]
impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            data: std::sync::Arc::new(std::sync::Mutex::new(std::collections::HashMap::new())),
        }
    }

    pub fn len(&self) -> usize {
        self.data.lock().unwrap().len()
    }
}

#[cfg(test)]
impl StorageAdapter for MemoryStorage {
    fn save(&self, data: &[u8], path: &Path) -> Result<()> {
        let mut storage = self.data.lock().unwrap();
        storage.insert(path.to_path_buf(), data.to_vec());
        Ok(())
    }

    fn load(&self, path: &Path) -> Result<Vec<u8>> {
        let storage = self.data.lock().unwrap();
        storage.get(path).cloned().ok_or_else(|| {
            crate::SaveError::storage(format!("Archive not found: {}", path.display()))
        })
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        let mut storage = self.data.lock().unwrap();
        storage.retain(|key, _| !key.starts_with(path));
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let mut storage = self.data.lock().unwrap();
        let moved: Vec<_> = storage
            .keys()
            .filter(|key| key.starts_with(from))
            .cloned()
            .collect();
        if moved.is_empty() {
            return Err(crate::SaveError::storage(format!(
                "Nothing to move at {}",
                from.display()
            )));
        }
        for key in moved {
            let target = match key.strip_prefix(from) {
                Ok(rest) if !rest.as_os_str().is_empty() => to.join(rest),
                _ => to.to_path_buf(),
            };
            if let Some(data) = storage.remove(&key) {
                storage.insert(target, data);
            }
        }
        Ok(())
    }
}
