/*!
Local filesystem storage adapter implementation.
*/

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::StorageAdapter;
use crate::{Result, SaveError};

/// Local filesystem storage adapter
///
/// Archives are written next to their final location and renamed into
/// place, so a failed write never clobbers the previous archive. Parent
/// directories are created on demand.
///
/// # Example
/// ```rust,no_run
/// use savewheel_core::{LocalFileStorage, StorageAdapter};
/// use std::path::Path;
///
/// let storage = LocalFileStorage::new();
/// storage.save(b"archive bytes", Path::new("/saves/Survival/world/save_00.zip"))?;
/// # Ok::<(), savewheel_core::SaveError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct LocalFileStorage;

impl LocalFileStorage {
    /// Create a new local file storage adapter
    ///
    /// Paths provided to the adapter are used as-is.
    pub fn new() -> Self {
        Self
    }

    /// Ensure the parent directory exists, creating it if necessary
    fn ensure_parent_dir(&self, path: &Path) -> Result<PathBuf> {
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if !parent.exists() {
            fs::create_dir_all(&parent).map_err(|e| {
                SaveError::storage(format!(
                    "Failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        Ok(parent)
    }
}

impl StorageAdapter for LocalFileStorage {
    fn save(&self, data: &[u8], path: &Path) -> Result<()> {
        let parent = self.ensure_parent_dir(path)?;

        let write_err = |e: std::io::Error| {
            SaveError::storage(format!(
                "Failed to write archive to {}: {}",
                path.display(),
                e
            ))
        };

        let mut staged = tempfile::NamedTempFile::new_in(&parent).map_err(write_err)?;
        staged.write_all(data).map_err(write_err)?;
        staged.as_file().sync_all().map_err(write_err)?;
        staged
            .persist(path)
            .map_err(|e| write_err(e.error))?;

        debug!(path = %path.display(), bytes = data.len(), "Stored archive");
        Ok(())
    }

    fn load(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).map_err(|e| {
            SaveError::storage(format!(
                "Failed to read archive from {}: {}",
                path.display(),
                e
            ))
        })
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        match fs::remove_dir_all(path) {
            Ok(()) => {
                debug!(path = %path.display(), "Removed directory");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SaveError::storage(format!(
                "Failed to remove {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(from, to).map_err(|e| {
            SaveError::storage(format!(
                "Failed to move {} to {}: {}",
                from.display(),
                to.display(),
                e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_local_file_storage_basic_operations() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalFileStorage::new();

        let test_data = b"test archive data";
        let path = temp_dir.path().join("save_00.zip");

        assert!(storage.save(test_data, &path).is_ok());
        assert!(path.is_file());

        let loaded_data = storage.load(&path).unwrap();
        assert_eq!(loaded_data, test_data);
    }

    #[test]
    fn test_local_file_storage_nested_directories() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalFileStorage::new();

        let path = temp_dir.path().join("Survival/world/save_03.zip");

        // Should create nested directories automatically
        assert!(storage.save(b"nested", &path).is_ok());
        assert_eq!(storage.load(&path).unwrap(), b"nested");
    }

    #[test]
    fn test_save_replaces_previous_archive() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalFileStorage::new();
        let path = temp_dir.path().join("load_backup.zip");

        storage.save(b"first", &path).unwrap();
        storage.save(b"second", &path).unwrap();

        assert_eq!(storage.load(&path).unwrap(), b"second");
        // Only the archive itself is left behind, no staging files.
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalFileStorage::new();

        let result = storage.load(&temp_dir.path().join("nonexistent.zip"));
        assert!(matches!(result, Err(SaveError::Storage(_))));
    }

    #[test]
    fn test_remove_dir_all_removes_tree_and_tolerates_missing() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalFileStorage::new();
        let world = temp_dir.path().join("world");
        fs::create_dir_all(world.join("map")).unwrap();
        fs::write(world.join("map/0_0.bin"), b"chunk").unwrap();

        storage.remove_dir_all(&world).unwrap();
        assert!(!world.exists());
        storage.remove_dir_all(&world).unwrap();
    }

    #[test]
    fn test_remove_dir_all_on_a_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalFileStorage::new();
        let file = temp_dir.path().join("players.db");
        fs::write(&file, b"players").unwrap();

        let result = storage.remove_dir_all(&file);
        assert!(matches!(result, Err(SaveError::Storage(_))));
        assert!(file.exists());
    }

    #[test]
    fn test_rename_moves_directory() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalFileStorage::new();
        let staged = temp_dir.path().join(".staged");
        let world = temp_dir.path().join("world");
        fs::create_dir_all(&staged).unwrap();
        fs::write(staged.join("thumb.png"), b"png").unwrap();

        storage.rename(&staged, &world).unwrap();
        assert!(!staged.exists());
        assert_eq!(fs::read(world.join("thumb.png")).unwrap(), b"png");

        let result = storage.rename(&staged, &world);
        assert!(matches!(result, Err(SaveError::Storage(_))));
    }
}
