/*!
Archive engine that moves directory snapshots between the archive format
and storage.

This module contains the one place where an archive adapter and a storage
adapter meet. Orchestrators and the restore coordinator only talk to
[`ArchiveEngine`].
*/

use std::path::Path;

use tracing::{debug, info};

use crate::archive::{ArchiveAdapter, ZipArchiver};
use crate::storage::{LocalFileStorage, StorageAdapter};
use crate::{Result, SaveError};

#[cfg(feature = "metrics")]
use crate::observability::SaveMetrics;

/// Main engine for archive and unarchive operations
///
/// # Example
/// ```rust,no_run
/// use savewheel_core::{ArchiveEngine, LocalFileStorage, ZipArchiver};
/// use std::path::Path;
///
/// let engine = ArchiveEngine::new(LocalFileStorage::new(), ZipArchiver::new());
///
/// // Save the live directory into a slot archive
/// engine.archive_directory(
///     Path::new("/games/Survival/world"),
///     Path::new("/saves/Survival/world/save_00.zip"),
/// )?;
///
/// // Put it back
/// engine.unarchive(
///     Path::new("/saves/Survival/world/save_00.zip"),
///     Path::new("/games/Survival/world"),
/// )?;
/// # Ok::<(), savewheel_core::SaveError>(())
/// ```
pub struct ArchiveEngine<S, A>
where
    S: StorageAdapter,
    A: ArchiveAdapter,
{
    storage: S,
    archiver: A,
}

impl<S, A> ArchiveEngine<S, A>
where
    S: StorageAdapter,
    A: ArchiveAdapter,
{
    /// Create a new engine with the specified storage and archive adapters
    pub fn new(storage: S, archiver: A) -> Self {
        Self { storage, archiver }
    }

    /// Extension the archive adapter writes, without the dot
    pub fn extension(&self) -> &str {
        self.archiver.extension()
    }

    /// Archive the contents of `source` to `archive_path`
    ///
    /// Any archive already stored at `archive_path` is replaced.
    ///
    /// # Returns
    /// Size of the stored archive in bytes
    ///
    /// # Errors
    /// * `SaveError::ArchiveFailure` - If packing the directory fails
    /// * `SaveError::Storage` - If writing the archive fails
    pub fn archive_directory(&self, source: &Path, archive_path: &Path) -> Result<u64> {
        let blob = self.archiver.pack(source)?;
        self.store(&blob, archive_path)
    }

    /// Archive `source` for safekeeping, tolerating a missing directory
    ///
    /// A directory that does not exist is recorded as an empty archive so
    /// that restoring it later reproduces the absence of content.
    pub fn snapshot_directory(&self, source: &Path, archive_path: &Path) -> Result<u64> {
        let blob = if source.exists() {
            self.archiver.pack(source)?
        } else {
            debug!(source = %source.display(), "Directory missing, snapshotting as empty");
            self.archiver.pack_empty()?
        };
        self.store(&blob, archive_path)
    }

    /// Unpack the archive at `archive_path` into `dest`
    ///
    /// # Errors
    /// * `SaveError::Storage` - If the archive cannot be read
    /// * `SaveError::ArchiveFailure` - If unpacking fails
    pub fn unarchive(&self, archive_path: &Path, dest: &Path) -> Result<()> {
        let blob = self.read_archive(archive_path)?;
        self.unpack_archive(&blob, dest)?;
        info!(
            archive = %archive_path.display(),
            dest = %dest.display(),
            "Unpacked archive"
        );
        Ok(())
    }

    /// Read the raw bytes of a stored archive without unpacking them
    pub fn read_archive(&self, archive_path: &Path) -> Result<Vec<u8>> {
        self.storage
            .load(archive_path)
            .map_err(|e| SaveError::storage(format!("Failed to load archive: {e}")))
    }

    /// Unpack archive bytes previously returned by [`Self::read_archive`]
    pub fn unpack_archive(&self, blob: &[u8], dest: &Path) -> Result<()> {
        self.archiver.unpack(blob, dest)
    }

    /// Remove a live directory and everything under it
    ///
    /// A directory that does not exist counts as already wiped.
    pub fn wipe_directory(&self, dir: &Path) -> Result<()> {
        self.storage.remove_dir_all(dir)
    }

    /// Move a fully unpacked directory into the place of `dest`
    pub fn swap_directory(&self, staged: &Path, dest: &Path) -> Result<()> {
        self.storage.rename(staged, dest)?;
        debug!(staged = %staged.display(), dest = %dest.display(), "Swapped directory into place");
        Ok(())
    }

    fn store(&self, blob: &[u8], archive_path: &Path) -> Result<u64> {
        self.storage
            .save(blob, archive_path)
            .map_err(|e| SaveError::storage(format!("Failed to save archive: {e}")))?;

        #[cfg(feature = "metrics")]
        SaveMetrics::global().record_archive_size(blob.len());

        info!(
            archive = %archive_path.display(),
            bytes = blob.len(),
            format = self.archiver.format_name(),
            "Stored archive"
        );
        Ok(blob.len() as u64)
    }
}

/// Convenience function to create an engine with default components
///
/// Creates an engine with:
/// - Local file storage
/// - Zip archives with default deflate level
pub fn create_default_engine() -> ArchiveEngine<LocalFileStorage, ZipArchiver> {
    ArchiveEngine::new(LocalFileStorage::new(), ZipArchiver::new())
}
