/*!
Archive adapters that turn a directory tree into an opaque blob and back.

The engine never looks inside a blob; it only moves blobs between an
[`ArchiveAdapter`] and a storage adapter. The default implementation writes
zip archives, which keeps existing `.zip` slot files readable.
*/

use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;

use tracing::debug;
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::{Result, SaveError};

/// Archive abstraction for directory snapshots
///
/// This trait defines the interface for all archive formats. It allows the
/// engine to snapshot and restore directories without being coupled to a
/// specific format.
#[cfg_attr(test, mockall::automock)]
pub trait ArchiveAdapter {
    /// Pack the contents of `source` (not the directory itself)
    ///
    /// # Arguments
    /// * `source` - Directory whose contents are archived
    ///
    /// # Returns
    /// The archive bytes or an error
    fn pack(&self, source: &Path) -> Result<Vec<u8>>;

    /// An archive holding no entries
    fn pack_empty(&self) -> Result<Vec<u8>>;

    /// Write the entries of `blob` below `dest`, creating it if needed
    ///
    /// # Arguments
    /// * `blob` - Archive bytes produced by `pack`
    /// * `dest` - Directory receiving the entries
    fn unpack(&self, blob: &[u8], dest: &Path) -> Result<()>;

    /// File extension of archives in this format, without the dot
    fn extension(&self) -> &str;

    /// Get the name of the archive format
    fn format_name(&self) -> &str;
}

/// Zip archive adapter
///
/// Files are deflated by default; directories are stored as explicit
/// entries so empty directories survive a round trip. On unix each file
/// keeps its permission bits.
///
/// # Example
/// ```rust,no_run
/// use savewheel_core::{ArchiveAdapter, ZipArchiver};
/// use std::path::Path;
///
/// let archiver = ZipArchiver::new();
/// let blob = archiver.pack(Path::new("/games/Survival/world"))?;
/// archiver.unpack(&blob, Path::new("/tmp/world-copy"))?;
/// # Ok::<(), savewheel_core::SaveError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ZipArchiver {
    method: CompressionMethod,
}

impl ZipArchiver {
    /// Create a zip archiver with default deflate level
    pub fn new() -> Self {
        Self {
            method: CompressionMethod::Deflated,
        }
    }

    /// Create an archiver that stores files uncompressed
    pub fn stored() -> Self {
        Self {
            method: CompressionMethod::Stored,
        }
    }

    fn file_options(&self, mode: u32) -> FileOptions {
        FileOptions::default()
            .compression_method(self.method)
            .unix_permissions(mode)
    }

    fn dir_options(&self) -> FileOptions {
        FileOptions::default()
            .compression_method(CompressionMethod::Stored)
            .unix_permissions(0o755)
    }
}

/// Permission bits to record for a file entry
#[cfg(unix)]
fn file_mode(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn file_mode(metadata: &fs::Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

impl Default for ZipArchiver {
    fn default() -> Self {
        Self::new()
    }
}

fn zip_error(context: &str, err: impl std::fmt::Display) -> SaveError {
    SaveError::archive(format!("{context}: {err}"))
}

impl ArchiveAdapter for ZipArchiver {
    fn pack(&self, source: &Path) -> Result<Vec<u8>> {
        if !source.is_dir() {
            return Err(SaveError::archive(format!(
                "Cannot archive {}: not a directory",
                source.display()
            )));
        }

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let mut files = 0usize;

        for entry in WalkDir::new(source).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| zip_error("Failed to walk directory", e))?;
            let rel = entry
                .path()
                .strip_prefix(source)
                .map_err(|e| zip_error("Entry outside source directory", e))?;
            let name = rel.to_string_lossy().replace('\\', "/");

            if entry.file_type().is_dir() {
                zip.add_directory(name, self.dir_options())
                    .map_err(|e| zip_error("Failed to add directory entry", e))?;
            } else if entry.file_type().is_file() {
                let metadata = entry.metadata().map_err(|e| {
                    zip_error(&format!("Failed to stat {}", entry.path().display()), e)
                })?;
                let data = fs::read(entry.path()).map_err(|e| {
                    zip_error(&format!("Failed to read {}", entry.path().display()), e)
                })?;
                zip.start_file(name, self.file_options(file_mode(&metadata)))
                    .map_err(|e| zip_error("Failed to start file entry", e))?;
                zip.write_all(&data)
                    .map_err(|e| zip_error("Failed to write file entry", e))?;
                files += 1;
            } else {
                debug!(path = %entry.path().display(), "Skipping non-regular file");
            }
        }

        let cursor = zip
            .finish()
            .map_err(|e| zip_error("Failed to finish archive", e))?;
        debug!(source = %source.display(), files, "Packed directory");
        Ok(cursor.into_inner())
    }

    fn pack_empty(&self) -> Result<Vec<u8>> {
        let cursor = ZipWriter::new(Cursor::new(Vec::new()))
            .finish()
            .map_err(|e| zip_error("Failed to finish empty archive", e))?;
        Ok(cursor.into_inner())
    }

    fn unpack(&self, blob: &[u8], dest: &Path) -> Result<()> {
        let mut archive =
            ZipArchive::new(Cursor::new(blob)).map_err(|e| zip_error("Unreadable archive", e))?;

        fs::create_dir_all(dest).map_err(|e| {
            zip_error(&format!("Failed to create {}", dest.display()), e)
        })?;

        archive
            .extract(dest)
            .map_err(|e| zip_error(&format!("Failed to extract into {}", dest.display()), e))?;
        debug!(dest = %dest.display(), entries = archive.len(), "Unpacked archive");
        Ok(())
    }

    fn extension(&self) -> &str {
        "zip"
    }

    fn format_name(&self) -> &str {
        match self.method {
            CompressionMethod::Stored => "zip-stored",
            _ => "zip-deflate",
        }
    }
}
