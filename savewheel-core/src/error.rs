/*!
Error types for the savewheel core engine.
*/

use std::path::PathBuf;
use thiserror::Error;

use crate::restore::RestoreStage;

/// Result type used throughout the savewheel core.
pub type Result<T> = std::result::Result<T, SaveError>;

/// Errors that can occur during save, load and inventory operations.
#[derive(Error, Debug)]
pub enum SaveError {
    /// I/O errors during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// User input that does not name a listed entry
    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    /// An archive file name that looks like a slot but does not decode to one
    #[error("Corrupt slot name '{name}': {reason}")]
    CorruptSlotName { name: String, reason: String },

    /// Packing or unpacking an archive failed
    #[error("Archive error: {0}")]
    ArchiveFailure(String),

    /// The live directory was touched and could not be fully restored
    #[error(
        "Restore failed during {stage}: {reason}. The pre-restore state is kept in {}",
        backup.display()
    )]
    RestoreFailed {
        stage: RestoreStage,
        backup: PathBuf,
        reason: String,
    },

    /// Storage adapter errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Logging or metrics setup errors
    #[error("Observability error: {0}")]
    Observability(String),

    /// A requested game or slot does not exist
    #[error("Not found: {0}")]
    NotFound(String),
}

impl SaveError {
    /// Create a new invalid selection error
    pub fn invalid_selection<S: Into<String>>(msg: S) -> Self {
        Self::InvalidSelection(msg.into())
    }

    /// Create a new corrupt slot name error
    pub fn corrupt_slot_name<S1: Into<String>, S2: Into<String>>(name: S1, reason: S2) -> Self {
        Self::CorruptSlotName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a new archive error
    pub fn archive<S: Into<String>>(msg: S) -> Self {
        Self::ArchiveFailure(msg.into())
    }

    /// Create a new storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new observability error
    pub fn observability<S: Into<String>>(msg: S) -> Self {
        Self::Observability(msg.into())
    }

    /// Create a new not-found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// True when the live directory is known to be untouched.
    ///
    /// Only `RestoreFailed` means the managed directory may be left partial.
    pub fn left_directory_intact(&self) -> bool {
        !matches!(self, Self::RestoreFailed { .. })
    }
}
