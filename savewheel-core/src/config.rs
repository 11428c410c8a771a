//! Configuration for save roots, slot naming and restore behavior
//!
//! Everything the core needs to know about the environment lives in a
//! [`SaveConfig`] value handed to the orchestrators at construction. The core
//! never reads environment variables itself; front ends resolve `HOME` and
//! build the config.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::slot::SlotNaming;
use crate::{Result, SaveError};

/// Default number of rotating slots per game
pub const DEFAULT_CAPACITY: usize = 5;

/// Slot identifiers are written with two digits, so at most 100 slots fit
pub const MAX_CAPACITY: usize = 100;

/// How a chosen archive is put over the live directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RestoreStrategy {
    /// Snapshot, remove the live directory, then unpack in place
    #[default]
    WipeThenUnpack,
    /// Snapshot, unpack into a sibling staging directory, then swap it in
    StagedSwap,
}

/// Configuration structure for the save manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveConfig {
    /// Directory holding `<game_type>/<game>` live game directories
    pub games_root: PathBuf,
    /// Directory holding `<game_type>/<game>` slot archives
    pub archive_root: PathBuf,
    /// Number of rotating slots per game
    pub capacity: usize,
    /// File name prefix of rotating slot archives
    pub slot_prefix: String,
    /// File stem of the pre-restore backup archive
    pub backup_name: String,
    /// Extension shared by slot and backup archives
    pub archive_extension: String,
    /// File that marks a directory as a real game
    pub marker_file: String,
    /// Restore protocol variant
    #[serde(default)]
    pub restore_strategy: RestoreStrategy,
}

impl SaveConfig {
    /// Create a configuration for the standard layout under a home directory
    ///
    /// Live games are read from `<home>/Zomboid/Saves` and archives are kept
    /// in `<home>/Zomboid/.saves`.
    pub fn for_home<P: AsRef<Path>>(home: P) -> Self {
        let zomboid = home.as_ref().join("Zomboid");
        Self::with_roots(zomboid.join("Saves"), zomboid.join(".saves"))
    }

    /// Create a configuration with explicit roots and default naming
    pub fn with_roots<P1: Into<PathBuf>, P2: Into<PathBuf>>(games_root: P1, archive_root: P2) -> Self {
        SaveConfig {
            games_root: games_root.into(),
            archive_root: archive_root.into(),
            capacity: DEFAULT_CAPACITY,
            slot_prefix: "save_".to_string(),
            backup_name: "load_backup".to_string(),
            archive_extension: "zip".to_string(),
            marker_file: "thumb.png".to_string(),
            restore_strategy: RestoreStrategy::default(),
        }
    }

    /// Set the number of rotating slots
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the restore strategy
    pub fn with_restore_strategy(mut self, strategy: RestoreStrategy) -> Self {
        self.restore_strategy = strategy;
        self
    }

    /// Load a configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SaveError::validation(format!("Failed to read config {}: {e}", path.display()))
        })?;
        let config: SaveConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Slot naming derived from this configuration
    pub fn naming(&self) -> SlotNaming {
        SlotNaming::new(
            &self.slot_prefix,
            &self.backup_name,
            &self.archive_extension,
            self.capacity,
        )
    }

    /// Directory holding the live state of one game
    pub fn game_dir(&self, game_type: &str, name: &str) -> PathBuf {
        self.games_root.join(game_type).join(name)
    }

    /// Directory holding the archives of one game
    pub fn archive_dir(&self, game_type: &str, name: &str) -> PathBuf {
        self.archive_root.join(game_type).join(name)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 || self.capacity > MAX_CAPACITY {
            return Err(SaveError::validation(format!(
                "capacity must be between 1 and {MAX_CAPACITY}, got {}",
                self.capacity
            )));
        }
        if self.slot_prefix.is_empty() {
            return Err(SaveError::validation("slot prefix cannot be empty"));
        }
        if self.backup_name.is_empty() {
            return Err(SaveError::validation("backup name cannot be empty"));
        }
        if self.archive_extension.is_empty() || self.archive_extension.starts_with('.') {
            return Err(SaveError::validation(
                "archive extension must be non-empty and given without a leading dot",
            ));
        }
        if self.marker_file.is_empty() {
            return Err(SaveError::validation("marker file cannot be empty"));
        }

        if self.backup_name.starts_with(&self.slot_prefix) {
            return Err(SaveError::validation(format!(
                "backup name '{}' collides with the slot prefix '{}'",
                self.backup_name, self.slot_prefix
            )));
        }
        Ok(())
    }
}
