/*!
Save and load workflows for a single managed game.

[`SaveOrchestrator`] picks a slot and archives the live directory into it.
[`LoadOrchestrator`] picks an archive and hands it to the
[`RestoreCoordinator`]. Both borrow one [`SaveConfig`] and one
[`ArchiveEngine`], so a caller builds those once and shares them.
*/

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::allocator::SlotAllocator;
use crate::archive::ArchiveAdapter;
use crate::config::SaveConfig;
use crate::engine::ArchiveEngine;
use crate::inventory::{GameKey, ManagedGame};
use crate::restore::{RestoreCoordinator, RestoreReport};
use crate::slot::SlotId;
use crate::storage::StorageAdapter;
use crate::{Result, SaveError};

#[cfg(feature = "metrics")]
use crate::observability::SaveMetrics;

/// Turn a 1-based user choice into an index into a list of `count` items
///
/// # Errors
/// * `SaveError::InvalidSelection` - Not a number, or out of range
pub fn parse_selection(input: &str, count: usize) -> Result<usize> {
    let trimmed = input.trim();
    if count == 0 {
        return Err(SaveError::invalid_selection("there is nothing to choose from"));
    }
    let choice: usize = trimmed
        .parse()
        .map_err(|_| SaveError::invalid_selection(format!("'{trimmed}' is not a number")))?;
    if choice == 0 || choice > count {
        return Err(SaveError::invalid_selection(format!(
            "{choice} is not between 1 and {count}"
        )));
    }
    Ok(choice - 1)
}

/// Parse a slot number typed by the user
///
/// Slots are numbered from 0 as they appear in archive names.
pub fn parse_slot(input: &str, capacity: usize) -> Result<SlotId> {
    let trimmed = input.trim();
    let value: u8 = trimmed
        .parse()
        .map_err(|_| SaveError::invalid_selection(format!("'{trimmed}' is not a slot number")))?;
    if usize::from(value) >= capacity {
        return Err(SaveError::invalid_selection(format!(
            "slot {value} is out of range, slots are 0 to {}",
            capacity.saturating_sub(1)
        )));
    }
    Ok(SlotId::new(value))
}

/// Result of a successful save
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveOutcome {
    pub game: GameKey,
    pub slot: SlotId,
    pub archive_path: PathBuf,
    /// Archive path relative to the directory holding the archive root
    pub display_path: PathBuf,
    /// True when an existing slot archive was replaced
    pub overwritten: bool,
    pub bytes: u64,
}

fn check_engine<S, A>(config: &SaveConfig, engine: &ArchiveEngine<S, A>) -> Result<()>
where
    S: StorageAdapter,
    A: ArchiveAdapter,
{
    config.validate()?;
    if engine.extension() != config.archive_extension {
        return Err(SaveError::validation(format!(
            "Archiver writes .{} files but slots are named .{}",
            engine.extension(),
            config.archive_extension
        )));
    }
    Ok(())
}

/// Archives a game's live directory into one of its slots
pub struct SaveOrchestrator<'a, S, A>
where
    S: StorageAdapter,
    A: ArchiveAdapter,
{
    config: &'a SaveConfig,
    engine: &'a ArchiveEngine<S, A>,
    allocator: SlotAllocator,
}

impl<'a, S, A> SaveOrchestrator<'a, S, A>
where
    S: StorageAdapter,
    A: ArchiveAdapter,
{
    /// # Errors
    /// * `SaveError::Validation` - Invalid config, or the engine's archive
    ///   extension differs from the configured one
    pub fn new(config: &'a SaveConfig, engine: &'a ArchiveEngine<S, A>) -> Result<Self> {
        check_engine(config, engine)?;
        Ok(Self {
            config,
            engine,
            allocator: SlotAllocator::new(config.capacity),
        })
    }

    /// Slot the next quick save would write
    pub fn next_slot(&self, game: &ManagedGame) -> SlotId {
        self.allocator.choose_slot(&game.slots)
    }

    /// Save into the slot chosen by the rotation policy
    pub fn quick_save(&self, game: &ManagedGame) -> Result<SaveOutcome> {
        let slot = self.next_slot(game);
        self.save(game, slot)
    }

    /// Save into a specific slot, replacing whatever it holds
    pub fn save_to_slot(&self, game: &ManagedGame, slot: SlotId) -> Result<SaveOutcome> {
        if slot.index() >= self.config.capacity {
            return Err(SaveError::invalid_selection(format!(
                "slot {slot} is out of range for {} slots",
                self.config.capacity
            )));
        }
        self.save(game, slot)
    }

    fn save(&self, game: &ManagedGame, slot: SlotId) -> Result<SaveOutcome> {
        if !game.is_live() {
            return Err(SaveError::not_found(format!(
                "No live game directory at {}",
                game.live_dir.display()
            )));
        }

        let archive_path = game.archive_dir.join(self.config.naming().file_name(slot));
        let overwritten = game.slots.contains(slot);
        let bytes = self.engine.archive_directory(&game.live_dir, &archive_path)?;

        #[cfg(feature = "metrics")]
        SaveMetrics::global().record_save(overwritten);

        let display_path = display_path(&self.config.archive_root, &archive_path);
        info!(
            game = %game.key,
            slot = %slot,
            overwritten,
            path = %display_path.display(),
            "Saved game"
        );

        Ok(SaveOutcome {
            game: game.key.clone(),
            slot,
            archive_path,
            display_path,
            overwritten,
            bytes,
        })
    }
}

/// Restores a game from one of its archives
pub struct LoadOrchestrator<'a, S, A>
where
    S: StorageAdapter,
    A: ArchiveAdapter,
{
    config: &'a SaveConfig,
    engine: &'a ArchiveEngine<S, A>,
}

impl<'a, S, A> LoadOrchestrator<'a, S, A>
where
    S: StorageAdapter,
    A: ArchiveAdapter,
{
    /// # Errors
    /// * `SaveError::Validation` - Same checks as [`SaveOrchestrator::new`]
    pub fn new(config: &'a SaveConfig, engine: &'a ArchiveEngine<S, A>) -> Result<Self> {
        check_engine(config, engine)?;
        Ok(Self { config, engine })
    }

    /// Where the safety snapshot for `game` is written
    pub fn backup_path(&self, game: &ManagedGame) -> PathBuf {
        game.archive_dir.join(self.config.naming().backup_file_name())
    }

    /// Restore the most recent save, ignoring the backup
    pub fn quick_load(&self, game: &ManagedGame) -> Result<RestoreReport> {
        let slot = game.slots.most_recent_save().ok_or_else(|| {
            SaveError::not_found(format!("No saves to load for {}", game.key))
        })?;
        self.restore_from(game, &slot.archive_path)
    }

    /// Restore a specific slot
    pub fn load_slot(&self, game: &ManagedGame, slot: SlotId) -> Result<RestoreReport> {
        let slot = game.slots.get(slot).ok_or_else(|| {
            SaveError::not_found(format!("Slot {slot} of {} is empty", game.key))
        })?;
        self.restore_from(game, &slot.archive_path)
    }

    /// Undo the last load by restoring the safety snapshot
    ///
    /// The current state is snapshotted first, so calling this twice in a
    /// row swaps back and forth.
    pub fn load_backup(&self, game: &ManagedGame) -> Result<RestoreReport> {
        let backup = game.slots.backup().ok_or_else(|| {
            SaveError::not_found(format!("No pre-load backup for {}", game.key))
        })?;
        self.restore_from(game, &backup.archive_path)
    }

    fn restore_from(&self, game: &ManagedGame, archive: &Path) -> Result<RestoreReport> {
        RestoreCoordinator::new(self.engine, self.config.restore_strategy).restore(
            &game.live_dir,
            archive,
            &self.backup_path(game),
        )
    }
}

/// `archive_path` relative to the parent of `archive_root`
///
/// `/home/me/Zomboid/.saves/Survival/world/save_00.zip` is shown as
/// `.saves/Survival/world/save_00.zip`.
fn display_path(archive_root: &Path, archive_path: &Path) -> PathBuf {
    archive_root
        .parent()
        .and_then(|base| archive_path.strip_prefix(base).ok())
        .unwrap_or(archive_path)
        .to_path_buf()
}
