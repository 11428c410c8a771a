/*!
Save slot model and on-disk slot naming.

A game's archives form a [`SlotSet`]: up to `capacity` rotating
[`SaveSlot`]s plus at most one [`BackupSlot`] written before every restore.
File names are produced and parsed only by [`SlotNaming`].
*/

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::fmt;
use std::path::PathBuf;

use crate::{Result, SaveError};

/// Identifier of a rotating slot, in `[0, capacity)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(u8);

impl SlotId {
    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u8 {
        self.0
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<u8> for SlotId {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

/// One rotating archive of a game directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveSlot {
    pub id: SlotId,
    pub created_at: DateTime<Utc>,
    pub archive_path: PathBuf,
    pub size_bytes: u64,
}

impl SaveSlot {
    pub fn new<P: Into<PathBuf>>(id: SlotId, created_at: DateTime<Utc>, archive_path: P) -> Self {
        Self {
            id,
            created_at,
            archive_path: archive_path.into(),
            size_bytes: 0,
        }
    }

    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = size_bytes;
        self
    }
}

/// The pre-restore safety archive of a game directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupSlot {
    pub created_at: DateTime<Utc>,
    pub archive_path: PathBuf,
    pub size_bytes: u64,
}

impl BackupSlot {
    pub fn new<P: Into<PathBuf>>(created_at: DateTime<Utc>, archive_path: P) -> Self {
        Self {
            created_at,
            archive_path: archive_path.into(),
            size_bytes: 0,
        }
    }

    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = size_bytes;
        self
    }
}

/// Either kind of archive, for listings that mix both
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotEntry<'a> {
    Save(&'a SaveSlot),
    Backup(&'a BackupSlot),
}

impl<'a> SlotEntry<'a> {
    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            SlotEntry::Save(slot) => slot.created_at,
            SlotEntry::Backup(backup) => backup.created_at,
        }
    }

    pub fn archive_path(&self) -> &'a PathBuf {
        match self {
            SlotEntry::Save(slot) => &slot.archive_path,
            SlotEntry::Backup(backup) => &backup.archive_path,
        }
    }

    pub fn as_save(&self) -> Option<&'a SaveSlot> {
        match self {
            SlotEntry::Save(slot) => Some(slot),
            SlotEntry::Backup(_) => None,
        }
    }

    pub fn is_backup(&self) -> bool {
        matches!(self, SlotEntry::Backup(_))
    }
}

/// The archives belonging to one managed game
///
/// Invariants: at most `capacity` rotating slots, identifiers distinct and
/// below `capacity`. Slots are kept ordered newest first; equal timestamps
/// order the lower identifier as older.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSet {
    capacity: usize,
    slots: Vec<SaveSlot>,
    backup: Option<BackupSlot>,
}

impl SlotSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            slots: Vec::with_capacity(capacity),
            backup: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() >= self.capacity
    }

    pub fn contains(&self, id: SlotId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: SlotId) -> Option<&SaveSlot> {
        self.slots.iter().find(|slot| slot.id == id)
    }

    /// Rotating slots, newest first
    pub fn slots(&self) -> &[SaveSlot] {
        &self.slots
    }

    pub fn ids(&self) -> impl Iterator<Item = SlotId> + '_ {
        self.slots.iter().map(|slot| slot.id)
    }

    pub fn backup(&self) -> Option<&BackupSlot> {
        self.backup.as_ref()
    }

    pub fn set_backup(&mut self, backup: BackupSlot) {
        self.backup = Some(backup);
    }

    /// Add a slot, replacing any slot with the same identifier
    ///
    /// Returns the replaced slot. Fails if the identifier is outside the
    /// capacity or if the set is full and the identifier is new.
    pub fn insert(&mut self, slot: SaveSlot) -> Result<Option<SaveSlot>> {
        if slot.id.index() >= self.capacity {
            return Err(SaveError::validation(format!(
                "slot {} is outside capacity {}",
                slot.id, self.capacity
            )));
        }

        let replaced = match self.slots.iter().position(|s| s.id == slot.id) {
            Some(position) => Some(self.slots.remove(position)),
            None if self.is_full() => {
                return Err(SaveError::validation(format!(
                    "slot set is full ({} slots), cannot add slot {}",
                    self.capacity, slot.id
                )));
            }
            None => None,
        };

        self.slots.push(slot);
        self.slots.sort_by_key(|s| Reverse((s.created_at, s.id)));
        Ok(replaced)
    }

    /// Every archive including the backup, newest first
    pub fn entries_newest_first(&self) -> Vec<SlotEntry<'_>> {
        let mut entries: Vec<SlotEntry<'_>> = self.slots.iter().map(SlotEntry::Save).collect();
        if let Some(backup) = &self.backup {
            // A backup sharing a timestamp with a save is listed first.
            let position = entries
                .iter()
                .position(|entry| entry.created_at() <= backup.created_at)
                .unwrap_or(entries.len());
            entries.insert(position, SlotEntry::Backup(backup));
        }
        entries
    }

    /// Time of the newest archive, backup included
    pub fn newest_entry_time(&self) -> Option<DateTime<Utc>> {
        self.entries_newest_first().first().map(SlotEntry::created_at)
    }

    /// The slot a "load most recent" shortcut should restore
    ///
    /// The backup is a recovery artifact of the previous restore, not a save
    /// the player made; when it is the newest entry the next one is offered.
    pub fn most_recent_save(&self) -> Option<&SaveSlot> {
        self.entries_newest_first()
            .into_iter()
            .find_map(|entry| entry.as_save())
    }
}

/// What an archive file name decodes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotFile {
    Slot(SlotId),
    Backup,
    /// Not an archive this tool manages
    Unrelated,
}

/// Encoder/decoder for slot archive file names
///
/// Slot files are `<prefix><NN>.<extension>` with a two-digit identifier;
/// the backup is `<backup_name>.<extension>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotNaming {
    prefix: String,
    backup_name: String,
    extension: String,
    capacity: usize,
}

impl SlotNaming {
    pub fn new(prefix: &str, backup_name: &str, extension: &str, capacity: usize) -> Self {
        Self {
            prefix: prefix.to_string(),
            backup_name: backup_name.to_string(),
            extension: extension.to_string(),
            capacity,
        }
    }

    pub fn file_name(&self, id: SlotId) -> String {
        format!("{}{:02}.{}", self.prefix, id.value(), self.extension)
    }

    pub fn backup_file_name(&self) -> String {
        format!("{}.{}", self.backup_name, self.extension)
    }

    /// Decode an archive file name
    ///
    /// # Errors
    /// `SaveError::CorruptSlotName` when the name carries the slot prefix and
    /// extension but no valid two-digit identifier within capacity.
    pub fn decode(&self, file_name: &str) -> Result<SlotFile> {
        if file_name == self.backup_file_name() {
            return Ok(SlotFile::Backup);
        }

        let Some(stem) = file_name
            .strip_suffix(&self.extension)
            .and_then(|rest| rest.strip_suffix('.'))
        else {
            return Ok(SlotFile::Unrelated);
        };
        let Some(digits) = stem.strip_prefix(&self.prefix) else {
            return Ok(SlotFile::Unrelated);
        };

        if digits.len() != 2 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SaveError::corrupt_slot_name(
                file_name,
                "expected a two-digit slot identifier",
            ));
        }

        let value: u8 = digits
            .parse()
            .map_err(|e| SaveError::corrupt_slot_name(file_name, format!("{e}")))?;
        if usize::from(value) >= self.capacity {
            return Err(SaveError::corrupt_slot_name(
                file_name,
                format!("identifier {value} is outside capacity {}", self.capacity),
            ));
        }

        Ok(SlotFile::Slot(SlotId::new(value)))
    }
}
