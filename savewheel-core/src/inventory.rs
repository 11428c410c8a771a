/*!
Discovery of managed games and their archives on disk.

Two trees are walked, both laid out as `<root>/<game_type>/<game>`:
the live games under `games_root` and the slot archives under
`archive_root`. A live directory counts as a game only when it contains
the configured marker file. Missing roots produce an empty inventory.
*/

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::SaveConfig;
use crate::slot::{BackupSlot, SaveSlot, SlotFile, SlotSet};
use crate::Result;

/// Identity of a managed game
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct GameKey {
    pub game_type: String,
    pub name: String,
}

impl GameKey {
    pub fn new<S1: Into<String>, S2: Into<String>>(game_type: S1, name: S2) -> Self {
        Self {
            game_type: game_type.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for GameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.game_type, self.name)
    }
}

/// A game directory and the archives kept for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagedGame {
    pub key: GameKey,
    pub live_dir: PathBuf,
    pub archive_dir: PathBuf,
    /// Modification time of the marker file, present for live games only
    pub created_at: Option<DateTime<Utc>>,
    pub slots: SlotSet,
}

impl ManagedGame {
    pub fn new(config: &SaveConfig, key: GameKey) -> Self {
        Self {
            live_dir: config.game_dir(&key.game_type, &key.name),
            archive_dir: config.archive_dir(&key.game_type, &key.name),
            created_at: None,
            slots: SlotSet::new(config.capacity),
            key,
        }
    }

    /// True if the live directory exists and carries the marker file
    pub fn is_live(&self) -> bool {
        self.created_at.is_some()
    }
}

/// An archive file that was skipped during the scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedArchive {
    pub path: PathBuf,
    pub reason: String,
}

/// Everything found under the configured roots
#[derive(Debug, Clone, Default, Serialize)]
pub struct Inventory {
    games: BTreeMap<GameKey, ManagedGame>,
    skipped: Vec<SkippedArchive>,
}

impl Inventory {
    /// Scan the live and archive trees described by `config`
    ///
    /// Corrupt slot names are logged and recorded in [`Self::skipped`]
    /// instead of failing the scan.
    pub fn scan(config: &SaveConfig) -> Result<Self> {
        let mut inventory = Inventory::default();
        inventory.scan_live_games(config)?;
        inventory.scan_archives(config)?;
        debug!(
            games = inventory.games.len(),
            skipped = inventory.skipped.len(),
            "Inventory scanned"
        );
        Ok(inventory)
    }

    fn entry(&mut self, config: &SaveConfig, key: GameKey) -> &mut ManagedGame {
        self.games
            .entry(key.clone())
            .or_insert_with(|| ManagedGame::new(config, key))
    }

    fn scan_live_games(&mut self, config: &SaveConfig) -> Result<()> {
        for (game_type, type_dir) in subdirectories(&config.games_root)? {
            for (name, game_dir) in subdirectories(&type_dir)? {
                let marker = game_dir.join(&config.marker_file);
                if !marker.is_file() {
                    debug!(dir = %game_dir.display(), "No marker file, not a game");
                    continue;
                }
                let created_at = modified_at(&marker)?;
                self.entry(config, GameKey::new(game_type.clone(), name))
                    .created_at = Some(created_at);
            }
        }
        Ok(())
    }

    fn scan_archives(&mut self, config: &SaveConfig) -> Result<()> {
        let naming = config.naming();

        for (game_type, type_dir) in subdirectories(&config.archive_root)? {
            for (name, game_dir) in subdirectories(&type_dir)? {
                let key = GameKey::new(game_type.clone(), name);
                let mut found = Vec::new();

                for entry in fs::read_dir(&game_dir)? {
                    let entry = entry?;
                    let path = entry.path();
                    if !entry.file_type()?.is_file() {
                        continue;
                    }
                    let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                        continue;
                    };

                    match naming.decode(file_name) {
                        Ok(SlotFile::Unrelated) => {}
                        Ok(kind) => found.push((kind, path.clone())),
                        Err(e) => {
                            warn!(path = %path.display(), error = %e, "Skipping archive");
                            self.skipped.push(SkippedArchive {
                                path: path.clone(),
                                reason: e.to_string(),
                            });
                        }
                    }
                }

                let game = self.entry(config, key);
                for (kind, path) in found {
                    let metadata = fs::metadata(&path)?;
                    let created_at = DateTime::<Utc>::from(metadata.modified()?);
                    match kind {
                        SlotFile::Slot(id) => {
                            let slot = SaveSlot::new(id, created_at, path).with_size(metadata.len());
                            game.slots.insert(slot)?;
                        }
                        SlotFile::Backup => {
                            game.slots
                                .set_backup(BackupSlot::new(created_at, path).with_size(metadata.len()));
                        }
                        SlotFile::Unrelated => {}
                    }
                }
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    pub fn get(&self, key: &GameKey) -> Option<&ManagedGame> {
        self.games.get(key)
    }

    /// All games, ordered by type then name
    pub fn games(&self) -> impl Iterator<Item = &ManagedGame> {
        self.games.values()
    }

    /// Archives ignored because their names did not decode
    pub fn skipped(&self) -> &[SkippedArchive] {
        &self.skipped
    }

    /// Games that can be saved: live games, newest first
    pub fn saveable(&self) -> Vec<&ManagedGame> {
        let mut games: Vec<&ManagedGame> = self.games.values().filter(|g| g.is_live()).collect();
        games.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.key.cmp(&b.key)));
        games
    }

    /// Games with at least one restorable save, most recently archived first
    ///
    /// Ordering uses the newest archive of each game, backup included.
    pub fn loadable(&self) -> Vec<&ManagedGame> {
        let mut games: Vec<&ManagedGame> = self
            .games
            .values()
            .filter(|g| g.slots.most_recent_save().is_some())
            .collect();
        games.sort_by(|a, b| {
            b.slots
                .newest_entry_time()
                .cmp(&a.slots.newest_entry_time())
                .then_with(|| a.key.cmp(&b.key))
        });
        games
    }
}

/// Non-hidden subdirectories of `dir` as (name, path), sorted by name
///
/// A missing directory yields nothing.
fn subdirectories(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        out.push((name, entry.path()));
    }
    out.sort();
    Ok(out)
}

fn modified_at(path: &Path) -> Result<DateTime<Utc>> {
    Ok(DateTime::<Utc>::from(fs::metadata(path)?.modified()?))
}
