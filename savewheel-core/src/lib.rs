/*!
# savewheel core

Rotating save slots for game directories.

Each managed game directory can be archived into a fixed number of slots.
New saves fill empty slots first and then overwrite the oldest one. Before
any archive is restored, the current state of the game directory is
snapshotted into a dedicated backup archive, so a load can always be undone.

## Architecture

- Archive formats and storage are adapters ([`ArchiveAdapter`],
  [`StorageAdapter`]) composed by the [`ArchiveEngine`]
- Slot bookkeeping ([`SlotSet`], [`SlotAllocator`]) is pure and never
  touches the filesystem
- [`RestoreCoordinator`] owns the snapshot, wipe and unpack sequence
- [`Inventory`] discovers games and archives on disk, and the
  orchestrators tie everything together for one game

## Usage

```rust,no_run
use savewheel_core::{
    create_default_engine, GameKey, Inventory, LoadOrchestrator, SaveConfig, SaveError,
    SaveOrchestrator,
};

let config = SaveConfig::for_home("/home/me");
let engine = create_default_engine();
let inventory = Inventory::scan(&config)?;
let game = inventory
    .get(&GameKey::new("Survival", "world"))
    .ok_or_else(|| SaveError::not_found("Survival/world"))?;

// Save into the next slot
let outcome = SaveOrchestrator::new(&config, &engine)?.quick_save(game)?;
println!("saved to {}", outcome.display_path.display());

// Later: restore the newest save
LoadOrchestrator::new(&config, &engine)?.quick_load(game)?;
# Ok::<(), savewheel_core::SaveError>(())
```
*/

pub mod allocator;
pub mod archive;
pub mod config;
pub mod engine;
pub mod error;
pub mod inventory;
pub mod observability;
pub mod orchestrator;
pub mod restore;
pub mod slot;
pub mod storage;

#[cfg(test)]
mod test_utils;

pub use allocator::SlotAllocator;
pub use archive::{ArchiveAdapter, ZipArchiver};
pub use config::{RestoreStrategy, SaveConfig};
pub use engine::{create_default_engine, ArchiveEngine};
pub use error::{Result, SaveError};
pub use inventory::{GameKey, Inventory, ManagedGame, SkippedArchive};
pub use observability::{init_default_observability, init_observability, LogFormat};
pub use orchestrator::{parse_selection, parse_slot, LoadOrchestrator, SaveOrchestrator, SaveOutcome};
pub use restore::{RestoreCoordinator, RestoreReport, RestoreStage};
pub use slot::{BackupSlot, SaveSlot, SlotEntry, SlotFile, SlotId, SlotNaming, SlotSet};
pub use storage::{LocalFileStorage, StorageAdapter};

#[cfg(feature = "metrics")]
pub use observability::SaveMetrics;
