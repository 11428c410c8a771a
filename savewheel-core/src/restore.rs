/*!
Restore protocol with a mandatory safety snapshot.

Restoring replaces a live game directory wholesale, so every restore first
archives the current directory into the backup slot. Steps run strictly in
order and the first failure stops the restore:

1. read the chosen archive (no changes yet)
2. snapshot the live directory into the backup slot
3. wipe the live directory
4. unpack the chosen archive in its place

With [`RestoreStrategy::StagedSwap`] step 4 is split: the archive is
unpacked into a sibling staging directory before the wipe and renamed into
place afterwards.
*/

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{error, info, warn};

use crate::archive::ArchiveAdapter;
use crate::config::RestoreStrategy;
use crate::engine::ArchiveEngine;
use crate::storage::StorageAdapter;
use crate::{Result, SaveError};

#[cfg(feature = "metrics")]
use crate::observability::SaveMetrics;

const STAGING_PREFIX: &str = ".savewheel-restore-";

/// Step of the restore protocol that touched the live directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreStage {
    Wipe,
    Unpack,
    Swap,
}

impl fmt::Display for RestoreStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RestoreStage::Wipe => "wipe",
            RestoreStage::Unpack => "unpack",
            RestoreStage::Swap => "swap",
        };
        f.write_str(name)
    }
}

/// Outcome of a successful restore
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub managed_dir: PathBuf,
    pub restored_from: PathBuf,
    pub backup_path: PathBuf,
    pub backup_bytes: u64,
    pub strategy: RestoreStrategy,
}

/// Runs the restore protocol against one engine
pub struct RestoreCoordinator<'e, S, A>
where
    S: StorageAdapter,
    A: ArchiveAdapter,
{
    engine: &'e ArchiveEngine<S, A>,
    strategy: RestoreStrategy,
}

impl<'e, S, A> RestoreCoordinator<'e, S, A>
where
    S: StorageAdapter,
    A: ArchiveAdapter,
{
    pub fn new(engine: &'e ArchiveEngine<S, A>, strategy: RestoreStrategy) -> Self {
        Self { engine, strategy }
    }

    pub fn strategy(&self) -> RestoreStrategy {
        self.strategy
    }

    /// Replace `managed_dir` with the contents of `chosen_archive`
    ///
    /// The pre-restore state of `managed_dir` is written to `backup_archive`
    /// first, replacing the previous backup. `chosen_archive` may be the
    /// backup itself; it is read before the snapshot overwrites it.
    ///
    /// # Errors
    /// * `SaveError::Storage` - The chosen archive cannot be read; nothing changed
    /// * `SaveError::ArchiveFailure` - The safety snapshot failed (or, when
    ///   staging, the staging directory or unpack failed); the live
    ///   directory is untouched
    /// * `SaveError::RestoreFailed` - The live directory was modified and the
    ///   restore could not complete; the backup archive holds the old state
    pub fn restore(
        &self,
        managed_dir: &Path,
        chosen_archive: &Path,
        backup_archive: &Path,
    ) -> Result<RestoreReport> {
        info!(
            managed_dir = %managed_dir.display(),
            archive = %chosen_archive.display(),
            strategy = ?self.strategy,
            "Starting restore"
        );

        #[cfg(feature = "metrics")]
        let started = std::time::Instant::now();

        let result = self.run(managed_dir, chosen_archive, backup_archive);

        #[cfg(feature = "metrics")]
        {
            let metrics = SaveMetrics::global();
            metrics.record_restore_latency(started.elapsed());
            match &result {
                Ok(_) => metrics.record_restore(),
                Err(e) if e.left_directory_intact() => metrics.record_restore_aborted(),
                Err(_) => metrics.record_restore_failure(),
            }
        }

        match &result {
            Ok(report) => info!(
                managed_dir = %managed_dir.display(),
                backup = %report.backup_path.display(),
                "Restore complete"
            ),
            Err(e) if e.left_directory_intact() => {
                warn!(managed_dir = %managed_dir.display(), error = %e, "Restore aborted, no changes made")
            }
            Err(e) => error!(managed_dir = %managed_dir.display(), error = %e, "Restore failed"),
        }
        result
    }

    fn run(
        &self,
        managed_dir: &Path,
        chosen_archive: &Path,
        backup_archive: &Path,
    ) -> Result<RestoreReport> {
        let blob = self.engine.read_archive(chosen_archive)?;

        let backup_bytes = self
            .engine
            .snapshot_directory(managed_dir, backup_archive)
            .map_err(|e| {
                SaveError::archive(format!(
                    "Restore aborted, no changes made: snapshot of {} failed: {e}",
                    managed_dir.display()
                ))
            })?;
        info!(backup = %backup_archive.display(), bytes = backup_bytes, "Safety snapshot written");

        let failed = |stage: RestoreStage, reason: String| SaveError::RestoreFailed {
            stage,
            backup: backup_archive.to_path_buf(),
            reason,
        };

        match self.strategy {
            RestoreStrategy::WipeThenUnpack => {
                self.engine
                    .wipe_directory(managed_dir)
                    .map_err(|e| failed(RestoreStage::Wipe, e.to_string()))?;
                self.engine
                    .unpack_archive(&blob, managed_dir)
                    .map_err(|e| failed(RestoreStage::Unpack, e.to_string()))?;
            }
            RestoreStrategy::StagedSwap => {
                let staging = staging_dir(managed_dir)?;

                self.engine
                    .unpack_archive(&blob, staging.path())
                    .map_err(|e| {
                        SaveError::archive(format!(
                            "Restore aborted, no changes made: staged unpack failed: {e}"
                        ))
                    })?;

                self.engine
                    .wipe_directory(managed_dir)
                    .map_err(|e| failed(RestoreStage::Wipe, e.to_string()))?;
                self.engine
                    .swap_directory(staging.path(), managed_dir)
                    .map_err(|e| failed(RestoreStage::Swap, e.to_string()))?;
                // The staging path no longer exists; dropping the handle is a no-op.
                drop(staging);
            }
        }

        Ok(RestoreReport {
            managed_dir: managed_dir.to_path_buf(),
            restored_from: chosen_archive.to_path_buf(),
            backup_path: backup_archive.to_path_buf(),
            backup_bytes,
            strategy: self.strategy,
        })
    }
}

/// Create an empty staging directory next to `managed_dir`
fn staging_dir(managed_dir: &Path) -> Result<tempfile::TempDir> {
    let parent = match managed_dir.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let aborted = |e: std::io::Error| {
        SaveError::archive(format!(
            "Restore aborted, no changes made: cannot stage in {}: {e}",
            parent.display()
        ))
    };
    fs::create_dir_all(parent).map_err(aborted)?;
    tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(parent)
        .map_err(aborted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{MockArchiveAdapter, ZipArchiver};
    use crate::storage::{LocalFileStorage, MemoryStorage, MockStorageAdapter};
    use crate::test_utils::{tree, write_tree};
    use tempfile::TempDir;

    struct Fixture {
        temp: TempDir,
        live: PathBuf,
        slot: PathBuf,
        backup: PathBuf,
        engine: ArchiveEngine<LocalFileStorage, ZipArchiver>,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let live = temp.path().join("Saves/Survival/world");
        let saves = temp.path().join(".saves/Survival/world");
        let slot = saves.join("save_00.zip");
        let backup = saves.join("load_backup.zip");
        let engine = ArchiveEngine::new(LocalFileStorage::new(), ZipArchiver::new());

        // Slot content: the state we want back.
        let source = temp.path().join("slot-source");
        write_tree(&source, &[("thumb.png", b"old thumb"), ("map/0_0.bin", b"old chunk")]);
        engine.archive_directory(&source, &slot).unwrap();

        // Live content: what the player has now.
        write_tree(
            &live,
            &[
                ("thumb.png", b"new thumb"),
                ("map/0_0.bin", b"new chunk"),
                ("map/9_9.bin", b"explored later"),
            ],
        );

        Fixture {
            temp,
            live,
            slot,
            backup,
            engine,
        }
    }

    fn slot_tree(fx: &Fixture) -> std::collections::BTreeMap<String, Vec<u8>> {
        let dest = fx.temp.path().join("slot-check");
        fx.engine.unarchive(&fx.slot, &dest).unwrap();
        let t = tree(&dest);
        fs::remove_dir_all(dest).unwrap();
        t
    }

    fn backup_tree(fx: &Fixture) -> std::collections::BTreeMap<String, Vec<u8>> {
        let dest = fx.temp.path().join("backup-check");
        fx.engine.unarchive(&fx.backup, &dest).unwrap();
        let t = tree(&dest);
        fs::remove_dir_all(dest).unwrap();
        t
    }

    #[test]
    fn test_restore_swaps_contents_and_keeps_backup() {
        for strategy in [RestoreStrategy::WipeThenUnpack, RestoreStrategy::StagedSwap] {
            let fx = fixture();
            let before = tree(&fx.live);

            let coordinator = RestoreCoordinator::new(&fx.engine, strategy);
            let report = coordinator.restore(&fx.live, &fx.slot, &fx.backup).unwrap();

            assert_eq!(report.strategy, strategy);
            assert_eq!(report.backup_path, fx.backup);
            assert_eq!(tree(&fx.live), slot_tree(&fx), "{strategy:?}");
            assert_eq!(backup_tree(&fx), before, "{strategy:?}");
            // Files that only existed in the live directory are gone.
            assert!(!fx.live.join("map/9_9.bin").exists());
        }
    }

    #[test]
    fn test_staged_swap_leaves_no_staging_directory() {
        let fx = fixture();
        let coordinator = RestoreCoordinator::new(&fx.engine, RestoreStrategy::StagedSwap);
        coordinator.restore(&fx.live, &fx.slot, &fx.backup).unwrap();

        let leftovers: Vec<_> = fs::read_dir(fx.live.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(STAGING_PREFIX))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_restore_into_missing_directory() {
        let fx = fixture();
        fs::remove_dir_all(&fx.live).unwrap();

        let coordinator = RestoreCoordinator::new(&fx.engine, RestoreStrategy::WipeThenUnpack);
        coordinator.restore(&fx.live, &fx.slot, &fx.backup).unwrap();

        assert_eq!(tree(&fx.live), slot_tree(&fx));
        assert!(backup_tree(&fx).is_empty());
    }

    #[test]
    fn test_restore_from_backup_itself() {
        let fx = fixture();
        let coordinator = RestoreCoordinator::new(&fx.engine, RestoreStrategy::WipeThenUnpack);

        let live_before = tree(&fx.live);
        coordinator.restore(&fx.live, &fx.slot, &fx.backup).unwrap();
        let restored = tree(&fx.live);

        // Undo the restore using the backup it produced.
        coordinator.restore(&fx.live, &fx.backup, &fx.backup).unwrap();
        assert_eq!(tree(&fx.live), live_before);
        assert_eq!(backup_tree(&fx), restored);
    }

    #[test]
    fn test_missing_chosen_archive_changes_nothing() {
        let fx = fixture();
        let before = tree(&fx.live);
        let missing = fx.slot.with_file_name("save_03.zip");

        let coordinator = RestoreCoordinator::new(&fx.engine, RestoreStrategy::WipeThenUnpack);
        let err = coordinator.restore(&fx.live, &missing, &fx.backup).unwrap_err();

        assert!(matches!(err, SaveError::Storage(_)));
        assert_eq!(tree(&fx.live), before);
        assert!(!fx.backup.exists());
    }

    #[test]
    fn test_snapshot_pack_failure_leaves_directory_unchanged() {
        let temp = TempDir::new().unwrap();
        let live = temp.path().join("world");
        write_tree(&live, &[("thumb.png", b"thumb"), ("players.db", b"players")]);
        let before = tree(&live);

        let storage = MemoryStorage::new();
        storage.save(b"slot bytes", Path::new("save_01.zip")).unwrap();

        let mut archiver = MockArchiveAdapter::new();
        archiver
            .expect_pack()
            .returning(|_| Err(SaveError::archive("read error")));
        archiver.expect_unpack().times(0);

        let engine = ArchiveEngine::new(storage, archiver);
        let coordinator = RestoreCoordinator::new(&engine, RestoreStrategy::WipeThenUnpack);
        let err = coordinator
            .restore(&live, Path::new("save_01.zip"), Path::new("load_backup.zip"))
            .unwrap_err();

        assert!(matches!(err, SaveError::ArchiveFailure(ref m) if m.contains("no changes made")));
        assert!(err.left_directory_intact());
        assert_eq!(tree(&live), before);
    }

    #[test]
    fn test_snapshot_storage_failure_leaves_directory_unchanged() {
        let temp = TempDir::new().unwrap();
        let live = temp.path().join("world");
        write_tree(&live, &[("thumb.png", b"thumb")]);
        let before = tree(&live);

        let mut storage = MockStorageAdapter::new();
        storage
            .expect_load()
            .returning(|_| Ok(b"slot bytes".to_vec()));
        storage
            .expect_save()
            .returning(|_, _| Err(SaveError::storage("read-only filesystem")));

        let mut archiver = MockArchiveAdapter::new();
        archiver.expect_pack().returning(|_| Ok(b"packed".to_vec()));
        archiver.expect_unpack().times(0);

        let engine = ArchiveEngine::new(storage, archiver);
        for strategy in [RestoreStrategy::WipeThenUnpack, RestoreStrategy::StagedSwap] {
            let coordinator = RestoreCoordinator::new(&engine, strategy);
            let err = coordinator
                .restore(&live, Path::new("save_01.zip"), Path::new("load_backup.zip"))
                .unwrap_err();

            assert!(matches!(err, SaveError::ArchiveFailure(_)));
            assert_eq!(tree(&live), before);
        }
    }

    #[test]
    fn test_unpack_failure_after_wipe_reports_backup() {
        let fx = fixture();
        let before = tree(&fx.live);
        fs::write(&fx.slot, b"truncated archive").unwrap();

        let coordinator = RestoreCoordinator::new(&fx.engine, RestoreStrategy::WipeThenUnpack);
        let err = coordinator.restore(&fx.live, &fx.slot, &fx.backup).unwrap_err();

        match &err {
            SaveError::RestoreFailed { stage, backup, .. } => {
                assert_eq!(*stage, RestoreStage::Unpack);
                assert_eq!(backup, &fx.backup);
            }
            other => panic!("expected RestoreFailed, got {other:?}"),
        }
        assert!(!err.left_directory_intact());
        // The backup is the recovery path.
        assert_eq!(backup_tree(&fx), before);
    }

    #[test]
    fn test_staged_unpack_failure_keeps_live_directory() {
        let fx = fixture();
        let before = tree(&fx.live);
        fs::write(&fx.slot, b"truncated archive").unwrap();

        let coordinator = RestoreCoordinator::new(&fx.engine, RestoreStrategy::StagedSwap);
        let err = coordinator.restore(&fx.live, &fx.slot, &fx.backup).unwrap_err();

        assert!(matches!(err, SaveError::ArchiveFailure(ref m) if m.contains("no changes made")));
        assert!(err.left_directory_intact());
        assert_eq!(tree(&fx.live), before);
    }

    #[test]
    fn test_staging_setup_failure_is_reported_as_no_changes() {
        let fx = fixture();
        // The game directory's parent is a regular file, so no staging
        // directory can be created beside it.
        let blocker = fx.temp.path().join("Blocked");
        fs::write(&blocker, b"not a directory").unwrap();
        let live = blocker.join("world");

        let coordinator = RestoreCoordinator::new(&fx.engine, RestoreStrategy::StagedSwap);
        let err = coordinator.restore(&live, &fx.slot, &fx.backup).unwrap_err();

        assert!(
            matches!(err, SaveError::ArchiveFailure(ref m) if m.starts_with("Restore aborted, no changes made")),
            "{err:?}"
        );
        assert!(err.left_directory_intact());
        assert_eq!(fs::read(&blocker).unwrap(), b"not a directory");
    }

    /// Storage that writes archives to disk but fails the chosen directory step
    fn failing_storage(fail_wipe: bool) -> MockStorageAdapter {
        let real = LocalFileStorage::new();
        let mut storage = MockStorageAdapter::new();
        let saver = real.clone();
        storage
            .expect_save()
            .returning(move |data, path| saver.save(data, path));
        let loader = real.clone();
        storage.expect_load().returning(move |path| loader.load(path));
        if fail_wipe {
            storage
                .expect_remove_dir_all()
                .returning(|_| Err(SaveError::storage("device busy")));
            storage.expect_rename().times(0);
        } else {
            let remover = real.clone();
            storage
                .expect_remove_dir_all()
                .returning(move |path| remover.remove_dir_all(path));
            storage
                .expect_rename()
                .returning(|_, _| Err(SaveError::storage("cross-device link")));
        }
        storage
    }

    #[test]
    fn test_wipe_failure_reports_backup() {
        for strategy in [RestoreStrategy::WipeThenUnpack, RestoreStrategy::StagedSwap] {
            let fx = fixture();
            let before = tree(&fx.live);

            let engine = ArchiveEngine::new(failing_storage(true), ZipArchiver::new());
            let coordinator = RestoreCoordinator::new(&engine, strategy);
            let err = coordinator.restore(&fx.live, &fx.slot, &fx.backup).unwrap_err();

            match &err {
                SaveError::RestoreFailed { stage, backup, reason } => {
                    assert_eq!(*stage, RestoreStage::Wipe);
                    assert_eq!(backup, &fx.backup);
                    assert!(reason.contains("device busy"));
                }
                other => panic!("expected RestoreFailed, got {other:?}"),
            }
            assert!(!err.left_directory_intact());
            assert_eq!(backup_tree(&fx), before, "{strategy:?}");
        }
    }

    #[test]
    fn test_swap_failure_reports_backup() {
        let fx = fixture();
        let before = tree(&fx.live);

        let engine = ArchiveEngine::new(failing_storage(false), ZipArchiver::new());
        let coordinator = RestoreCoordinator::new(&engine, RestoreStrategy::StagedSwap);
        let err = coordinator.restore(&fx.live, &fx.slot, &fx.backup).unwrap_err();

        match &err {
            SaveError::RestoreFailed { stage, backup, .. } => {
                assert_eq!(*stage, RestoreStage::Swap);
                assert_eq!(backup, &fx.backup);
            }
            other => panic!("expected RestoreFailed, got {other:?}"),
        }
        assert!(!err.left_directory_intact());
        assert!(!fx.live.exists());
        assert_eq!(backup_tree(&fx), before);

        // Recovering from the backup brings the pre-restore state back.
        let coordinator = RestoreCoordinator::new(&fx.engine, RestoreStrategy::WipeThenUnpack);
        coordinator.restore(&fx.live, &fx.backup, &fx.backup).unwrap();
        assert_eq!(tree(&fx.live), before);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(RestoreStage::Wipe.to_string(), "wipe");
        assert_eq!(RestoreStage::Unpack.to_string(), "unpack");
        assert_eq!(RestoreStage::Swap.to_string(), "swap");
    }
}
