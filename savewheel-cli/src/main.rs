/*!
savewheel CLI - rotating save slots for Project Zomboid games.

Lists live games and their archives, saves a game into the next slot, and
restores a slot after snapshotting the current state into a backup.
*/

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{anyhow, Context};
use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use savewheel_core::{
    create_default_engine, init_observability, parse_selection, parse_slot, Inventory,
    LoadOrchestrator, LogFormat, ManagedGame, RestoreReport, RestoreStrategy, SaveConfig,
    SaveError, SaveOrchestrator, SlotEntry,
};
use serde::Serialize;
use tabled::{Table, Tabled};
use tracing::debug;

#[derive(Parser)]
#[command(name = "savewheel")]
#[command(about = "Rotating save slots for Project Zomboid games")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Home directory holding the Zomboid folder
    #[arg(long, global = true, env = "HOME")]
    home: Option<PathBuf>,

    /// JSON configuration file, used instead of the defaults under --home
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Unpack into a staging directory and swap it in, instead of wiping first
    #[arg(long, global = true)]
    staged_restore: bool,

    /// Print Prometheus metrics after the command
    #[arg(long, global = true)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List games that can be saved
    Games {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// List games that have saves to load
    Saves {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show every slot of one game
    Slots {
        /// Game number from `saves`
        selection: Option<String>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Save a game into the next slot
    QuickSave {
        /// Game number from `games`
        selection: Option<String>,
    },
    /// Save a game into a chosen slot
    Save {
        /// Game number from `games`
        selection: Option<String>,
        /// Slot to write
        #[arg(short, long)]
        slot: String,
    },
    /// Restore the most recent save of a game
    QuickLoad {
        /// Game number from `saves`
        selection: Option<String>,
    },
    /// Restore a chosen slot
    Load {
        /// Game number from `saves`
        selection: Option<String>,
        /// Slot to restore
        #[arg(short, long)]
        slot: String,
    },
    /// Undo the last load by restoring the pre-load backup
    Recover {
        /// Game number from the recoverable list
        selection: Option<String>,
    },
}

#[derive(Tabled)]
struct GameRow {
    #[tabled(rename = "#")]
    number: usize,
    #[tabled(rename = "Type")]
    game_type: String,
    #[tabled(rename = "Game")]
    name: String,
    #[tabled(rename = "Last Played")]
    last_played: String,
    #[tabled(rename = "Slots Used")]
    slots: String,
}

#[derive(Tabled)]
struct SaveRow {
    #[tabled(rename = "#")]
    number: usize,
    #[tabled(rename = "Type")]
    game_type: String,
    #[tabled(rename = "Game")]
    name: String,
    #[tabled(rename = "Newest Slot")]
    slot: String,
    #[tabled(rename = "Saved")]
    saved_at: String,
    #[tabled(rename = "Size")]
    size: String,
}

#[derive(Tabled)]
struct BackupRow {
    #[tabled(rename = "#")]
    number: usize,
    #[tabled(rename = "Type")]
    game_type: String,
    #[tabled(rename = "Game")]
    name: String,
    #[tabled(rename = "Backup Taken")]
    saved_at: String,
    #[tabled(rename = "Size")]
    size: String,
}

#[derive(Tabled)]
struct SlotRow {
    #[tabled(rename = "Slot")]
    slot: String,
    #[tabled(rename = "Saved")]
    saved_at: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "File")]
    file: String,
}

fn main() {
    let cli = Cli::parse();

    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    if let Err(e) = init_observability(cli.verbose, format) {
        eprintln!("Warning: logging disabled: {e}");
    }

    let result = run(&cli);

    #[cfg(feature = "metrics")]
    if cli.print_metrics {
        match savewheel_core::SaveMetrics::global().gather_metrics() {
            Ok(text) => print!("{text}"),
            Err(e) => eprintln!("Failed to gather metrics: {e}"),
        }
    }

    if let Err(e) = result {
        report_error(&e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    debug!(?config, "Configuration loaded");

    let inventory = Inventory::scan(&config)?;
    for skipped in inventory.skipped() {
        eprintln!(
            "Warning: ignoring {}: {}",
            skipped.path.display(),
            skipped.reason
        );
    }

    let engine = create_default_engine();

    match &cli.command {
        Commands::Games { json } => list_games(&inventory, *json),
        Commands::Saves { json } => list_saves(&inventory, *json),
        Commands::Slots { selection, json } => {
            let game = choose(inventory.loadable(), selection.as_deref(), print_saves)?;
            show_slots(game, *json)
        }
        Commands::QuickSave { selection } => {
            let game = choose(inventory.saveable(), selection.as_deref(), print_games)?;
            let outcome = SaveOrchestrator::new(&config, &engine)?.quick_save(game)?;
            print_saved(
                &outcome.game.to_string(),
                &outcome.display_path,
                outcome.overwritten,
            );
            Ok(())
        }
        Commands::Save { selection, slot } => {
            let slot = parse_slot(slot, config.capacity)?;
            let game = choose(inventory.saveable(), selection.as_deref(), print_games)?;
            let outcome = SaveOrchestrator::new(&config, &engine)?.save_to_slot(game, slot)?;
            print_saved(
                &outcome.game.to_string(),
                &outcome.display_path,
                outcome.overwritten,
            );
            Ok(())
        }
        Commands::QuickLoad { selection } => {
            let game = choose(inventory.loadable(), selection.as_deref(), print_saves)?;
            let report = LoadOrchestrator::new(&config, &engine)?.quick_load(game)?;
            print_restored(game, &report);
            Ok(())
        }
        Commands::Load { selection, slot } => {
            let slot = parse_slot(slot, config.capacity)?;
            let game = choose(inventory.loadable(), selection.as_deref(), print_saves)?;
            let report = LoadOrchestrator::new(&config, &engine)?.load_slot(game, slot)?;
            print_restored(game, &report);
            Ok(())
        }
        Commands::Recover { selection } => {
            let game = choose(recoverable(&inventory), selection.as_deref(), print_recoverable)?;
            let report = LoadOrchestrator::new(&config, &engine)?.load_backup(game)?;
            print_restored(game, &report);
            Ok(())
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<SaveConfig> {
    let config = match (&cli.config, &cli.home) {
        (Some(path), _) => SaveConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        (None, Some(home)) => SaveConfig::for_home(home),
        (None, None) => return Err(anyhow!("HOME is not set; pass --home or --config")),
    };

    let config = if cli.staged_restore {
        config.with_restore_strategy(RestoreStrategy::StagedSwap)
    } else {
        config
    };
    config.validate()?;
    Ok(config)
}

/// Pick one game from `games`, prompting on stdin if no selection was given
fn choose<'a>(
    games: Vec<&'a ManagedGame>,
    selection: Option<&str>,
    print: fn(&[&ManagedGame]),
) -> anyhow::Result<&'a ManagedGame> {
    if games.is_empty() {
        return Err(SaveError::not_found("No matching games found").into());
    }

    let input = match selection {
        Some(selection) => selection.to_string(),
        None => {
            print(&games);
            print!("Select a game (1-{}): ", games.len());
            io::stdout().flush()?;

            let mut input = String::new();
            io::stdin().lock().read_line(&mut input)?;
            input
        }
    };

    let index = parse_selection(&input, games.len())?;
    Ok(games[index])
}

fn recoverable(inventory: &Inventory) -> Vec<&ManagedGame> {
    let mut games: Vec<&ManagedGame> = inventory
        .games()
        .filter(|g| g.slots.backup().is_some())
        .collect();
    games.sort_by_key(|g| std::cmp::Reverse(g.slots.backup().map(|b| b.created_at)));
    games
}

fn list_games(inventory: &Inventory, json: bool) -> anyhow::Result<()> {
    let games = inventory.saveable();
    if json {
        return print_json(&games);
    }
    if games.is_empty() {
        println!("No games found");
    } else {
        print_games(&games);
    }
    Ok(())
}

fn list_saves(inventory: &Inventory, json: bool) -> anyhow::Result<()> {
    let games = inventory.loadable();
    if json {
        return print_json(&games);
    }
    if games.is_empty() {
        println!("No saves found");
    } else {
        print_saves(&games);
    }
    Ok(())
}

fn show_slots(game: &ManagedGame, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(&game.slots);
    }

    let rows: Vec<SlotRow> = game
        .slots
        .entries_newest_first()
        .into_iter()
        .map(|entry| {
            let (slot, size) = match entry {
                SlotEntry::Save(save) => (save.id.to_string(), save.size_bytes),
                SlotEntry::Backup(backup) => ("backup".to_string(), backup.size_bytes),
            };
            SlotRow {
                slot,
                saved_at: format_timestamp(entry.created_at()),
                size: format_size(size),
                file: entry
                    .archive_path()
                    .file_name()
                    .unwrap_or_default()
                    .to_string_lossy()
                    .to_string(),
            }
        })
        .collect();

    println!("{} ({} of {} slots used)", game.key, game.slots.len(), game.slots.capacity());
    println!("{}", Table::new(rows));
    Ok(())
}

fn print_games(games: &[&ManagedGame]) {
    let rows: Vec<GameRow> = games
        .iter()
        .enumerate()
        .map(|(i, game)| GameRow {
            number: i + 1,
            game_type: game.key.game_type.clone(),
            name: game.key.name.clone(),
            last_played: game
                .created_at
                .map(format_timestamp)
                .unwrap_or_else(|| "-".to_string()),
            slots: format!("{}/{}", game.slots.len(), game.slots.capacity()),
        })
        .collect();
    println!("{}", Table::new(rows));
}

fn print_saves(games: &[&ManagedGame]) {
    let rows: Vec<SaveRow> = games
        .iter()
        .enumerate()
        .filter_map(|(i, game)| {
            let newest = game.slots.most_recent_save()?;
            Some(SaveRow {
                number: i + 1,
                game_type: game.key.game_type.clone(),
                name: game.key.name.clone(),
                slot: newest.id.to_string(),
                saved_at: format_timestamp(newest.created_at),
                size: format_size(newest.size_bytes),
            })
        })
        .collect();
    println!("{}", Table::new(rows));
}

fn print_recoverable(games: &[&ManagedGame]) {
    let rows: Vec<BackupRow> = games
        .iter()
        .enumerate()
        .filter_map(|(i, game)| {
            let backup = game.slots.backup()?;
            Some(BackupRow {
                number: i + 1,
                game_type: game.key.game_type.clone(),
                name: game.key.name.clone(),
                saved_at: format_timestamp(backup.created_at),
                size: format_size(backup.size_bytes),
            })
        })
        .collect();
    println!("{}", Table::new(rows));
}

fn print_saved(game: &str, display_path: &std::path::Path, overwritten: bool) {
    println!("✓ Saved {game} to {}", display_path.display());
    if overwritten {
        println!("  Replaced the save previously held in this slot");
    }
}

fn print_restored(game: &ManagedGame, report: &RestoreReport) {
    println!(
        "✓ Restored {} from {}",
        game.key,
        report
            .restored_from
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
    );
    println!(
        "  Previous state kept in {} ({}); undo with `savewheel recover`",
        report.backup_path.display(),
        format_size(report.backup_bytes)
    );
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn report_error(e: &anyhow::Error) {
    match e.downcast_ref::<SaveError>() {
        Some(SaveError::RestoreFailed { backup, .. }) => {
            eprintln!("✗ {e}");
            eprintln!(
                "  Your game directory may be incomplete. Its previous contents are safe in {}",
                backup.display()
            );
            eprintln!("  Run `savewheel recover` to put them back.");
        }
        Some(SaveError::InvalidSelection(_)) => {
            eprintln!("✗ {e}");
            eprintln!("  Run the matching list command to see the valid numbers.");
        }
        _ => eprintln!("✗ {e:#}"),
    }
}

fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}
