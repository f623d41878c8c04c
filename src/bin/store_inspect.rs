use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use memostore::logging::init_logging;
use memostore::store::{SnapshotManager, StoreSnapshot};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Parser)]
#[command(name = "memostore-inspect")]
#[command(about = "Inspect memostore snapshot files")]
struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "warn")]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Per-entity record counts
    Summary { snapshot: PathBuf },
    /// Records waiting for a sync, as JSON
    Unsynced {
        snapshot: PathBuf,
        #[arg(long)]
        entity: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log)?;

    match cli.command {
        Command::Summary { snapshot } => summary(&snapshot),
        Command::Unsynced { snapshot, entity } => unsynced(&snapshot, entity.as_deref()),
    }
}

fn load(path: &Path) -> Result<StoreSnapshot> {
    debug!("loading snapshot {}", path.display());
    SnapshotManager::new(path)
        .load()
        .with_context(|| format!("Failed to load snapshot '{}'", path.display()))?
        .ok_or_else(|| anyhow!("Snapshot '{}' does not exist", path.display()))
}

fn summary(path: &Path) -> Result<()> {
    let snapshot = load(path)?;
    println!(
        "store '{}' (schema {}, format {}), {} record(s), written {}",
        snapshot.name,
        snapshot.schema_version,
        snapshot.format_version,
        snapshot.record_count(),
        snapshot.created_at.to_rfc3339()
    );

    if snapshot.entities.is_empty() {
        println!("  (empty)");
        return Ok(());
    }

    println!("  {:<24} {:>8} {:>8} {:>8}", "entity", "live", "deleted", "unsynced");
    for (entity, table) in &snapshot.entities {
        let deleted = table.values().filter(|r| r.soft_deleted).count();
        let unsynced = table.values().filter(|r| !r.synced).count();
        println!(
            "  {:<24} {:>8} {:>8} {:>8}",
            entity,
            table.len() - deleted,
            deleted,
            unsynced
        );
    }
    Ok(())
}

fn unsynced(path: &Path, entity: Option<&str>) -> Result<()> {
    let snapshot = load(path)?;
    if let Some(entity) = entity {
        if !snapshot.entities.contains_key(entity) {
            return Err(anyhow!("Snapshot has no entity '{}'", entity));
        }
    }

    let mut records: Vec<_> = snapshot
        .entities
        .iter()
        .filter(|(name, _)| entity.is_none_or(|wanted| wanted == name.as_str()))
        .flat_map(|(_, table)| table.values())
        .filter(|record| !record.synced)
        .collect();
    records.sort_by_key(|record| record.date_updated);

    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}
