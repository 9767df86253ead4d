// imagerff - evidence intake CLI
// Backs up image files, extracts their metadata and keeps a local record store

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use imagerff::{Extractor, ExtractorConfig};

#[derive(Parser)]
#[command(name = "imagerff", version, about = "Image metadata extraction with evidence-preserving backups")]
struct Args {
    /// SQLite record store
    #[arg(long, global = true, default_value = "imagerff.db")]
    db: PathBuf,

    /// Default folder for backups (next to the original when unset)
    #[arg(long, global = true)]
    backup_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Copy a file to a timestamped backup
    Backup {
        path: PathBuf,
        #[arg(long)]
        dest: Option<PathBuf>,
    },
    /// Extract metadata from an existing backup and store the record
    Extract { backup_path: PathBuf },
    /// Back up a file, then extract from the backup
    Import {
        path: PathBuf,
        #[arg(long)]
        dest: Option<PathBuf>,
    },
    /// Show the most recent stored records
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = ExtractorConfig {
        store_path: args.db.clone(),
        backup_dir: args.backup_dir.clone(),
    };
    let mut extractor = Extractor::new(&config)
        .with_context(|| format!("Failed to open record store {}", config.store_path.display()))?;

    match args.command {
        Command::Backup { path, dest } => {
            let backup = extractor
                .backup(&path, dest.as_deref())
                .with_context(|| format!("Backup of {} failed", path.display()))?;
            print_json(&backup)?;
        }
        Command::Extract { backup_path } => {
            let record = extractor
                .extract(&backup_path)
                .with_context(|| format!("Extraction from {} failed", backup_path.display()))?;
            print_json(&record)?;
        }
        Command::Import { path, dest } => {
            let imported = extractor
                .import(&path, dest.as_deref())
                .with_context(|| format!("Import of {} failed", path.display()))?;
            print_json(&imported)?;
        }
        Command::List { limit } => {
            let records = extractor.store().recent(limit).context("Failed to read records")?;
            info!("{} of {} records", records.len(), extractor.store().count()?);
            print_json(&records)?;
        }
    }

    debug!("Metrics: {:?}", extractor.metrics().snapshot());
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}
