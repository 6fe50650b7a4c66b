//! Init command implementation

use anyhow::{Context, Result};
use tracing::info;

use questlog::config::Config;
use questlog::store::SqliteStore;

use super::{GlobalArgs, refuse_overwrite};

/// Write a default config and create the database schema
pub fn init_command(args: &GlobalArgs, force: bool) -> Result<()> {
    let config_path = args.config_path();
    refuse_overwrite(&config_path, force)?;

    let config = Config::default();
    config.save_to_file(&config_path)?;
    println!("Created {}", config_path.display());

    let db_path = config.database_path(args.db.as_deref());
    SqliteStore::open(&db_path)
        .with_context(|| format!("Failed to create database: {}", db_path.display()))?;
    info!(path = %db_path.display(), "Database ready");
    println!("Database: {}", db_path.display());

    println!();
    println!("Next steps:");
    println!("  questlog task <id> --priority high");
    println!("  questlog habit add \"Read 20 pages\"");
    println!("  questlog status");

    Ok(())
}
