//! CLI command implementations

pub mod achievements;
pub mod award;
pub mod challenge;
pub mod habit;
pub mod init;
pub mod reconcile;
pub mod status;
pub mod task;

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result, bail};
use chrono::{NaiveDate, Utc};

use questlog::config::Config;
use questlog::progression::{
    CompletionEvent, CompletionOutcome, ProgressionEngine, ProgressionEvent, level_title,
};
use questlog::store::SqliteStore;

/// Global options shared by every command
#[derive(Debug, Clone, Default)]
pub struct GlobalArgs {
    pub config: Option<PathBuf>,
    pub db: Option<PathBuf>,
    pub user: Option<String>,
}

impl GlobalArgs {
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(Config::global_config_path)
    }
}

/// Attempts at an event that keeps losing the version race
const MAX_ATTEMPTS: u32 = 3;

/// Opened engine and the user a command acts for
pub struct Session {
    pub engine: ProgressionEngine<SqliteStore>,
    pub user_id: String,
}

impl Session {
    pub fn open(args: &GlobalArgs) -> Result<Self> {
        let config = Config::load_from(&args.config_path())?;
        let db_path = config.database_path(args.db.as_deref());
        let store = SqliteStore::open(&db_path)
            .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
        let user_id = config.user_id(args.user.as_deref());
        if user_id.trim().is_empty() {
            bail!("No user given: pass --user or set settings.default_user");
        }

        tracing::debug!(db = %db_path.display(), user_id = %user_id, "Session opened");
        Ok(Self {
            engine: ProgressionEngine::new(store, config.engine_settings()),
            user_id,
        })
    }

    /// Run a completion event, rerunning it while another writer wins the
    /// version race. Reruns replay from the ledger, so XP is never doubled.
    pub fn complete(&self, event: CompletionEvent) -> questlog::Result<CompletionOutcome> {
        let mut attempt = 1;
        loop {
            match self
                .engine
                .process_completion_event(&self.user_id, event.clone())
            {
                Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                    tracing::warn!(attempt, error = %e, "Retrying completion event");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

/// Parse `YYYY-MM-DD`, defaulting to today (UTC)
pub fn parse_date(value: Option<&str>) -> Result<NaiveDate> {
    match value {
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .with_context(|| format!("Invalid date '{s}', expected YYYY-MM-DD")),
        None => Ok(Utc::now().date_naive()),
    }
}

/// Text progress bar, `width` cells wide
pub fn progress_bar(fraction: f64, width: usize) -> String {
    let filled = ((fraction.clamp(0.0, 1.0) * width as f64).round() as usize).min(width);
    format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
}

/// Print what a completion event did
pub fn print_outcome(outcome: &CompletionOutcome) {
    if outcome.entry.is_none() {
        println!("Already checked in for that date, nothing awarded.");
        return;
    }
    if outcome.replayed {
        println!("Already recorded, finished any pending updates.");
    }

    for event in outcome.events() {
        match event {
            ProgressionEvent::XpAwarded { amount, .. } => {
                let bonus = outcome.award.map(|a| a.bonus_total()).unwrap_or(0);
                if bonus > 0 {
                    println!("+{amount} XP ({bonus} bonus)");
                } else {
                    println!("+{amount} XP");
                }
            }
            ProgressionEvent::StreakExtended { count, .. } => {
                println!("Streak: {count}");
            }
            ProgressionEvent::LevelUp(level_up) => {
                println!(
                    "LEVEL UP! {} -> {} ({})",
                    level_up.from,
                    level_up.to,
                    level_title(level_up.to)
                );
            }
            ProgressionEvent::AchievementUnlocked { title, xp, .. } => {
                println!("Achievement unlocked: {title} (+{xp} XP)");
            }
            ProgressionEvent::ChallengeCompleted { coins, xp, .. } => {
                println!("Daily challenge complete! +{coins} coins, +{xp} XP");
            }
        }
    }

    println!("Total XP: {}", outcome.total_xp);
}

/// Ensure `path` is not silently replaced
pub fn refuse_overwrite(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists. Use --force to overwrite.",
            path.display()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_bar() {
        assert_eq!(progress_bar(0.0, 4), "[----]");
        assert_eq!(progress_bar(0.5, 4), "[##--]");
        assert_eq!(progress_bar(1.5, 4), "[####]");
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date(Some("2024-03-01")).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
        );
        assert!(parse_date(Some("03/01/2024")).is_err());
        assert!(parse_date(None).is_ok());
    }
}
