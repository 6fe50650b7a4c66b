//! SQLite-backed progression store
//!
//! Manages `~/.questlog/questlog.db` with automatic schema migration.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use tracing::{debug, warn};

use super::ProgressStore;
use super::time_bucket::{day_bucket, from_millis, parse_day_bucket, to_millis};
use crate::config::Config;
use crate::error::{ProgressError, Result};
use crate::progression::{
    AchievementUnlock, DailyChallenge, Frequency, Habit, LedgerEntry, NewLedgerEntry,
    ProgressCounters, UserChallengeProgress, UserProgress, XpReason,
};

/// How long a writer waits on a locked database before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Schema version this build writes
const SCHEMA_VERSION: i64 = 1;

/// Database wrapper sharing one connection between threads
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the database at the default location (~/.questlog/questlog.db)
    pub fn open_default() -> Result<Self> {
        Self::open(&Config::default_database_path())
    }

    /// Open or create the database at a specific path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ProgressError::StorageUnavailable(format!(
                    "Failed to create database dir {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        debug!(path = %path.display(), "Opened progression database");
        Self::with_connection(conn)
    }

    /// Fresh private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Lock the connection. A panic while holding the lock leaves SQLite itself
    /// consistent, so a poisoned lock is still usable.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Initialize the database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute_batch(SCHEMA_SQL)?;
        drop(conn);
        self.run_migrations()
    }

    /// Record the schema version, refusing databases from a newer build.
    ///
    /// Future schema changes go here as `if version < N { ... }` steps.
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn();

        let version: i64 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |r| r.get(0),
        )?;

        if version > SCHEMA_VERSION {
            return Err(ProgressError::StorageUnavailable(format!(
                "database schema v{version} is newer than this build (v{SCHEMA_VERSION})"
            )));
        }
        if version < SCHEMA_VERSION {
            debug!(from = version, to = SCHEMA_VERSION, "Recording schema version");
            conn.execute("INSERT OR REPLACE INTO schema_version VALUES (?1)", [SCHEMA_VERSION])?;
        }

        Ok(())
    }
}

// ========================================
// ROW MAPPING
// ========================================

fn bad_column(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(ProgressError::invalid(msg)))
}

fn day_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    parse_day_bucket(&raw).ok_or_else(|| bad_column(idx, format!("bad day bucket: {raw}")))
}

fn optional_day_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| parse_day_bucket(&s).ok_or_else(|| bad_column(idx, format!("bad day bucket: {s}"))))
        .transpose()
}

const LEDGER_COLUMNS: &str = "id, user_id, amount, reason, reference_id, created_at, day_bucket";

fn ledger_from_row(row: &Row<'_>) -> rusqlite::Result<LedgerEntry> {
    let reason: String = row.get(3)?;
    Ok(LedgerEntry {
        id: row.get(0)?,
        user_id: row.get(1)?,
        amount: row.get(2)?,
        reason: XpReason::from_str(&reason)
            .ok_or_else(|| bad_column(3, format!("unknown XP reason: {reason}")))?,
        reference_id: row.get(4)?,
        created_at: from_millis(row.get(5)?),
        day: day_column(row, 6)?,
    })
}

const HABIT_COLUMNS: &str =
    "id, user_id, name, frequency, xp_reward, current_streak, longest_streak, last_completed_day";

fn habit_from_row(row: &Row<'_>) -> rusqlite::Result<Habit> {
    let frequency: String = row.get(3)?;
    Ok(Habit {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        frequency: Frequency::from_str(&frequency)
            .ok_or_else(|| bad_column(3, format!("unknown frequency: {frequency}")))?,
        xp_reward: row.get(4)?,
        current_streak: row.get(5)?,
        longest_streak: row.get(6)?,
        last_completed_date: optional_day_column(row, 7)?,
    })
}

const CHALLENGE_COLUMNS: &str =
    "id, challenge_date, task_target, habit_target, xp_target, coin_reward, xp_reward";

fn challenge_from_row(row: &Row<'_>) -> rusqlite::Result<DailyChallenge> {
    Ok(DailyChallenge {
        id: row.get(0)?,
        challenge_date: day_column(row, 1)?,
        task_target: row.get(2)?,
        habit_target: row.get(3)?,
        xp_target: row.get(4)?,
        coin_reward: row.get(5)?,
        xp_reward: row.get(6)?,
    })
}

fn find_entry(
    conn: &Connection,
    user_id: &str,
    reason: XpReason,
    reference_id: &str,
) -> Result<Option<LedgerEntry>> {
    let entry = conn
        .query_row(
            &format!(
                "SELECT {LEDGER_COLUMNS} FROM xp_ledger
                 WHERE user_id = ?1 AND reason = ?2 AND reference_id = ?3"
            ),
            params![user_id, reason.as_str(), reference_id],
            ledger_from_row,
        )
        .optional()?;
    Ok(entry)
}

fn stored_version(conn: &Connection, user_id: &str) -> Result<u64> {
    let version: Option<i64> = conn
        .query_row(
            "SELECT version FROM user_progress WHERE user_id = ?1",
            [user_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(version.unwrap_or(0) as u64)
}

impl ProgressStore for SqliteStore {
    fn append_ledger(&self, entry: &NewLedgerEntry) -> Result<(LedgerEntry, bool)> {
        let conn = self.conn();
        let inserted = conn.execute(
            r#"
            INSERT OR IGNORE INTO xp_ledger
                (user_id, amount, reason, reference_id, created_at, day_bucket)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                entry.user_id,
                entry.amount,
                entry.reason.as_str(),
                entry.reference_id,
                to_millis(entry.created_at),
                day_bucket(entry.day),
            ],
        )?;

        if inserted > 0 {
            let stored = LedgerEntry {
                id: conn.last_insert_rowid(),
                user_id: entry.user_id.clone(),
                amount: entry.amount,
                reason: entry.reason,
                reference_id: entry.reference_id.clone(),
                created_at: from_millis(to_millis(entry.created_at)),
                day: entry.day,
            };
            return Ok((stored, true));
        }

        // Only a referenced entry can collide with the unique index
        let reference_id = entry.reference_id.as_deref().unwrap_or_default();
        let existing = find_entry(&conn, &entry.user_id, entry.reason, reference_id)?
            .ok_or_else(|| {
                ProgressError::StorageUnavailable(format!(
                    "ledger insert ignored but no entry found for {}/{reference_id}",
                    entry.reason.as_str()
                ))
            })?;
        Ok((existing, false))
    }

    fn find_ledger_entry(
        &self,
        user_id: &str,
        reason: XpReason,
        reference_id: &str,
    ) -> Result<Option<LedgerEntry>> {
        find_entry(&self.conn(), user_id, reason, reference_id)
    }

    fn ledger_total(&self, user_id: &str) -> Result<i64> {
        let total = self.conn().query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM xp_ledger WHERE user_id = ?1",
            [user_id],
            |r| r.get(0),
        )?;
        Ok(total)
    }

    fn ledger_for_day(&self, user_id: &str, day: NaiveDate) -> Result<Vec<LedgerEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {LEDGER_COLUMNS} FROM xp_ledger
             WHERE user_id = ?1 AND day_bucket = ?2 ORDER BY id"
        ))?;
        let entries = stmt
            .query_map(params![user_id, day_bucket(day)], ledger_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    fn recent_ledger(&self, user_id: &str, limit: usize) -> Result<Vec<LedgerEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {LEDGER_COLUMNS} FROM xp_ledger
             WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2"
        ))?;
        let entries = stmt
            .query_map(params![user_id, limit as i64], ledger_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    fn load_progress(&self, user_id: &str) -> Result<UserProgress> {
        let conn = self.conn();
        let row = conn
            .query_row(
                r#"
                SELECT total_xp, current_level, coins, longest_habit_streak,
                       total_tasks_completed, counters, last_task_day, last_habit_day, version
                FROM user_progress WHERE user_id = ?1
                "#,
                [user_id],
                |r| {
                    Ok((
                        r.get::<_, i64>(0)?,
                        r.get::<_, u32>(1)?,
                        r.get::<_, i64>(2)?,
                        r.get::<_, i64>(3)?,
                        r.get::<_, i64>(4)?,
                        r.get::<_, String>(5)?,
                        optional_day_column(r, 6)?,
                        optional_day_column(r, 7)?,
                        r.get::<_, i64>(8)?,
                    ))
                },
            )
            .optional()?;

        let Some((total_xp, level, coins, longest, tasks, counters, last_task, last_habit, version)) = row
        else {
            return Ok(UserProgress::new(user_id));
        };

        let counters: ProgressCounters = serde_json::from_str(&counters).map_err(|e| {
            ProgressError::StorageUnavailable(format!("corrupt counters for {user_id}: {e}"))
        })?;

        Ok(UserProgress {
            user_id: user_id.to_string(),
            total_xp,
            current_level: level,
            coins,
            longest_habit_streak: longest as u64,
            total_tasks_completed: tasks as u64,
            counters,
            last_task_date: last_task,
            last_habit_date: last_habit,
            version: version as u64,
        })
    }

    fn save_progress(&self, progress: &UserProgress, applied: Option<i64>) -> Result<UserProgress> {
        let counters = serde_json::to_string(&progress.counters)
            .map_err(|e| ProgressError::StorageUnavailable(e.to_string()))?;
        let next_version = progress.version + 1;
        let now = to_millis(Utc::now());

        let longest = progress.longest_habit_streak as i64;
        let tasks = progress.total_tasks_completed as i64;
        let last_task = progress.last_task_date.map(day_bucket);
        let last_habit = progress.last_habit_date.map(day_bucket);

        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let changed = if progress.version == 0 {
            tx.execute(
                r#"
                INSERT OR IGNORE INTO user_progress
                    (user_id, total_xp, current_level, coins, longest_habit_streak,
                     total_tasks_completed, counters, last_task_day, last_habit_day,
                     version, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
                params![
                    progress.user_id,
                    progress.total_xp,
                    progress.current_level,
                    progress.coins,
                    longest,
                    tasks,
                    counters,
                    last_task,
                    last_habit,
                    next_version as i64,
                    now,
                ],
            )?
        } else {
            tx.execute(
                r#"
                UPDATE user_progress SET
                    total_xp = ?2, current_level = ?3, coins = ?4, longest_habit_streak = ?5,
                    total_tasks_completed = ?6, counters = ?7, last_task_day = ?8,
                    last_habit_day = ?9, version = ?10, updated_at = ?11
                WHERE user_id = ?1 AND version = ?12
                "#,
                params![
                    progress.user_id,
                    progress.total_xp,
                    progress.current_level,
                    progress.coins,
                    longest,
                    tasks,
                    counters,
                    last_task,
                    last_habit,
                    next_version as i64,
                    now,
                    progress.version as i64,
                ],
            )?
        };

        // Counter deltas of an entry land in exactly one snapshot
        let marked = match applied {
            Some(entry_id) if changed > 0 => {
                tx.execute(
                    "INSERT OR IGNORE INTO applied_entries (entry_id, user_id, applied_at) VALUES (?1, ?2, ?3)",
                    params![entry_id, progress.user_id, now],
                )? > 0
            }
            _ => true,
        };

        if changed == 0 || !marked {
            let found = stored_version(&tx, &progress.user_id)?;
            warn!(
                user_id = %progress.user_id,
                expected = progress.version,
                found,
                entry_id = ?applied,
                "Progress version conflict"
            );
            return Err(ProgressError::ConcurrencyConflict {
                user_id: progress.user_id.clone(),
                expected: progress.version,
                found,
            });
        }
        tx.commit()?;

        let mut saved = progress.clone();
        saved.version = next_version;
        Ok(saved)
    }

    fn is_applied(&self, entry_id: i64) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM applied_entries WHERE entry_id = ?1",
            [entry_id],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    fn insert_habit(&self, habit: &Habit) -> Result<()> {
        let conn = self.conn();
        let inserted = conn.execute(
            &format!(
                "INSERT OR IGNORE INTO habits ({HABIT_COLUMNS}, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
            ),
            params![
                habit.id,
                habit.user_id,
                habit.name,
                habit.frequency.as_str(),
                habit.xp_reward,
                habit.current_streak,
                habit.longest_streak,
                habit.last_completed_date.map(day_bucket),
                to_millis(Utc::now()),
            ],
        )?;
        if inserted == 0 {
            return Err(ProgressError::invalid(format!("habit {} already exists", habit.id)));
        }
        Ok(())
    }

    fn load_habit(&self, habit_id: &str) -> Result<Habit> {
        self.conn()
            .query_row(
                &format!("SELECT {HABIT_COLUMNS} FROM habits WHERE id = ?1"),
                [habit_id],
                habit_from_row,
            )
            .optional()?
            .ok_or_else(|| ProgressError::not_found("habit", habit_id))
    }

    fn list_habits(&self, user_id: &str) -> Result<Vec<Habit>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {HABIT_COLUMNS} FROM habits WHERE user_id = ?1 ORDER BY created_at, id"
        ))?;
        let habits = stmt
            .query_map([user_id], habit_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(habits)
    }

    fn has_completion(&self, habit_id: &str, date: NaiveDate) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM habit_logs WHERE habit_id = ?1 AND completed_day = ?2",
            params![habit_id, day_bucket(date)],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    fn commit_check_in(&self, habit: &Habit, date: NaiveDate) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let created = tx.execute(
            "INSERT OR IGNORE INTO habit_logs (habit_id, completed_day, created_at) VALUES (?1, ?2, ?3)",
            params![habit.id, day_bucket(date), to_millis(Utc::now())],
        )? > 0;

        if created {
            tx.execute(
                r#"
                UPDATE habits SET current_streak = ?2, longest_streak = ?3, last_completed_day = ?4
                WHERE id = ?1
                "#,
                params![
                    habit.id,
                    habit.current_streak,
                    habit.longest_streak,
                    habit.last_completed_date.map(day_bucket),
                ],
            )?;
        }

        tx.commit()?;
        Ok(created)
    }

    fn unlocked_achievements(&self, user_id: &str) -> Result<Vec<AchievementUnlock>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT achievement_id, unlocked_at FROM achievements
             WHERE user_id = ?1 ORDER BY unlocked_at, achievement_id",
        )?;
        let unlocks = stmt
            .query_map([user_id], |r| {
                Ok(AchievementUnlock {
                    user_id: user_id.to_string(),
                    achievement_id: r.get(0)?,
                    unlocked_at: from_millis(r.get(1)?),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(unlocks)
    }

    fn insert_unlock(&self, unlock: &AchievementUnlock) -> Result<bool> {
        let inserted = self.conn().execute(
            "INSERT OR IGNORE INTO achievements (user_id, achievement_id, unlocked_at) VALUES (?1, ?2, ?3)",
            params![unlock.user_id, unlock.achievement_id, to_millis(unlock.unlocked_at)],
        )?;
        Ok(inserted > 0)
    }

    fn ensure_challenge(&self, challenge: &DailyChallenge) -> Result<DailyChallenge> {
        let conn = self.conn();
        conn.execute(
            &format!(
                "INSERT OR IGNORE INTO daily_challenges ({CHALLENGE_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
            ),
            params![
                challenge.id,
                day_bucket(challenge.challenge_date),
                challenge.task_target,
                challenge.habit_target,
                challenge.xp_target,
                challenge.coin_reward,
                challenge.xp_reward,
            ],
        )?;
        let stored = conn.query_row(
            &format!("SELECT {CHALLENGE_COLUMNS} FROM daily_challenges WHERE challenge_date = ?1"),
            [day_bucket(challenge.challenge_date)],
            challenge_from_row,
        )?;
        Ok(stored)
    }

    fn load_challenge(&self, challenge_id: &str) -> Result<DailyChallenge> {
        self.conn()
            .query_row(
                &format!("SELECT {CHALLENGE_COLUMNS} FROM daily_challenges WHERE id = ?1"),
                [challenge_id],
                challenge_from_row,
            )
            .optional()?
            .ok_or_else(|| ProgressError::not_found("challenge", challenge_id))
    }

    fn challenge_for_date(&self, date: NaiveDate) -> Result<Option<DailyChallenge>> {
        let challenge = self
            .conn()
            .query_row(
                &format!("SELECT {CHALLENGE_COLUMNS} FROM daily_challenges WHERE challenge_date = ?1"),
                [day_bucket(date)],
                challenge_from_row,
            )
            .optional()?;
        Ok(challenge)
    }

    fn load_challenge_progress(
        &self,
        user_id: &str,
        challenge_id: &str,
    ) -> Result<Option<UserChallengeProgress>> {
        let progress = self
            .conn()
            .query_row(
                r#"
                SELECT tasks_completed, habits_completed, xp_earned, completed, completed_at
                FROM user_challenge_progress WHERE user_id = ?1 AND challenge_id = ?2
                "#,
                params![user_id, challenge_id],
                |r| {
                    Ok(UserChallengeProgress {
                        user_id: user_id.to_string(),
                        challenge_id: challenge_id.to_string(),
                        tasks_completed: r.get(0)?,
                        habits_completed: r.get(1)?,
                        xp_earned: r.get(2)?,
                        completed: r.get(3)?,
                        completed_at: r.get::<_, Option<i64>>(4)?.map(from_millis),
                    })
                },
            )
            .optional()?;
        Ok(progress)
    }

    fn save_challenge_progress(&self, progress: &UserChallengeProgress) -> Result<()> {
        // Completion only ever moves false -> true, even if an older tally lands late
        self.conn().execute(
            r#"
            INSERT INTO user_challenge_progress
                (user_id, challenge_id, tasks_completed, habits_completed, xp_earned, completed, completed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(user_id, challenge_id) DO UPDATE SET
                tasks_completed = MAX(tasks_completed, excluded.tasks_completed),
                habits_completed = MAX(habits_completed, excluded.habits_completed),
                xp_earned = MAX(xp_earned, excluded.xp_earned),
                completed = MAX(completed, excluded.completed),
                completed_at = COALESCE(completed_at, excluded.completed_at)
            "#,
            params![
                progress.user_id,
                progress.challenge_id,
                progress.tasks_completed,
                progress.habits_completed,
                progress.xp_earned,
                progress.completed,
                progress.completed_at.map(to_millis),
            ],
        )?;
        Ok(())
    }

    fn record_area(&self, user_id: &str, area: &str) -> Result<u64> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO task_areas (user_id, area, first_seen_at) VALUES (?1, ?2, ?3)",
            params![user_id, area, to_millis(Utc::now())],
        )?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM task_areas WHERE user_id = ?1",
            [user_id],
            |r| r.get(0),
        )?;
        Ok(count as u64)
    }
}

/// SQL schema for the progression database
const SCHEMA_SQL: &str = r#"
-- Append-only XP ledger; the sum per user is their total XP
CREATE TABLE IF NOT EXISTS xp_ledger (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    amount INTEGER NOT NULL,
    reason TEXT NOT NULL,
    reference_id TEXT,
    created_at INTEGER NOT NULL,
    day_bucket TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_ledger_reference ON xp_ledger(user_id, reason, reference_id);
CREATE INDEX IF NOT EXISTS idx_ledger_user_day ON xp_ledger(user_id, day_bucket);

-- Ledger entries whose counter deltas a snapshot save has carried
CREATE TABLE IF NOT EXISTS applied_entries (
    entry_id INTEGER PRIMARY KEY,
    user_id TEXT NOT NULL,
    applied_at INTEGER NOT NULL,
    FOREIGN KEY (entry_id) REFERENCES xp_ledger(id)
);

-- Derived per-user snapshot (optimistic version column)
CREATE TABLE IF NOT EXISTS user_progress (
    user_id TEXT PRIMARY KEY,
    total_xp INTEGER NOT NULL DEFAULT 0,
    current_level INTEGER NOT NULL DEFAULT 1,
    coins INTEGER NOT NULL DEFAULT 0,
    longest_habit_streak INTEGER NOT NULL DEFAULT 0,
    total_tasks_completed INTEGER NOT NULL DEFAULT 0,
    counters TEXT NOT NULL DEFAULT '{}',
    last_task_day TEXT,
    last_habit_day TEXT,
    version INTEGER NOT NULL DEFAULT 1,
    updated_at INTEGER NOT NULL
);

-- Habits and their streak counters
CREATE TABLE IF NOT EXISTS habits (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    name TEXT NOT NULL,
    frequency TEXT NOT NULL,
    xp_reward INTEGER NOT NULL,
    current_streak INTEGER NOT NULL DEFAULT 0,
    longest_streak INTEGER NOT NULL DEFAULT 0,
    last_completed_day TEXT,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_habit_user ON habits(user_id);

-- One row per habit check-in date
CREATE TABLE IF NOT EXISTS habit_logs (
    habit_id TEXT NOT NULL,
    completed_day TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (habit_id, completed_day),
    FOREIGN KEY (habit_id) REFERENCES habits(id)
);

-- Unlocked achievements
CREATE TABLE IF NOT EXISTS achievements (
    user_id TEXT NOT NULL,
    achievement_id TEXT NOT NULL,
    unlocked_at INTEGER NOT NULL,
    PRIMARY KEY (user_id, achievement_id)
);

-- One challenge per calendar date
CREATE TABLE IF NOT EXISTS daily_challenges (
    id TEXT PRIMARY KEY,
    challenge_date TEXT NOT NULL UNIQUE,
    task_target INTEGER NOT NULL,
    habit_target INTEGER NOT NULL,
    xp_target INTEGER NOT NULL,
    coin_reward INTEGER NOT NULL,
    xp_reward INTEGER NOT NULL
);

-- Per-user standing against a daily challenge
CREATE TABLE IF NOT EXISTS user_challenge_progress (
    user_id TEXT NOT NULL,
    challenge_id TEXT NOT NULL,
    tasks_completed INTEGER NOT NULL DEFAULT 0,
    habits_completed INTEGER NOT NULL DEFAULT 0,
    xp_earned INTEGER NOT NULL DEFAULT 0,
    completed INTEGER NOT NULL DEFAULT 0,
    completed_at INTEGER,
    PRIMARY KEY (user_id, challenge_id),
    FOREIGN KEY (challenge_id) REFERENCES daily_challenges(id)
);

-- Distinct life areas a user has completed tasks in
CREATE TABLE IF NOT EXISTS task_areas (
    user_id TEXT NOT NULL,
    area TEXT NOT NULL,
    first_seen_at INTEGER NOT NULL,
    PRIMARY KEY (user_id, area)
);

-- Schema version
CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_open_and_init() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("test.db");
        let store = SqliteStore::open(&db_path).unwrap();

        let conn = store.conn();
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table'")
            .unwrap();
        let tables: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        for table in [
            "xp_ledger",
            "user_progress",
            "habits",
            "habit_logs",
            "achievements",
            "daily_challenges",
            "user_challenge_progress",
            "task_areas",
            "applied_entries",
        ] {
            assert!(tables.contains(&table.to_string()), "missing table {table}");
        }

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
        drop(stmt);
        drop(conn);

        // Reopening keeps the recorded version
        drop(store);
        SqliteStore::open(&db_path).unwrap();
    }

    #[test]
    fn test_refuses_newer_schema() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("newer.db");
        {
            let conn = Connection::open(&db_path).unwrap();
            conn.execute_batch(
                "CREATE TABLE schema_version (version INTEGER PRIMARY KEY);
                 INSERT INTO schema_version VALUES (99);",
            )
            .unwrap();
        }

        let err = SqliteStore::open(&db_path).err().unwrap();
        assert!(matches!(err, ProgressError::StorageUnavailable(_)));
        assert!(err.to_string().contains("v99"));
    }

    #[test]
    fn test_ledger_dedup_by_reference() {
        let store = SqliteStore::open_in_memory().unwrap();
        let entry = NewLedgerEntry::new("u1", 50, XpReason::TaskComplete, Some("t1".into()), Utc::now());

        let (first, created) = store.append_ledger(&entry).unwrap();
        assert!(created);
        let (second, created) = store.append_ledger(&entry).unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
        assert_eq!(store.ledger_total("u1").unwrap(), 50);

        // Entries without a reference never collide
        let bonus = NewLedgerEntry::new("u1", 5, XpReason::DailyBonus, None, Utc::now());
        store.append_ledger(&bonus).unwrap();
        store.append_ledger(&bonus).unwrap();
        assert_eq!(store.ledger_total("u1").unwrap(), 60);
        assert_eq!(store.recent_ledger("u1", 2).unwrap().len(), 2);
    }

    #[test]
    fn test_ledger_day_override() {
        let store = SqliteStore::open_in_memory().unwrap();
        let entry = NewLedgerEntry::new("u1", 20, XpReason::HabitComplete, Some("h1:2024-03-02".into()), Utc::now())
            .on_day(day(2));
        store.append_ledger(&entry).unwrap();
        assert_eq!(store.ledger_for_day("u1", day(2)).unwrap().len(), 1);
        assert!(store.ledger_for_day("u1", day(3)).unwrap().is_empty());
    }

    #[test]
    fn test_progress_version_check() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut progress = store.load_progress("u1").unwrap();
        assert_eq!(progress.version, 0);

        progress.set_total_xp(120);
        progress.counters.friends_count = 3;
        let saved = store.save_progress(&progress, None).unwrap();
        assert_eq!(saved.version, 1);

        // A second writer still holding version 0 loses
        let err = store.save_progress(&progress, None).unwrap_err();
        assert!(matches!(
            err,
            ProgressError::ConcurrencyConflict { expected: 0, found: 1, .. }
        ));

        let loaded = store.load_progress("u1").unwrap();
        assert_eq!(loaded.current_level, 2);
        assert_eq!(loaded.counters.friends_count, 3);
        assert_eq!(loaded.version, 1);

        let again = store.save_progress(&loaded, None).unwrap();
        assert_eq!(again.version, 2);
        assert!(store.save_progress(&loaded, None).is_err());
    }

    #[test]
    fn test_entry_applied_with_snapshot() {
        let store = SqliteStore::open_in_memory().unwrap();
        let entry = NewLedgerEntry::new("u1", 30, XpReason::TaskComplete, Some("t1".into()), Utc::now());
        let (entry, _) = store.append_ledger(&entry).unwrap();
        assert!(!store.is_applied(entry.id).unwrap());

        // A losing CAS leaves the entry unapplied
        let mut stale = store.load_progress("u1").unwrap();
        store.save_progress(&stale, None).unwrap();
        stale.total_tasks_completed = 1;
        assert!(store.save_progress(&stale, Some(entry.id)).is_err());
        assert!(!store.is_applied(entry.id).unwrap());

        let mut progress = store.load_progress("u1").unwrap();
        progress.total_tasks_completed = 1;
        let saved = store.save_progress(&progress, Some(entry.id)).unwrap();
        assert!(store.is_applied(entry.id).unwrap());

        // Applying the same entry twice is a conflict and rolls back the snapshot
        let mut twice = saved.clone();
        twice.total_tasks_completed = 2;
        assert!(matches!(
            store.save_progress(&twice, Some(entry.id)),
            Err(ProgressError::ConcurrencyConflict { .. })
        ));
        let loaded = store.load_progress("u1").unwrap();
        assert_eq!(loaded.total_tasks_completed, 1);
        assert_eq!(loaded.version, saved.version);

        // The ledger row itself is untouched
        assert_eq!(store.ledger_total("u1").unwrap(), 30);
        assert!(!store.is_applied(9999).unwrap());
    }

    #[test]
    fn test_check_in_commit_is_insert_if_absent() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut habit = Habit::new("h1", "u1", "Stretch", Frequency::Daily, 20);
        store.insert_habit(&habit).unwrap();
        assert!(store.insert_habit(&habit).is_err());

        habit.current_streak = 1;
        habit.longest_streak = 1;
        habit.last_completed_date = Some(day(1));
        assert!(store.commit_check_in(&habit, day(1)).unwrap());
        assert!(store.has_completion("h1", day(1)).unwrap());

        let mut stale = habit.clone();
        stale.current_streak = 9;
        assert!(!store.commit_check_in(&stale, day(1)).unwrap());
        assert_eq!(store.load_habit("h1").unwrap().current_streak, 1);
        assert_eq!(store.list_habits("u1").unwrap().len(), 1);
    }

    #[test]
    fn test_missing_habit_is_not_found() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(matches!(
            store.load_habit("nope"),
            Err(ProgressError::NotFound { kind: "habit", .. })
        ));
    }

    #[test]
    fn test_unlock_inserted_once() {
        let store = SqliteStore::open_in_memory().unwrap();
        let unlock = AchievementUnlock {
            user_id: "u1".into(),
            achievement_id: "first_task".into(),
            unlocked_at: Utc::now(),
        };
        assert!(store.insert_unlock(&unlock).unwrap());
        assert!(!store.insert_unlock(&unlock).unwrap());
        assert_eq!(store.unlocked_achievements("u1").unwrap().len(), 1);
        assert!(store.unlocked_achievements("u2").unwrap().is_empty());
    }

    #[test]
    fn test_challenge_progress_never_reverts() {
        let store = SqliteStore::open_in_memory().unwrap();
        let challenge = DailyChallenge {
            id: "c1".into(),
            challenge_date: day(1),
            task_target: 3,
            habit_target: 2,
            xp_target: 50,
            coin_reward: 25,
            xp_reward: 75,
        };
        let stored = store.ensure_challenge(&challenge).unwrap();
        assert_eq!(stored, challenge);

        // A second challenge for the same date keeps the first
        let other = DailyChallenge {
            id: "c2".into(),
            ..challenge.clone()
        };
        assert_eq!(store.ensure_challenge(&other).unwrap().id, "c1");
        assert_eq!(store.challenge_for_date(day(1)).unwrap().unwrap().id, "c1");

        let mut progress = UserChallengeProgress::new("u1", "c1");
        progress.tasks_completed = 3;
        progress.completed = true;
        progress.completed_at = Some(Utc::now());
        store.save_challenge_progress(&progress).unwrap();

        let stale = UserChallengeProgress::new("u1", "c1");
        store.save_challenge_progress(&stale).unwrap();

        let loaded = store.load_challenge_progress("u1", "c1").unwrap().unwrap();
        assert!(loaded.completed);
        assert_eq!(loaded.tasks_completed, 3);
        assert!(loaded.completed_at.is_some());
    }

    #[test]
    fn test_record_area() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.record_area("u1", "work").unwrap(), 1);
        assert_eq!(store.record_area("u1", "work").unwrap(), 1);
        assert_eq!(store.record_area("u1", "home").unwrap(), 2);
        assert_eq!(store.record_area("u2", "work").unwrap(), 1);
    }
}
