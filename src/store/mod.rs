//! Persistence for progression state
//!
//! The engine talks to storage only through [`ProgressStore`]. The shipped
//! implementation is [`SqliteStore`] (`~/.questlog/questlog.db`).
//!
//! Two guarantees every implementation must provide:
//!
//! - ledger appends, habit logs and achievement unlocks are insert-if-absent,
//!   reporting whether the call created the row;
//! - `save_progress` is a compare-and-swap on `UserProgress::version`, and
//!   marks at most one ledger entry as applied in the same transaction.

mod sqlite;
mod time_bucket;

pub use sqlite::SqliteStore;
pub use time_bucket::{day_bucket, from_millis, parse_day_bucket, to_millis};

use chrono::NaiveDate;

use crate::error::Result;
use crate::progression::{
    AchievementUnlock, DailyChallenge, Habit, LedgerEntry, NewLedgerEntry, UserChallengeProgress,
    UserProgress, XpReason,
};

/// Storage collaborator of the progression engine
pub trait ProgressStore: Send + Sync {
    // ========================================
    // XP LEDGER
    // ========================================

    /// Append an entry unless one with the same `(user, reason, reference_id)`
    /// exists. Returns the stored entry and whether it was created.
    fn append_ledger(&self, entry: &NewLedgerEntry) -> Result<(LedgerEntry, bool)>;

    fn find_ledger_entry(
        &self,
        user_id: &str,
        reason: XpReason,
        reference_id: &str,
    ) -> Result<Option<LedgerEntry>>;

    /// Sum of all entries for the user
    fn ledger_total(&self, user_id: &str) -> Result<i64>;

    /// Entries counted toward `day`, oldest first
    fn ledger_for_day(&self, user_id: &str, day: NaiveDate) -> Result<Vec<LedgerEntry>>;

    /// Most recent entries, newest first
    fn recent_ledger(&self, user_id: &str, limit: usize) -> Result<Vec<LedgerEntry>>;

    // ========================================
    // USER PROGRESS
    // ========================================

    /// Stored snapshot, or a fresh one (version 0) if the user has none
    fn load_progress(&self, user_id: &str) -> Result<UserProgress>;

    /// Write the snapshot if the stored version still equals `progress.version`.
    /// Returns the snapshot with its new version.
    ///
    /// With `applied = Some(entry_id)` the snapshot carries that ledger entry's
    /// counter deltas: the entry is recorded as applied in the same
    /// transaction, and the save fails with `ConcurrencyConflict` if it
    /// already was. The ledger row itself is never changed.
    fn save_progress(&self, progress: &UserProgress, applied: Option<i64>) -> Result<UserProgress>;

    /// Whether a snapshot save has already carried this entry's deltas
    fn is_applied(&self, entry_id: i64) -> Result<bool>;

    // ========================================
    // HABITS
    // ========================================

    fn insert_habit(&self, habit: &Habit) -> Result<()>;

    fn load_habit(&self, habit_id: &str) -> Result<Habit>;

    fn list_habits(&self, user_id: &str) -> Result<Vec<Habit>>;

    fn has_completion(&self, habit_id: &str, date: NaiveDate) -> Result<bool>;

    /// Atomically insert the `(habit, date)` log if absent and, only when it
    /// was inserted, persist the habit's new counters. Returns whether the log
    /// was created.
    fn commit_check_in(&self, habit: &Habit, date: NaiveDate) -> Result<bool>;

    // ========================================
    // ACHIEVEMENTS
    // ========================================

    fn unlocked_achievements(&self, user_id: &str) -> Result<Vec<AchievementUnlock>>;

    /// Returns true only for the call that created the unlock
    fn insert_unlock(&self, unlock: &AchievementUnlock) -> Result<bool>;

    // ========================================
    // DAILY CHALLENGES
    // ========================================

    /// Store the challenge unless one exists for its date; returns the stored one
    fn ensure_challenge(&self, challenge: &DailyChallenge) -> Result<DailyChallenge>;

    fn load_challenge(&self, challenge_id: &str) -> Result<DailyChallenge>;

    fn challenge_for_date(&self, date: NaiveDate) -> Result<Option<DailyChallenge>>;

    fn load_challenge_progress(
        &self,
        user_id: &str,
        challenge_id: &str,
    ) -> Result<Option<UserChallengeProgress>>;

    fn save_challenge_progress(&self, progress: &UserChallengeProgress) -> Result<()>;

    // ========================================
    // TASK AREAS
    // ========================================

    /// Remember that the user completed a task in `area`.
    /// Returns the number of distinct areas recorded for the user.
    fn record_area(&self, user_id: &str, area: &str) -> Result<u64>;
}
