//! Shared test utilities for progression integration tests

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use tempfile::TempDir;

use questlog::progression::{
    AchievementUnlock, AwardBonuses, CompletionEvent, CompletionOutcome, DailyChallenge,
    EngineSettings, Habit, LedgerEntry, NewLedgerEntry, Priority, ProgressionEngine,
    UserChallengeProgress, UserProgress, XpReason,
};
use questlog::store::{ProgressStore, SqliteStore};
use questlog::{ProgressError, Result};

/// Engine over an on-disk database inside a temp dir.
///
/// Keep the `TempDir` alive for as long as the engine is used.
pub fn create_test_engine() -> (TempDir, ProgressionEngine<SqliteStore>) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let engine = open_engine(&temp_dir.path().join("questlog.db"));
    (temp_dir, engine)
}

/// Another engine (own connection, own lock registry) on an existing file
pub fn open_engine(path: &Path) -> ProgressionEngine<SqliteStore> {
    let store = SqliteStore::open(path).expect("Failed to open test database");
    ProgressionEngine::new(store, EngineSettings::default())
}

pub fn at(y: i32, m: u32, d: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, hour, 0, 0)
        .single()
        .expect("valid timestamp")
}

/// Task completed at noon on 2024-03-01 with no bonuses
pub fn noon_task(task_id: &str, priority: Priority) -> CompletionEvent {
    CompletionEvent::Task {
        task_id: task_id.to_string(),
        priority,
        xp_override: None,
        completed_at: at(2024, 3, 1, 12),
        area: None,
        bonuses: AwardBonuses::default(),
    }
}

/// Process an event, rerunning it the way a caller handles a lost version race
pub fn complete_with_retry<S: ProgressStore>(
    engine: &ProgressionEngine<S>,
    user_id: &str,
    event: CompletionEvent,
) -> CompletionOutcome {
    for _ in 0..100 {
        match engine.process_completion_event(user_id, event.clone()) {
            Ok(outcome) => return outcome,
            Err(e) if e.is_retryable() => continue,
            Err(e) => panic!("completion failed: {e}"),
        }
    }
    panic!("completion kept conflicting");
}

type SaveFilter = Box<dyn Fn(&UserProgress) -> bool + Send + Sync>;

/// SQLite store whose snapshot saves lose the version race on demand.
///
/// The first `failures` saves matching `fail_when` return
/// `ConcurrencyConflict` without writing anything.
pub struct FlakyStore {
    inner: SqliteStore,
    fail_when: SaveFilter,
    remaining: AtomicU32,
}

impl FlakyStore {
    pub fn new(
        failures: u32,
        fail_when: impl Fn(&UserProgress) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner: SqliteStore::open_in_memory().expect("Failed to open test database"),
            fail_when: Box::new(fail_when),
            remaining: AtomicU32::new(failures),
        }
    }

    pub fn engine(self) -> ProgressionEngine<Self> {
        ProgressionEngine::new(self, EngineSettings::default())
    }
}

impl ProgressStore for FlakyStore {
    fn append_ledger(&self, entry: &NewLedgerEntry) -> Result<(LedgerEntry, bool)> {
        self.inner.append_ledger(entry)
    }

    fn find_ledger_entry(
        &self,
        user_id: &str,
        reason: XpReason,
        reference_id: &str,
    ) -> Result<Option<LedgerEntry>> {
        self.inner.find_ledger_entry(user_id, reason, reference_id)
    }

    fn ledger_total(&self, user_id: &str) -> Result<i64> {
        self.inner.ledger_total(user_id)
    }

    fn ledger_for_day(&self, user_id: &str, day: NaiveDate) -> Result<Vec<LedgerEntry>> {
        self.inner.ledger_for_day(user_id, day)
    }

    fn recent_ledger(&self, user_id: &str, limit: usize) -> Result<Vec<LedgerEntry>> {
        self.inner.recent_ledger(user_id, limit)
    }

    fn load_progress(&self, user_id: &str) -> Result<UserProgress> {
        self.inner.load_progress(user_id)
    }

    fn save_progress(&self, progress: &UserProgress, applied: Option<i64>) -> Result<UserProgress> {
        let fail = (self.fail_when)(progress)
            && self
                .remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
        if fail {
            return Err(ProgressError::ConcurrencyConflict {
                user_id: progress.user_id.clone(),
                expected: progress.version,
                found: progress.version + 1,
            });
        }
        self.inner.save_progress(progress, applied)
    }

    fn is_applied(&self, entry_id: i64) -> Result<bool> {
        self.inner.is_applied(entry_id)
    }

    fn insert_habit(&self, habit: &Habit) -> Result<()> {
        self.inner.insert_habit(habit)
    }

    fn load_habit(&self, habit_id: &str) -> Result<Habit> {
        self.inner.load_habit(habit_id)
    }

    fn list_habits(&self, user_id: &str) -> Result<Vec<Habit>> {
        self.inner.list_habits(user_id)
    }

    fn has_completion(&self, habit_id: &str, date: NaiveDate) -> Result<bool> {
        self.inner.has_completion(habit_id, date)
    }

    fn commit_check_in(&self, habit: &Habit, date: NaiveDate) -> Result<bool> {
        self.inner.commit_check_in(habit, date)
    }

    fn unlocked_achievements(&self, user_id: &str) -> Result<Vec<AchievementUnlock>> {
        self.inner.unlocked_achievements(user_id)
    }

    fn insert_unlock(&self, unlock: &AchievementUnlock) -> Result<bool> {
        self.inner.insert_unlock(unlock)
    }

    fn ensure_challenge(&self, challenge: &DailyChallenge) -> Result<DailyChallenge> {
        self.inner.ensure_challenge(challenge)
    }

    fn load_challenge(&self, challenge_id: &str) -> Result<DailyChallenge> {
        self.inner.load_challenge(challenge_id)
    }

    fn challenge_for_date(&self, date: NaiveDate) -> Result<Option<DailyChallenge>> {
        self.inner.challenge_for_date(date)
    }

    fn load_challenge_progress(
        &self,
        user_id: &str,
        challenge_id: &str,
    ) -> Result<Option<UserChallengeProgress>> {
        self.inner.load_challenge_progress(user_id, challenge_id)
    }

    fn save_challenge_progress(&self, progress: &UserChallengeProgress) -> Result<()> {
        self.inner.save_challenge_progress(progress)
    }

    fn record_area(&self, user_id: &str, area: &str) -> Result<u64> {
        self.inner.record_area(user_id, area)
    }
}
