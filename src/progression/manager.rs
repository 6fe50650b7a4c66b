//! Progression engine - core gamification logic
//!
//! A completion event moves through
//! `Received -> AwardComputed -> StatsUpdated -> AchievementsEvaluated -> ChallengeUpdated -> Done`.
//!
//! The XP ledger entry is durable before any downstream stage runs. Every
//! downstream stage works from the ledger and the stored snapshot, so rerunning
//! an event after a failure finishes the remaining work without awarding the
//! completion XP a second time.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::challenges::{ChallengeSettings, apply_tally, compute_progress};
use super::checker::{Evaluation, evaluate};
use super::definitions::{ACHIEVEMENTS, Achievement, AchievementId};
use super::levels::LevelProgress;
use super::models::{
    AchievementUnlock, CounterKind, DailyChallenge, Frequency, Habit, LedgerEntry, NewLedgerEntry,
    UserChallengeProgress, UserProgress, XpReason,
};
use super::rewards::{
    AwardBonuses, LevelUp, Priority, XpAward, base_for_habit, base_for_task, compute_award,
    detect_level_up,
};
use super::streaks::{StreakChange, StreakResult, advance_daily_run, apply_check_in};
use crate::error::{ProgressError, Result};
use crate::store::{ProgressStore, day_bucket};

/// Night Owl window: 21:00 - 05:59
const NIGHT_START_HOUR: u32 = 21;
const NIGHT_END_HOUR: u32 = 6;
/// Early Bird window: 05:00 - 08:59
const MORNING_START_HOUR: u32 = 5;
const MORNING_END_HOUR: u32 = 9;

fn is_night_hour(hour: u32) -> bool {
    hour >= NIGHT_START_HOUR || hour < NIGHT_END_HOUR
}

fn is_morning_hour(hour: u32) -> bool {
    (MORNING_START_HOUR..MORNING_END_HOUR).contains(&hour)
}

/// Ledger reference for a habit check-in
fn habit_reference(habit_id: &str, date: NaiveDate) -> String {
    format!("{habit_id}:{}", day_bucket(date))
}

fn validate_user(user_id: &str) -> Result<()> {
    if user_id.trim().is_empty() {
        return Err(ProgressError::invalid("user id must not be empty"));
    }
    Ok(())
}

/// Pipeline stage of a completion event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Received,
    AwardComputed,
    StatsUpdated,
    AchievementsEvaluated,
    ChallengeUpdated,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::AwardComputed => "award_computed",
            Self::StatsUpdated => "stats_updated",
            Self::AchievementsEvaluated => "achievements_evaluated",
            Self::ChallengeUpdated => "challenge_updated",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine behaviour knobs (the `[settings.progression]` and
/// `[settings.challenge]` config sections)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Append each unlocked achievement's `xp_reward` to the ledger
    pub grant_achievement_xp: bool,
    pub challenge: ChallengeSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            grant_achievement_xp: true,
            challenge: ChallengeSettings::default(),
        }
    }
}

/// Something the user finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionEvent {
    Task {
        task_id: String,
        priority: Priority,
        /// Replaces the priority's base XP when positive
        xp_override: Option<i64>,
        completed_at: DateTime<Utc>,
        /// Life area the task belongs to (Task Explorer)
        area: Option<String>,
        bonuses: AwardBonuses,
    },
    Habit {
        habit_id: String,
        date: NaiveDate,
        /// Replaces the habit's own XP reward when positive
        xp_override: Option<i64>,
        bonuses: AwardBonuses,
    },
}

impl CompletionEvent {
    /// Task completed now, no area, no bonuses
    pub fn task(task_id: impl Into<String>, priority: Priority) -> Self {
        Self::Task {
            task_id: task_id.into(),
            priority,
            xp_override: None,
            completed_at: Utc::now(),
            area: None,
            bonuses: AwardBonuses::default(),
        }
    }

    /// Habit check-in for `date`; the streak bonus follows the habit's streak
    pub fn habit(habit_id: impl Into<String>, date: NaiveDate) -> Self {
        Self::Habit {
            habit_id: habit_id.into(),
            date,
            xp_override: None,
            bonuses: AwardBonuses::default(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Task { .. } => "task",
            Self::Habit { .. } => "habit",
        }
    }

    /// Calendar day the event counts toward
    pub fn day(&self) -> NaiveDate {
        match self {
            Self::Task { completed_at, .. } => completed_at.date_naive(),
            Self::Habit { date, .. } => *date,
        }
    }
}

/// An achievement that was just unlocked
#[derive(Debug, Clone, Serialize)]
pub struct UnlockedAchievement {
    pub achievement: &'static Achievement,
    pub unlocked_at: DateTime<Utc>,
    /// XP credited for the unlock (0 when achievement XP is disabled)
    pub xp_granted: i64,
}

/// Daily challenge state after a stage run
#[derive(Debug, Clone, Serialize)]
pub struct ChallengeUpdate {
    pub challenge: DailyChallenge,
    pub progress: UserChallengeProgress,
    /// This run credited the challenge's coins and XP
    pub newly_completed: bool,
}

/// Everything that happened while processing one completion event
#[derive(Debug, Clone, Serialize)]
pub struct CompletionOutcome {
    /// The completion's ledger entry; `None` for a duplicate habit check-in
    pub entry: Option<LedgerEntry>,
    /// Freshly computed award; `None` when the entry already existed
    pub award: Option<XpAward>,
    /// The completion had already been awarded; only downstream stages ran
    pub replayed: bool,
    pub streak: Option<StreakResult>,
    /// Total XP right after the completion's own entry
    pub total_xp_after_award: i64,
    /// Total XP after achievement and challenge rewards
    pub total_xp: i64,
    /// Level change caused by the completion's own XP
    pub level_up: Option<LevelUp>,
    /// Further levels reached through achievement and challenge XP
    pub bonus_level_up: Option<LevelUp>,
    pub unlocked_achievements: Vec<UnlockedAchievement>,
    pub challenge: Option<ChallengeUpdate>,
    pub challenge_completed: bool,
}

/// Events that can happen while processing a completion
#[derive(Debug, Clone, Serialize)]
pub enum ProgressionEvent {
    XpAwarded { amount: i64, reason: XpReason },
    StreakExtended { habit_id: String, count: u32 },
    LevelUp(LevelUp),
    AchievementUnlocked { id: AchievementId, title: &'static str, xp: i64 },
    ChallengeCompleted { challenge_id: String, coins: i64, xp: i64 },
}

impl CompletionOutcome {
    /// Flatten the outcome into user-facing events
    pub fn events(&self) -> Vec<ProgressionEvent> {
        let mut events = Vec::new();

        if let Some(entry) = self.entry.as_ref().filter(|_| !self.replayed) {
            events.push(ProgressionEvent::XpAwarded {
                amount: entry.amount,
                reason: entry.reason,
            });
        }

        if let Some(streak) = &self.streak {
            if streak.change == StreakChange::Extended {
                events.push(ProgressionEvent::StreakExtended {
                    habit_id: streak.habit.id.clone(),
                    count: streak.habit.current_streak,
                });
            }
        }

        for level_up in [self.level_up, self.bonus_level_up].into_iter().flatten() {
            events.push(ProgressionEvent::LevelUp(level_up));
        }

        for unlocked in &self.unlocked_achievements {
            events.push(ProgressionEvent::AchievementUnlocked {
                id: unlocked.achievement.id,
                title: unlocked.achievement.title,
                xp: unlocked.xp_granted,
            });
        }

        if let (true, Some(update)) = (self.challenge_completed, &self.challenge) {
            events.push(ProgressionEvent::ChallengeCompleted {
                challenge_id: update.challenge.id.clone(),
                coins: update.challenge.coin_reward,
                xp: update.challenge.xp_reward,
            });
        }

        events
    }
}

/// Result of a direct counter adjustment
#[derive(Debug, Clone, Serialize)]
pub struct CounterUpdate {
    pub progress: UserProgress,
    pub unlocked: Vec<UnlockedAchievement>,
}

/// Output of the award stage
struct Awarded {
    entry: Option<LedgerEntry>,
    award: Option<XpAward>,
    replayed: bool,
    streak: Option<StreakResult>,
}

/// Per-user serialization. Different users never contend.
#[derive(Default)]
struct UserLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl UserLocks {
    fn for_user(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(user_id.to_string()).or_default().clone()
    }
}

/// Main engine for all progression features
pub struct ProgressionEngine<S: ProgressStore> {
    store: S,
    settings: EngineSettings,
    locks: UserLocks,
}

impl<S: ProgressStore> ProgressionEngine<S> {
    pub fn new(store: S, settings: EngineSettings) -> Self {
        Self {
            store,
            settings,
            locks: UserLocks::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    fn stage(user_id: &str, stage: Stage) {
        debug!(user_id = %user_id, stage = %stage, "Progression stage");
    }

    // ========================================
    // XP & LEVEL OPERATIONS
    // ========================================

    /// Append XP to the ledger.
    ///
    /// A repeated `(reason, reference_id)` returns the original entry instead of
    /// writing a second one. The snapshot catches up on the next event or
    /// [`reconcile`](Self::reconcile).
    pub fn award_xp(
        &self,
        user_id: &str,
        amount: i64,
        reason: XpReason,
        reference_id: Option<&str>,
    ) -> Result<LedgerEntry> {
        validate_user(user_id)?;
        if amount <= 0 {
            return Err(ProgressError::invalid(format!(
                "XP amount must be positive, got {amount}"
            )));
        }

        let lock = self.locks.for_user(user_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let entry = NewLedgerEntry::new(
            user_id,
            amount,
            reason,
            reference_id.map(str::to_string),
            Utc::now(),
        );
        let (stored, created) = self.store.append_ledger(&entry)?;
        if created {
            info!(user_id = %user_id, amount, reason = reason.as_str(), "XP awarded");
        } else {
            debug!(user_id = %user_id, entry_id = stored.id, "XP already awarded for reference");
        }
        Ok(stored)
    }

    /// Level summary straight from the ledger
    pub fn level_progress(&self, user_id: &str) -> Result<LevelProgress> {
        validate_user(user_id)?;
        Ok(LevelProgress::new(self.store.ledger_total(user_id)?))
    }

    /// Recompute `total_xp` and `current_level` from the ledger
    pub fn reconcile(&self, user_id: &str) -> Result<UserProgress> {
        validate_user(user_id)?;
        let lock = self.locks.for_user(user_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut progress = self.store.load_progress(user_id)?;
        let ledger_total = self.store.ledger_total(user_id)?;
        if progress.total_xp != ledger_total {
            warn!(
                user_id = %user_id,
                stored = progress.total_xp,
                ledger = ledger_total,
                "Snapshot out of sync with ledger, recomputing"
            );
        }
        progress.set_total_xp(ledger_total);
        self.store.save_progress(&progress, None)
    }

    /// Load the snapshot with its total refreshed from the ledger
    pub fn progress(&self, user_id: &str) -> Result<UserProgress> {
        validate_user(user_id)?;
        let mut progress = self.store.load_progress(user_id)?;
        progress.set_total_xp(self.store.ledger_total(user_id)?);
        Ok(progress)
    }

    fn sync_total(&self, user_id: &str) -> Result<UserProgress> {
        let mut progress = self.store.load_progress(user_id)?;
        progress.set_total_xp(self.store.ledger_total(user_id)?);
        self.store.save_progress(&progress, None)
    }

    // ========================================
    // HABIT OPERATIONS
    // ========================================

    /// Create a habit; `xp_reward` defaults to the frequency's base XP
    pub fn create_habit(
        &self,
        user_id: &str,
        name: &str,
        frequency: Frequency,
        xp_reward: Option<i64>,
    ) -> Result<(Habit, Vec<UnlockedAchievement>)> {
        validate_user(user_id)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ProgressError::invalid("habit name must not be empty"));
        }
        if let Some(xp) = xp_reward.filter(|xp| *xp <= 0) {
            return Err(ProgressError::invalid(format!(
                "habit XP reward must be positive, got {xp}"
            )));
        }

        let lock = self.locks.for_user(user_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let xp = xp_reward.unwrap_or_else(|| base_for_habit(frequency, None));
        let habit = Habit::new(&Uuid::new_v4().to_string(), user_id, name, frequency, xp);
        self.store.insert_habit(&habit)?;

        let active = self.store.list_habits(user_id)?.len() as u64;
        let mut progress = self.store.load_progress(user_id)?;
        progress.counters.adjust(CounterKind::HabitsCreated, 1);
        progress.counters.concurrent_habits = progress.counters.concurrent_habits.max(active);
        self.store.save_progress(&progress, None)?;

        info!(user_id = %user_id, habit_id = %habit.id, name, "Habit created");
        let unlocked = self.unlock_achievements(user_id, Utc::now().date_naive())?;
        Ok((habit, unlocked))
    }

    /// Record a check-in without awarding XP.
    ///
    /// Use [`process_completion_event`](Self::process_completion_event) for the
    /// full pipeline; a date checked in here is a duplicate there.
    pub fn check_in_habit(&self, habit_id: &str, date: NaiveDate) -> Result<StreakResult> {
        let owner = self.store.load_habit(habit_id)?.user_id;
        let lock = self.locks.for_user(&owner);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let habit = self.store.load_habit(habit_id)?;
        if self.store.has_completion(habit_id, date)? {
            return Ok(StreakResult::duplicate(habit));
        }
        self.commit_check_in(&habit, date)
    }

    fn commit_check_in(&self, habit: &Habit, date: NaiveDate) -> Result<StreakResult> {
        let (updated, change) = apply_check_in(habit, date);
        if self.store.commit_check_in(&updated, date)? {
            debug!(
                habit_id = %habit.id,
                streak = updated.current_streak,
                change = ?change,
                "Habit checked in"
            );
            Ok(StreakResult {
                habit: updated,
                log_created: true,
                change,
            })
        } else {
            Ok(StreakResult::duplicate(self.store.load_habit(&habit.id)?))
        }
    }

    // ========================================
    // COUNTERS
    // ========================================

    /// Adjust a counter owned by the surrounding app (goals, friends, rewards)
    pub fn record_counter(
        &self,
        user_id: &str,
        kind: CounterKind,
        delta: i64,
    ) -> Result<CounterUpdate> {
        validate_user(user_id)?;
        let lock = self.locks.for_user(user_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut progress = self.store.load_progress(user_id)?;
        progress.counters.adjust(kind, delta);
        self.store.save_progress(&progress, None)?;
        debug!(user_id = %user_id, kind = ?kind, delta, "Counter adjusted");

        let unlocked = self.unlock_achievements(user_id, Utc::now().date_naive())?;
        Ok(CounterUpdate {
            progress: self.store.load_progress(user_id)?,
            unlocked,
        })
    }

    // ========================================
    // ACHIEVEMENT OPERATIONS
    // ========================================

    fn held_achievements(&self, user_id: &str) -> Result<HashSet<AchievementId>> {
        Ok(self
            .store
            .unlocked_achievements(user_id)?
            .iter()
            .filter_map(|u| AchievementId::from_str(&u.achievement_id))
            .collect())
    }

    /// Evaluate the catalog and persist any new unlocks.
    ///
    /// `newly_unlocked` lists only the achievements this call unlocked.
    pub fn evaluate_achievements(&self, user_id: &str) -> Result<Evaluation> {
        validate_user(user_id)?;
        let lock = self.locks.for_user(user_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let unlocked = self.unlock_achievements(user_id, Utc::now().date_naive())?;
        let progress = self.store.load_progress(user_id)?;
        let mut evaluation = evaluate(&progress, &self.held_achievements(user_id)?);
        evaluation.newly_unlocked = unlocked.iter().map(|u| u.achievement.id).collect();
        Ok(evaluation)
    }

    /// Unlock everything the stored snapshot qualifies for. Achievement XP
    /// counts toward `day`.
    ///
    /// Achievement XP can raise the level or total enough to qualify for
    /// more, so evaluation repeats until nothing new is granted.
    fn unlock_achievements(&self, user_id: &str, day: NaiveDate) -> Result<Vec<UnlockedAchievement>> {
        let mut unlocked_now = Vec::new();

        for _ in 0..ACHIEVEMENTS.len() {
            let progress = self.store.load_progress(user_id)?;
            let evaluation = evaluate(&progress, &self.held_achievements(user_id)?);
            if evaluation.newly_unlocked.is_empty() {
                break;
            }

            let mut xp_changed = false;
            for id in evaluation.newly_unlocked {
                let Some(achievement) = Achievement::get(id) else {
                    continue;
                };
                let now = Utc::now();

                // XP first: a crash between the two writes is repaired on the
                // next run, which re-finds the entry and inserts the unlock
                let mut xp_granted = 0;
                if self.settings.grant_achievement_xp && achievement.xp_reward > 0 {
                    let entry = NewLedgerEntry::new(
                        user_id,
                        achievement.xp_reward,
                        XpReason::Achievement,
                        Some(id.as_str().to_string()),
                        now,
                    )
                    .on_day(day);
                    let (_, created) = self.store.append_ledger(&entry)?;
                    xp_changed |= created;
                    xp_granted = achievement.xp_reward;
                }

                let unlock = AchievementUnlock {
                    user_id: user_id.to_string(),
                    achievement_id: id.as_str().to_string(),
                    unlocked_at: now,
                };
                if self.store.insert_unlock(&unlock)? {
                    info!(
                        user_id = %user_id,
                        achievement = id.as_str(),
                        xp = xp_granted,
                        "Achievement unlocked"
                    );
                    unlocked_now.push(UnlockedAchievement {
                        achievement,
                        unlocked_at: now,
                        xp_granted,
                    });
                }
            }

            if !xp_changed {
                break;
            }
            self.sync_total(user_id)?;
        }

        Ok(unlocked_now)
    }

    // ========================================
    // DAILY CHALLENGE OPERATIONS
    // ========================================

    /// Get or create the challenge for `date`, scaled to `level` on creation
    pub fn ensure_daily_challenge(&self, date: NaiveDate, level: u32) -> Result<DailyChallenge> {
        let challenge = DailyChallenge::for_date(date, level, &self.settings.challenge);
        self.store.ensure_challenge(&challenge)
    }

    /// Re-tally a challenge from the user's ledger for its date
    pub fn update_challenge_progress(
        &self,
        user_id: &str,
        challenge_id: &str,
    ) -> Result<UserChallengeProgress> {
        validate_user(user_id)?;
        let lock = self.locks.for_user(user_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let challenge = self.store.load_challenge(challenge_id)?;
        let day = challenge.challenge_date;
        let update = self.apply_challenge(user_id, challenge)?;
        if update.newly_completed {
            self.unlock_achievements(user_id, day)?;
        }
        Ok(update.progress)
    }

    fn apply_challenge(&self, user_id: &str, challenge: DailyChallenge) -> Result<ChallengeUpdate> {
        let entries = self.store.ledger_for_day(user_id, challenge.challenge_date)?;

        let mut tasks = 0u32;
        let mut habits = 0u32;
        let mut xp = 0i64;
        for entry in &entries {
            match entry.reason {
                XpReason::TaskComplete => tasks += 1,
                XpReason::HabitComplete => habits += 1,
                _ => {}
            }
            // The challenge's own reward never counts toward itself
            if entry.reason != XpReason::Challenge {
                xp += entry.amount;
            }
        }

        let tally = compute_progress(&challenge, tasks, habits, xp);
        let previous = self
            .store
            .load_challenge_progress(user_id, &challenge.id)?
            .unwrap_or_else(|| UserChallengeProgress::new(user_id, &challenge.id));
        let (progress, flipped) = apply_tally(&previous, &tally, Utc::now());
        self.store.save_challenge_progress(&progress)?;
        if flipped {
            debug!(user_id = %user_id, challenge_id = %challenge.id, "Challenge targets met");
        }

        // A completed challenge whose reward never landed is paid on this run
        let newly_completed = progress.completed && self.grant_challenge_reward(user_id, &challenge)?;
        if newly_completed {
            info!(
                user_id = %user_id,
                challenge_id = %challenge.id,
                coins = challenge.coin_reward,
                xp = challenge.xp_reward,
                "Daily challenge completed"
            );
        }

        Ok(ChallengeUpdate {
            challenge,
            progress,
            newly_completed,
        })
    }

    /// Credit coins and XP once per `(user, challenge)`.
    ///
    /// The XP entry is keyed by the challenge id and the coins ride on the
    /// snapshot save that marks it applied, so a failed save is credited by
    /// the next run instead of being lost. Returns whether this call credited.
    fn grant_challenge_reward(&self, user_id: &str, challenge: &DailyChallenge) -> Result<bool> {
        let entry = NewLedgerEntry::new(
            user_id,
            challenge.xp_reward.max(0),
            XpReason::Challenge,
            Some(challenge.id.clone()),
            Utc::now(),
        )
        .on_day(challenge.challenge_date);
        let (entry, _) = self.store.append_ledger(&entry)?;

        let mut progress = self.store.load_progress(user_id)?;
        if self.store.is_applied(entry.id)? {
            return Ok(false);
        }
        progress.coins += challenge.coin_reward;
        progress.counters.daily_challenges += 1;
        progress.set_total_xp(self.store.ledger_total(user_id)?);
        self.store.save_progress(&progress, Some(entry.id))?;
        Ok(true)
    }

    // ========================================
    // MAIN ENTRY POINT
    // ========================================

    /// Run a completion event through every stage.
    ///
    /// Safe to call again with the same event after any error: the ledger entry
    /// is found by its reference and only the remaining stages do work.
    pub fn process_completion_event(
        &self,
        user_id: &str,
        event: CompletionEvent,
    ) -> Result<CompletionOutcome> {
        validate_user(user_id)?;
        let lock = self.locks.for_user(user_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        Self::stage(user_id, Stage::Received);
        let total_before = self.store.ledger_total(user_id)?;

        let awarded = match &event {
            CompletionEvent::Task {
                task_id,
                priority,
                xp_override,
                completed_at,
                bonuses,
                ..
            } => self.award_task(user_id, task_id, *priority, *xp_override, *completed_at, bonuses)?,
            CompletionEvent::Habit {
                habit_id,
                date,
                xp_override,
                bonuses,
            } => self.award_habit(user_id, habit_id, *date, *xp_override, bonuses)?,
        };

        let Some(entry) = awarded.entry else {
            Self::stage(user_id, Stage::Done);
            return Ok(CompletionOutcome {
                entry: None,
                award: None,
                replayed: false,
                streak: awarded.streak,
                total_xp_after_award: total_before,
                total_xp: total_before,
                level_up: None,
                bonus_level_up: None,
                unlocked_achievements: Vec::new(),
                challenge: None,
                challenge_completed: false,
            });
        };
        Self::stage(user_id, Stage::AwardComputed);
        let total_xp_after_award = self.store.ledger_total(user_id)?;

        let progress = self.update_stats(user_id, &entry, &event, awarded.streak.as_ref())?;
        Self::stage(user_id, Stage::StatsUpdated);

        let day = event.day();
        let mut unlocked = self.unlock_achievements(user_id, day)?;
        Self::stage(user_id, Stage::AchievementsEvaluated);

        let challenge = self.ensure_daily_challenge(day, progress.current_level)?;
        let update = self.apply_challenge(user_id, challenge)?;
        if update.newly_completed {
            unlocked.extend(self.unlock_achievements(user_id, day)?);
        }
        Self::stage(user_id, Stage::ChallengeUpdated);

        let total_xp = self.store.ledger_total(user_id)?;
        let level_up = detect_level_up(total_before, total_xp_after_award);
        let bonus_level_up = detect_level_up(total_xp_after_award, total_xp);
        for lu in [level_up, bonus_level_up].into_iter().flatten() {
            info!(user_id = %user_id, from = lu.from, to = lu.to, "Level up");
        }
        Self::stage(user_id, Stage::Done);

        Ok(CompletionOutcome {
            entry: Some(entry),
            award: awarded.award,
            replayed: awarded.replayed,
            streak: awarded.streak,
            total_xp_after_award,
            total_xp,
            level_up,
            bonus_level_up,
            unlocked_achievements: unlocked,
            challenge_completed: update.newly_completed,
            challenge: Some(update),
        })
    }

    fn award_task(
        &self,
        user_id: &str,
        task_id: &str,
        priority: Priority,
        xp_override: Option<i64>,
        completed_at: DateTime<Utc>,
        bonuses: &AwardBonuses,
    ) -> Result<Awarded> {
        if task_id.trim().is_empty() {
            return Err(ProgressError::invalid("task id must not be empty"));
        }

        if let Some(entry) = self
            .store
            .find_ledger_entry(user_id, XpReason::TaskComplete, task_id)?
        {
            debug!(user_id = %user_id, task_id, entry_id = entry.id, "Replaying task completion");
            return Ok(Awarded {
                entry: Some(entry),
                award: None,
                replayed: true,
                streak: None,
            });
        }

        let award = compute_award(base_for_task(priority, xp_override), bonuses)?;
        let new_entry = NewLedgerEntry::new(
            user_id,
            award.total(),
            XpReason::TaskComplete,
            Some(task_id.to_string()),
            completed_at,
        );
        let (entry, created) = self.store.append_ledger(&new_entry)?;
        info!(user_id = %user_id, task_id, xp = award.total(), "Task XP awarded");

        Ok(Awarded {
            entry: Some(entry),
            award: Some(award),
            replayed: !created,
            streak: None,
        })
    }

    fn award_habit(
        &self,
        user_id: &str,
        habit_id: &str,
        date: NaiveDate,
        xp_override: Option<i64>,
        bonuses: &AwardBonuses,
    ) -> Result<Awarded> {
        let habit = self.store.load_habit(habit_id)?;
        if habit.user_id != user_id {
            return Err(ProgressError::not_found("habit", habit_id));
        }
        let reference = habit_reference(habit_id, date);

        if let Some(entry) = self
            .store
            .find_ledger_entry(user_id, XpReason::HabitComplete, &reference)?
        {
            debug!(user_id = %user_id, habit_id, entry_id = entry.id, "Replaying habit check-in");
            // XP landed but the log may not have
            let streak = if self.store.has_completion(habit_id, date)? {
                StreakResult::duplicate(habit)
            } else {
                self.commit_check_in(&habit, date)?
            };
            return Ok(Awarded {
                entry: Some(entry),
                award: None,
                replayed: true,
                streak: Some(streak),
            });
        }

        if self.store.has_completion(habit_id, date)? {
            debug!(user_id = %user_id, habit_id, %date, "Habit already checked in");
            return Ok(Awarded {
                entry: None,
                award: None,
                replayed: false,
                streak: Some(StreakResult::duplicate(habit)),
            });
        }

        let (updated, change) = apply_check_in(&habit, date);
        let mut bonuses = *bonuses;
        if bonuses.streak_days.is_none() && change != StreakChange::Backfilled {
            bonuses.streak_days = Some(updated.current_streak);
        }
        let base = base_for_habit(habit.frequency, xp_override.or(Some(habit.xp_reward)));
        let award = compute_award(base, &bonuses)?;

        let new_entry = NewLedgerEntry::new(
            user_id,
            award.total(),
            XpReason::HabitComplete,
            Some(reference),
            Utc::now(),
        )
        .on_day(date);
        let (entry, created) = self.store.append_ledger(&new_entry)?;
        info!(user_id = %user_id, habit_id, xp = award.total(), "Habit XP awarded");

        let streak = self.commit_check_in(&habit, date)?;
        Ok(Awarded {
            entry: Some(entry),
            award: Some(award),
            replayed: !created,
            streak: Some(streak),
        })
    }

    /// Project the completion onto the snapshot.
    ///
    /// Counter increments apply once per ledger entry: the save that carries
    /// them marks the entry applied. Totals are always recomputed from the
    /// ledger.
    fn update_stats(
        &self,
        user_id: &str,
        entry: &LedgerEntry,
        event: &CompletionEvent,
        streak: Option<&StreakResult>,
    ) -> Result<UserProgress> {
        let mut progress = self.store.load_progress(user_id)?;
        // Checked after the load: an apply racing in between bumps the version
        let first_application = !self.store.is_applied(entry.id)?;

        match event {
            CompletionEvent::Task {
                priority,
                completed_at,
                area,
                ..
            } => {
                if first_application {
                    progress.total_tasks_completed += 1;
                    if *priority == Priority::High {
                        progress.counters.high_priority_tasks += 1;
                    }
                    let hour = completed_at.hour();
                    if is_night_hour(hour) {
                        progress.counters.night_tasks += 1;
                    }
                    if is_morning_hour(hour) {
                        progress.counters.morning_tasks += 1;
                    }
                    let (last, run) = advance_daily_run(
                        progress.last_task_date,
                        entry.day,
                        progress.counters.active_days,
                    );
                    progress.last_task_date = last;
                    progress.counters.active_days = run;
                }
                if let Some(area) = area.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
                    progress.counters.areas_count = self.store.record_area(user_id, area)?;
                }
            }
            CompletionEvent::Habit { .. } => {
                if first_application {
                    let (last, run) = advance_daily_run(
                        progress.last_habit_date,
                        entry.day,
                        progress.counters.habit_streak,
                    );
                    progress.last_habit_date = last;
                    progress.counters.habit_streak = run;
                }
                if let Some(streak) = streak {
                    progress.longest_habit_streak = progress
                        .longest_habit_streak
                        .max(u64::from(streak.habit.longest_streak));
                }
            }
        }

        progress.set_total_xp(self.store.ledger_total(user_id)?);
        self.store.save_progress(&progress, first_application.then_some(entry.id))
    }
}
