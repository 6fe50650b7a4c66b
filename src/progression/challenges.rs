//! Daily challenge system
//!
//! One challenge exists per calendar date. A user completes it by reaching the
//! task, habit and XP targets on that day; completion never reverts.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::models::{DailyChallenge, UserChallengeProgress};

/// Base XP target at level 1
const BASE_XP_TARGET: f64 = 50.0;
/// Target grows 10% per level
const XP_TARGET_STEP: f64 = 0.1;
/// Target stops growing at 3x the base
const XP_TARGET_MAX_MULTIPLIER: f64 = 3.0;

/// XP a user of `level` must earn in a day to satisfy the challenge
pub fn daily_xp_target(level: u32) -> i64 {
    let steps = f64::from(level.max(1) - 1);
    let multiplier = (1.0 + steps * XP_TARGET_STEP).min(XP_TARGET_MAX_MULTIPLIER);
    (BASE_XP_TARGET * multiplier).round() as i64
}

/// Targets and rewards used when generating a day's challenge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChallengeSettings {
    pub task_target: u32,
    pub habit_target: u32,
    pub coin_reward: i64,
    pub xp_reward: i64,
}

impl Default for ChallengeSettings {
    fn default() -> Self {
        Self {
            task_target: 3,
            habit_target: 2,
            coin_reward: 25,
            xp_reward: 75,
        }
    }
}

impl DailyChallenge {
    /// Stable id for a date, so regenerating a day's challenge is a no-op
    pub fn id_for(date: NaiveDate) -> String {
        format!("daily-{}", date.format("%Y-%m-%d"))
    }

    /// Build the challenge for `date`, scaled to `level`
    pub fn for_date(date: NaiveDate, level: u32, settings: &ChallengeSettings) -> Self {
        Self {
            id: Self::id_for(date),
            challenge_date: date,
            task_target: settings.task_target,
            habit_target: settings.habit_target,
            xp_target: daily_xp_target(level),
            coin_reward: settings.coin_reward,
            xp_reward: settings.xp_reward,
        }
    }
}

/// What a user achieved on the challenge's date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChallengeTally {
    pub tasks_completed: u32,
    pub habits_completed: u32,
    pub xp_earned: i64,
    /// All three targets met
    pub completed: bool,
}

/// Compare the day's activity against every target
pub fn compute_progress(
    challenge: &DailyChallenge,
    tasks_today: u32,
    habits_today: u32,
    xp_today: i64,
) -> ChallengeTally {
    ChallengeTally {
        tasks_completed: tasks_today,
        habits_completed: habits_today,
        xp_earned: xp_today,
        completed: tasks_today >= challenge.task_target
            && habits_today >= challenge.habit_target
            && xp_today >= challenge.xp_target,
    }
}

impl UserChallengeProgress {
    /// Empty progress row
    pub fn new(user_id: &str, challenge_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            challenge_id: challenge_id.to_string(),
            tasks_completed: 0,
            habits_completed: 0,
            xp_earned: 0,
            completed: false,
            completed_at: None,
        }
    }

    /// Mean of the three per-target percentages, each capped at 100
    pub fn overall_percentage(&self, challenge: &DailyChallenge) -> u8 {
        fn capped(current: f64, target: f64) -> f64 {
            if target <= 0.0 {
                return 100.0;
            }
            (current / target * 100.0).min(100.0)
        }

        let tasks = capped(self.tasks_completed.into(), challenge.task_target.into());
        let habits = capped(self.habits_completed.into(), challenge.habit_target.into());
        let xp = capped(self.xp_earned.max(0) as f64, challenge.xp_target as f64);
        ((tasks + habits + xp) / 3.0).round() as u8
    }
}

/// Merge a fresh tally into the stored progress.
///
/// Returns the new progress and whether this call flipped it to completed.
pub fn apply_tally(
    previous: &UserChallengeProgress,
    tally: &ChallengeTally,
    now: DateTime<Utc>,
) -> (UserChallengeProgress, bool) {
    let newly_completed = tally.completed && !previous.completed;

    let updated = UserChallengeProgress {
        user_id: previous.user_id.clone(),
        challenge_id: previous.challenge_id.clone(),
        tasks_completed: previous.tasks_completed.max(tally.tasks_completed),
        habits_completed: previous.habits_completed.max(tally.habits_completed),
        xp_earned: previous.xp_earned.max(tally.xp_earned),
        completed: previous.completed || tally.completed,
        completed_at: if newly_completed {
            Some(now)
        } else {
            previous.completed_at
        },
    };

    (updated, newly_completed)
}
