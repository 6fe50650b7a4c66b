//! XP award calculation
//!
//! Base XP comes from the task priority or habit frequency; bonuses stack
//! additively on top, so the order they are applied in never matters.

use serde::{Deserialize, Serialize};

use super::levels::level_for;
use super::models::Frequency;
use crate::error::{ProgressError, Result};

/// Task priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }

    /// Parse a priority label; anything unrecognised counts as Medium
    pub fn from_label(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "high" => Self::High,
            "low" => Self::Low,
            _ => Self::Medium,
        }
    }
}

/// XP rewards for various actions
pub struct XpRewards;

impl XpRewards {
    pub const TASK_HIGH: i64 = 50;
    pub const TASK_MEDIUM: i64 = 30;
    pub const TASK_LOW: i64 = 10;

    pub const HABIT_DAILY: i64 = 20;
    pub const HABIT_WEEKLY: i64 = 15;
    pub const HABIT_MONTHLY: i64 = 10;

    pub const GOAL_COMPLETE: i64 = 200;
    pub const DAILY_BONUS: i64 = 5;
    pub const CHALLENGE_COMPLETE: i64 = 100;
    pub const ACHIEVEMENT_BONUS: i64 = 25;

    pub const HIGH_PRIORITY_BONUS: i64 = 10;
    pub const FIRST_COMPLETION_BONUS: i64 = 15;
    pub const DAILY_STREAK_BONUS: i64 = 5;

    /// Streak bonus by tier: 30+ days = 25, 14+ = 15, 7+ = 10, 3+ = 5
    pub fn streak_bonus(streak_days: u32) -> i64 {
        match streak_days {
            30.. => 25,
            14..=29 => 15,
            7..=13 => 10,
            3..=6 => 5,
            _ => 0,
        }
    }
}

/// Base XP for a task; a positive override wins
pub fn base_for_task(priority: Priority, override_xp: Option<i64>) -> i64 {
    if let Some(xp) = override_xp.filter(|xp| *xp > 0) {
        return xp;
    }
    match priority {
        Priority::High => XpRewards::TASK_HIGH,
        Priority::Medium => XpRewards::TASK_MEDIUM,
        Priority::Low => XpRewards::TASK_LOW,
    }
}

/// Base XP for a habit check-in; a positive override wins
pub fn base_for_habit(frequency: Frequency, override_xp: Option<i64>) -> i64 {
    if let Some(xp) = override_xp.filter(|xp| *xp > 0) {
        return xp;
    }
    match frequency {
        Frequency::Daily => XpRewards::HABIT_DAILY,
        Frequency::Weekly => XpRewards::HABIT_WEEKLY,
        Frequency::Monthly => XpRewards::HABIT_MONTHLY,
    }
}

/// Optional bonuses for a single completion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwardBonuses {
    pub streak_days: Option<u32>,
    pub priority: Option<Priority>,
    #[serde(default)]
    pub first_completion: bool,
    #[serde(default)]
    pub daily_streak: bool,
}

/// Breakdown of an award. `total()` is the amount written to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct XpAward {
    pub base: i64,
    pub streak_bonus: i64,
    pub priority_bonus: i64,
    pub first_completion_bonus: i64,
    pub daily_streak_bonus: i64,
}

impl XpAward {
    pub fn total(&self) -> i64 {
        self.base
            + self.streak_bonus
            + self.priority_bonus
            + self.first_completion_bonus
            + self.daily_streak_bonus
    }

    pub fn bonus_total(&self) -> i64 {
        self.total() - self.base
    }
}

/// Compute the XP for one completion
pub fn compute_award(base: i64, bonuses: &AwardBonuses) -> Result<XpAward> {
    if base <= 0 {
        return Err(ProgressError::invalid(format!(
            "base XP must be positive, got {base}"
        )));
    }

    Ok(XpAward {
        base,
        streak_bonus: bonuses
            .streak_days
            .map(XpRewards::streak_bonus)
            .unwrap_or(0),
        priority_bonus: match bonuses.priority {
            Some(Priority::High) => XpRewards::HIGH_PRIORITY_BONUS,
            _ => 0,
        },
        first_completion_bonus: if bonuses.first_completion {
            XpRewards::FIRST_COMPLETION_BONUS
        } else {
            0
        },
        daily_streak_bonus: if bonuses.daily_streak {
            XpRewards::DAILY_STREAK_BONUS
        } else {
            0
        },
    })
}

/// A level up event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LevelUp {
    pub from: u32,
    pub to: u32,
}

impl LevelUp {
    pub fn levels_gained(&self) -> u32 {
        self.to - self.from
    }
}

/// Level-up between two cumulative totals, if any
pub fn detect_level_up(old_total: i64, new_total: i64) -> Option<LevelUp> {
    let from = level_for(old_total);
    let to = level_for(new_total);
    (to > from).then_some(LevelUp { from, to })
}
