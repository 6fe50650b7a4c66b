//! Achievement checking logic
//!
//! Evaluation is a pure function of a user's snapshot and the set of ids they
//! already hold, so it can be re-run at any time without side effects.

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::Serialize;

use super::definitions::{ACHIEVEMENTS, Achievement, AchievementId, Rarity};
use super::models::UserProgress;

/// How many locked achievements `next_achievements` returns
const NEXT_ACHIEVEMENT_COUNT: usize = 3;

/// Progress toward one achievement
#[derive(Debug, Clone, Serialize)]
pub struct AchievementProgress {
    pub achievement: &'static Achievement,
    pub current_value: u64,
    /// 0 - 100
    pub percentage: u8,
    pub unlocked: bool,
    pub rarity: Rarity,
}

/// Result of checking a snapshot against the catalog
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    /// Achievements whose requirement is met but which were not yet held
    pub newly_unlocked: Vec<AchievementId>,
    /// One entry per catalog achievement, in display order
    pub progress: Vec<AchievementProgress>,
}

/// `min(100, round(current / requirement * 100))`
pub fn progress_percentage(current: u64, requirement: u64) -> u8 {
    if requirement == 0 {
        return 100;
    }
    let pct = (current as f64 / requirement as f64 * 100.0).round();
    pct.min(100.0) as u8
}

/// Check every achievement against the snapshot
pub fn evaluate(progress: &UserProgress, unlocked: &HashSet<AchievementId>) -> Evaluation {
    let mut newly_unlocked = Vec::new();
    let mut entries = Vec::with_capacity(ACHIEVEMENTS.len());

    for achievement in ACHIEVEMENTS {
        let current_value = achievement.requirement_type.current_value(progress);
        let already = unlocked.contains(&achievement.id);
        let met = current_value >= achievement.requirement_value;

        if met && !already {
            newly_unlocked.push(achievement.id);
        }

        entries.push(AchievementProgress {
            achievement,
            current_value,
            percentage: progress_percentage(current_value, achievement.requirement_value),
            unlocked: already || met,
            rarity: achievement.rarity(),
        });
    }

    sort_by_progress(&mut entries);

    Evaluation {
        newly_unlocked,
        progress: entries,
    }
}

/// Locked first (closest to done first, then cheapest requirement), unlocked last
pub fn sort_by_progress(entries: &mut [AchievementProgress]) {
    entries.sort_by(|a, b| match (a.unlocked, b.unlocked) {
        (false, true) => Ordering::Less,
        (true, false) => Ordering::Greater,
        _ => b.percentage.cmp(&a.percentage).then_with(|| {
            a.achievement
                .requirement_value
                .cmp(&b.achievement.requirement_value)
        }),
    });
}

impl Evaluation {
    /// The locked achievements closest to unlocking
    pub fn next_achievements(&self) -> Vec<&AchievementProgress> {
        self.progress
            .iter()
            .filter(|p| !p.unlocked)
            .take(NEXT_ACHIEVEMENT_COUNT)
            .collect()
    }

    pub fn summary(&self) -> AchievementSummary {
        AchievementSummary::from_progress(&self.progress)
    }
}

/// Catalog-wide totals for a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AchievementSummary {
    pub total: usize,
    pub unlocked: usize,
    /// 0 - 100
    pub percentage: u8,
    /// XP from the rewards of unlocked achievements
    pub xp_earned: i64,
}

impl AchievementSummary {
    pub fn from_progress(progress: &[AchievementProgress]) -> Self {
        let total = progress.len();
        let unlocked: Vec<_> = progress.iter().filter(|p| p.unlocked).collect();

        Self {
            total,
            unlocked: unlocked.len(),
            percentage: progress_percentage(unlocked.len() as u64, total as u64),
            xp_earned: unlocked.iter().map(|p| p.achievement.xp_reward).sum(),
        }
    }
}
