//! Gamification core: XP, levels, streaks, achievements and daily challenges
//!
//! Everything except [`ProgressionEngine`] is pure computation. The engine
//! wires those pieces to a [`ProgressStore`](crate::store::ProgressStore).

mod challenges;
mod checker;
mod definitions;
mod levels;
mod manager;
mod models;
mod rewards;
mod streaks;

pub use challenges::{ChallengeSettings, ChallengeTally, apply_tally, compute_progress, daily_xp_target};
pub use checker::{AchievementProgress, AchievementSummary, Evaluation, evaluate, progress_percentage};
pub use definitions::{ACHIEVEMENTS, Achievement, AchievementId, Rarity, RequirementType};
pub use levels::{
    LEVEL_THRESHOLDS, LevelProgress, level_for, level_title, levels_gained, progress_fraction,
    xp_for_level, xp_within_level,
};
pub use manager::{
    ChallengeUpdate, CompletionEvent, CompletionOutcome, CounterUpdate, EngineSettings,
    ProgressionEngine, ProgressionEvent, Stage, UnlockedAchievement,
};
pub use models::{
    AchievementUnlock, CounterKind, DailyChallenge, Frequency, Habit, LedgerEntry, NewLedgerEntry,
    ProgressCounters, UserChallengeProgress, UserProgress, XpReason,
};
pub use rewards::{
    AwardBonuses, LevelUp, Priority, XpAward, XpRewards, base_for_habit, base_for_task,
    compute_award, detect_level_up,
};
pub use streaks::{StreakChange, StreakResult, advance_daily_run, apply_check_in};
