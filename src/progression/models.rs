//! Progression records: ledger entries, user snapshots, habits and challenges

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::levels::level_for;

/// Why a ledger entry was written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum XpReason {
    TaskComplete,
    HabitComplete,
    Achievement,
    DailyBonus,
    Challenge,
    GoalComplete,
}

impl XpReason {
    /// Get the string ID for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskComplete => "task_complete",
            Self::HabitComplete => "habit_complete",
            Self::Achievement => "achievement",
            Self::DailyBonus => "daily_bonus",
            Self::Challenge => "challenge",
            Self::GoalComplete => "goal_complete",
        }
    }

    /// Parse from database string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "task_complete" => Some(Self::TaskComplete),
            "habit_complete" => Some(Self::HabitComplete),
            "achievement" => Some(Self::Achievement),
            "daily_bonus" => Some(Self::DailyBonus),
            "challenge" => Some(Self::Challenge),
            "goal_complete" => Some(Self::GoalComplete),
            _ => None,
        }
    }
}

/// Append-only XP ledger row. The sum of a user's entries is their total XP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    /// Monotonic sequence number assigned by the store
    pub id: i64,
    pub user_id: String,
    pub amount: i64,
    pub reason: XpReason,
    pub reference_id: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Calendar day the XP counts toward (daily challenge tallies)
    pub day: NaiveDate,
}

/// Ledger entry before the store assigns its id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLedgerEntry {
    pub user_id: String,
    pub amount: i64,
    pub reason: XpReason,
    pub reference_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub day: NaiveDate,
}

impl NewLedgerEntry {
    /// Entry dated on the UTC day of `created_at`
    pub fn new(
        user_id: &str,
        amount: i64,
        reason: XpReason,
        reference_id: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            amount,
            reason,
            reference_id,
            created_at,
            day: created_at.date_naive(),
        }
    }

    /// Count the XP toward a different calendar day
    pub fn on_day(mut self, day: NaiveDate) -> Self {
        self.day = day;
        self
    }
}

/// Counters fed by the surrounding app (goals, friends, rewards) and by events
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressCounters {
    pub habits_created: u64,
    pub goals_created: u64,
    pub goals_completed: u64,
    /// Consecutive days with at least one completed task
    pub active_days: u64,
    pub night_tasks: u64,
    pub morning_tasks: u64,
    pub areas_count: u64,
    pub high_priority_tasks: u64,
    pub concurrent_habits: u64,
    /// Consecutive days with at least one habit check-in
    pub habit_streak: u64,
    pub daily_challenges: u64,
    pub early_adopter: bool,
    pub friends_count: u64,
    pub rewards_redeemed: u64,
}

/// Counters that can be adjusted directly by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterKind {
    HabitsCreated,
    GoalsCreated,
    GoalsCompleted,
    ConcurrentHabits,
    Friends,
    RewardsRedeemed,
    /// Flag: any positive delta sets it, any other clears it
    EarlyAdopter,
}

impl CounterKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "habits_created" => Some(Self::HabitsCreated),
            "goals_created" => Some(Self::GoalsCreated),
            "goals_completed" => Some(Self::GoalsCompleted),
            "concurrent_habits" => Some(Self::ConcurrentHabits),
            "friends" => Some(Self::Friends),
            "rewards_redeemed" => Some(Self::RewardsRedeemed),
            "early_adopter" => Some(Self::EarlyAdopter),
            _ => None,
        }
    }
}

impl ProgressCounters {
    /// Apply a signed delta, saturating at zero
    pub fn adjust(&mut self, kind: CounterKind, delta: i64) {
        let slot = match kind {
            CounterKind::HabitsCreated => &mut self.habits_created,
            CounterKind::GoalsCreated => &mut self.goals_created,
            CounterKind::GoalsCompleted => &mut self.goals_completed,
            CounterKind::ConcurrentHabits => &mut self.concurrent_habits,
            CounterKind::Friends => &mut self.friends_count,
            CounterKind::RewardsRedeemed => &mut self.rewards_redeemed,
            CounterKind::EarlyAdopter => {
                self.early_adopter = delta > 0;
                return;
            }
        };
        *slot = slot.saturating_add_signed(delta);
    }
}

/// Derived per-user aggregate. `current_level` always equals `level_for(total_xp)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserProgress {
    pub user_id: String,
    pub total_xp: i64,
    pub current_level: u32,
    pub coins: i64,
    pub longest_habit_streak: u64,
    pub total_tasks_completed: u64,
    pub counters: ProgressCounters,
    pub last_task_date: Option<NaiveDate>,
    pub last_habit_date: Option<NaiveDate>,
    /// Optimistic concurrency token (0 = never stored)
    pub version: u64,
}

impl UserProgress {
    /// Fresh snapshot for a user with no history
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            total_xp: 0,
            current_level: 1,
            coins: 0,
            longest_habit_streak: 0,
            total_tasks_completed: 0,
            counters: ProgressCounters::default(),
            last_task_date: None,
            last_habit_date: None,
            version: 0,
        }
    }

    /// Set total XP from the ledger and recompute the level
    pub fn set_total_xp(&mut self, total_xp: i64) {
        self.total_xp = total_xp.max(0);
        self.current_level = level_for(self.total_xp);
    }
}

/// How often a habit is expected to be completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "monthly" => Some(Self::Monthly),
            _ => None,
        }
    }
}

/// A recurring habit with its streak counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Habit {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub frequency: Frequency,
    pub xp_reward: i64,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_completed_date: Option<NaiveDate>,
}

impl Habit {
    pub fn new(id: &str, user_id: &str, name: &str, frequency: Frequency, xp_reward: i64) -> Self {
        Self {
            id: id.to_string(),
            user_id: user_id.to_string(),
            name: name.to_string(),
            frequency,
            xp_reward,
            current_streak: 0,
            longest_streak: 0,
            last_completed_date: None,
        }
    }
}

/// An unlocked achievement for a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AchievementUnlock {
    pub user_id: String,
    pub achievement_id: String,
    pub unlocked_at: DateTime<Utc>,
}

/// The composite goal for one calendar date
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyChallenge {
    pub id: String,
    pub challenge_date: NaiveDate,
    pub task_target: u32,
    pub habit_target: u32,
    pub xp_target: i64,
    pub coin_reward: i64,
    pub xp_reward: i64,
}

/// A user's standing against one daily challenge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserChallengeProgress {
    pub user_id: String,
    pub challenge_id: String,
    pub tasks_completed: u32,
    pub habits_completed: u32,
    pub xp_earned: i64,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}
