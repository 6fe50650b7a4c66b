//! Achievement definitions and metadata
//!
//! All achievements are defined here with their unlock conditions and rewards.

use serde::Serialize;

use super::models::UserProgress;

/// Unique identifier for each achievement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "&'static str")]
pub enum AchievementId {
    // Tasks
    FirstTask,
    TaskMaster,
    Century,
    PriorityMaster,
    TaskExplorer,
    NightOwl,
    EarlyBird,
    WeeklyWarrior,

    // Habits
    HabitBuilder,
    ConsistencyStreak,
    IronHabit,
    HabitGuru,
    StreakKeeper,

    // Progression
    Level5,
    Level10,
    Level25,
    XpCollector,
    CoinCollector,
    DailyChampion,

    // Goals
    GoalSetter,
    GoalCrusher,

    // Social
    EarlyAdopter,
    SocialButterfly,
    ShopKeeper,
}

impl AchievementId {
    /// Get the string ID for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FirstTask => "first_task",
            Self::TaskMaster => "task_master",
            Self::Century => "century",
            Self::PriorityMaster => "priority_master",
            Self::TaskExplorer => "task_explorer",
            Self::NightOwl => "night_owl",
            Self::EarlyBird => "early_bird",
            Self::WeeklyWarrior => "weekly_warrior",
            Self::HabitBuilder => "habit_builder",
            Self::ConsistencyStreak => "consistency_streak",
            Self::IronHabit => "iron_habit",
            Self::HabitGuru => "habit_guru",
            Self::StreakKeeper => "streak_keeper",
            Self::Level5 => "level_5",
            Self::Level10 => "level_10",
            Self::Level25 => "level_25",
            Self::XpCollector => "xp_collector",
            Self::CoinCollector => "coin_collector",
            Self::DailyChampion => "daily_champion",
            Self::GoalSetter => "goal_setter",
            Self::GoalCrusher => "goal_crusher",
            Self::EarlyAdopter => "early_adopter",
            Self::SocialButterfly => "social_butterfly",
            Self::ShopKeeper => "shop_keeper",
        }
    }

    /// Parse from database string
    pub fn from_str(s: &str) -> Option<Self> {
        Self::all().iter().copied().find(|id| id.as_str() == s)
    }

    /// Get all achievement IDs
    pub fn all() -> &'static [AchievementId] {
        &[
            Self::FirstTask,
            Self::TaskMaster,
            Self::Century,
            Self::PriorityMaster,
            Self::TaskExplorer,
            Self::NightOwl,
            Self::EarlyBird,
            Self::WeeklyWarrior,
            Self::HabitBuilder,
            Self::ConsistencyStreak,
            Self::IronHabit,
            Self::HabitGuru,
            Self::StreakKeeper,
            Self::Level5,
            Self::Level10,
            Self::Level25,
            Self::XpCollector,
            Self::CoinCollector,
            Self::DailyChampion,
            Self::GoalSetter,
            Self::GoalCrusher,
            Self::EarlyAdopter,
            Self::SocialButterfly,
            Self::ShopKeeper,
        ]
    }
}

impl From<AchievementId> for &'static str {
    fn from(id: AchievementId) -> Self {
        id.as_str()
    }
}

/// The statistic an achievement measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementType {
    Tasks,
    HabitsCreated,
    Streak,
    Level,
    Coins,
    GoalsCreated,
    Goals,
    ActiveDays,
    NightTask,
    MorningTask,
    Areas,
    HighPriorityTasks,
    ConcurrentHabits,
    HabitStreak,
    TotalXp,
    DailyChallenges,
    EarlySignup,
    Friends,
    RewardsRedeemed,
}

impl RequirementType {
    /// Current value of the measured statistic
    pub fn current_value(&self, progress: &UserProgress) -> u64 {
        let c = &progress.counters;
        match self {
            Self::Tasks => progress.total_tasks_completed,
            Self::HabitsCreated => c.habits_created,
            Self::Streak => progress.longest_habit_streak,
            Self::Level => u64::from(progress.current_level),
            Self::Coins => progress.coins.max(0) as u64,
            Self::GoalsCreated => c.goals_created,
            Self::Goals => c.goals_completed,
            Self::ActiveDays => c.active_days,
            Self::NightTask => c.night_tasks,
            Self::MorningTask => c.morning_tasks,
            Self::Areas => c.areas_count,
            Self::HighPriorityTasks => c.high_priority_tasks,
            Self::ConcurrentHabits => c.concurrent_habits,
            Self::HabitStreak => c.habit_streak,
            Self::TotalXp => progress.total_xp.max(0) as u64,
            Self::DailyChallenges => c.daily_challenges,
            Self::EarlySignup => u64::from(c.early_adopter),
            Self::Friends => c.friends_count,
            Self::RewardsRedeemed => c.rewards_redeemed,
        }
    }
}

/// Display rarity, derived from the requirement value
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Rarity {
    Common,
    Rare,
    Epic,
    Legendary,
}

impl Rarity {
    pub fn for_requirement(requirement_value: u64) -> Self {
        match requirement_value {
            0..=5 => Self::Common,
            6..=25 => Self::Rare,
            26..=100 => Self::Epic,
            _ => Self::Legendary,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Common => "Common",
            Self::Rare => "Rare",
            Self::Epic => "Epic",
            Self::Legendary => "Legendary",
        }
    }
}

/// Achievement definition with all metadata
#[derive(Debug, Clone, Serialize)]
pub struct Achievement {
    pub id: AchievementId,
    pub title: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    pub requirement_type: RequirementType,
    pub requirement_value: u64,
    pub xp_reward: i64,
}

/// All achievement definitions
pub static ACHIEVEMENTS: &[Achievement] = &[
    Achievement {
        id: AchievementId::FirstTask,
        title: "First Task",
        description: "Complete your first task",
        icon: "check-circle",
        requirement_type: RequirementType::Tasks,
        requirement_value: 1,
        xp_reward: 25,
    },
    Achievement {
        id: AchievementId::TaskMaster,
        title: "Task Master",
        description: "Complete 50 tasks",
        icon: "trophy",
        requirement_type: RequirementType::Tasks,
        requirement_value: 50,
        xp_reward: 100,
    },
    Achievement {
        id: AchievementId::Century,
        title: "Century",
        description: "Complete 100 tasks",
        icon: "medal",
        requirement_type: RequirementType::Tasks,
        requirement_value: 100,
        xp_reward: 200,
    },
    Achievement {
        id: AchievementId::HabitBuilder,
        title: "Habit Builder",
        description: "Create your first habit",
        icon: "repeat",
        requirement_type: RequirementType::HabitsCreated,
        requirement_value: 1,
        xp_reward: 30,
    },
    Achievement {
        id: AchievementId::ConsistencyStreak,
        title: "Consistency Streak",
        description: "Maintain a 7-day habit streak",
        icon: "fire",
        requirement_type: RequirementType::Streak,
        requirement_value: 7,
        xp_reward: 50,
    },
    Achievement {
        id: AchievementId::IronHabit,
        title: "Iron Habit",
        description: "Maintain a 30-day habit streak",
        icon: "flame",
        requirement_type: RequirementType::Streak,
        requirement_value: 30,
        xp_reward: 150,
    },
    Achievement {
        id: AchievementId::Level5,
        title: "Level 5",
        description: "Reach level 5",
        icon: "star",
        requirement_type: RequirementType::Level,
        requirement_value: 5,
        xp_reward: 40,
    },
    Achievement {
        id: AchievementId::Level10,
        title: "Level 10",
        description: "Reach level 10",
        icon: "award",
        requirement_type: RequirementType::Level,
        requirement_value: 10,
        xp_reward: 100,
    },
    Achievement {
        id: AchievementId::Level25,
        title: "Level 25",
        description: "Reach level 25",
        icon: "crown",
        requirement_type: RequirementType::Level,
        requirement_value: 25,
        xp_reward: 250,
    },
    Achievement {
        id: AchievementId::CoinCollector,
        title: "Coin Collector",
        description: "Earn 500 coins",
        icon: "coins",
        requirement_type: RequirementType::Coins,
        requirement_value: 500,
        xp_reward: 75,
    },
    Achievement {
        id: AchievementId::GoalSetter,
        title: "Goal Setter",
        description: "Create your first goal",
        icon: "target",
        requirement_type: RequirementType::GoalsCreated,
        requirement_value: 1,
        xp_reward: 25,
    },
    Achievement {
        id: AchievementId::GoalCrusher,
        title: "Goal Crusher",
        description: "Complete 5 goals",
        icon: "target",
        requirement_type: RequirementType::Goals,
        requirement_value: 5,
        xp_reward: 150,
    },
    Achievement {
        id: AchievementId::WeeklyWarrior,
        title: "Weekly Warrior",
        description: "Complete tasks for 7 consecutive days",
        icon: "calendar",
        requirement_type: RequirementType::ActiveDays,
        requirement_value: 7,
        xp_reward: 75,
    },
    Achievement {
        id: AchievementId::NightOwl,
        title: "Night Owl",
        description: "Complete a task between 9 PM - 6 AM",
        icon: "moon",
        requirement_type: RequirementType::NightTask,
        requirement_value: 1,
        xp_reward: 20,
    },
    Achievement {
        id: AchievementId::EarlyBird,
        title: "Early Bird",
        description: "Complete a task between 5 AM - 9 AM",
        icon: "sun",
        requirement_type: RequirementType::MorningTask,
        requirement_value: 1,
        xp_reward: 20,
    },
    Achievement {
        id: AchievementId::TaskExplorer,
        title: "Task Explorer",
        description: "Create tasks in 5 different areas",
        icon: "compass",
        requirement_type: RequirementType::Areas,
        requirement_value: 5,
        xp_reward: 60,
    },
    Achievement {
        id: AchievementId::PriorityMaster,
        title: "Priority Master",
        description: "Complete 25 high priority tasks",
        icon: "flag",
        requirement_type: RequirementType::HighPriorityTasks,
        requirement_value: 25,
        xp_reward: 125,
    },
    Achievement {
        id: AchievementId::HabitGuru,
        title: "Habit Guru",
        description: "Maintain 5 active habits simultaneously",
        icon: "brain",
        requirement_type: RequirementType::ConcurrentHabits,
        requirement_value: 5,
        xp_reward: 80,
    },
    Achievement {
        id: AchievementId::StreakKeeper,
        title: "Streak Keeper",
        description: "Complete habits for 21 consecutive days",
        icon: "shield",
        requirement_type: RequirementType::HabitStreak,
        requirement_value: 21,
        xp_reward: 120,
    },
    Achievement {
        id: AchievementId::XpCollector,
        title: "XP Collector",
        description: "Earn 1000 XP",
        icon: "zap",
        requirement_type: RequirementType::TotalXp,
        requirement_value: 1000,
        xp_reward: 200,
    },
    Achievement {
        id: AchievementId::DailyChampion,
        title: "Daily Champion",
        description: "Complete 7 daily challenges",
        icon: "calendar-check",
        requirement_type: RequirementType::DailyChallenges,
        requirement_value: 7,
        xp_reward: 175,
    },
    Achievement {
        id: AchievementId::EarlyAdopter,
        title: "Early Adopter",
        description: "Sign up within the first week of launch",
        icon: "rocket",
        requirement_type: RequirementType::EarlySignup,
        requirement_value: 1,
        xp_reward: 50,
    },
    Achievement {
        id: AchievementId::SocialButterfly,
        title: "Social Butterfly",
        description: "Add 10 friends",
        icon: "users",
        requirement_type: RequirementType::Friends,
        requirement_value: 10,
        xp_reward: 90,
    },
    Achievement {
        id: AchievementId::ShopKeeper,
        title: "Shop Keeper",
        description: "Redeem 10 rewards",
        icon: "shopping-bag",
        requirement_type: RequirementType::RewardsRedeemed,
        requirement_value: 10,
        xp_reward: 65,
    },
];

impl Achievement {
    /// Get achievement definition by ID
    pub fn get(id: AchievementId) -> Option<&'static Achievement> {
        ACHIEVEMENTS.iter().find(|a| a.id == id)
    }

    pub fn rarity(&self) -> Rarity {
        Rarity::for_requirement(self.requirement_value)
    }

    /// Human-readable requirement text
    pub fn format_requirement(&self) -> String {
        let n = self.requirement_value;
        let plural = if n > 1 { "s" } else { "" };
        match self.requirement_type {
            RequirementType::Tasks => format!("{n} tasks"),
            RequirementType::HabitsCreated => format!("Create {n} habit{plural}"),
            RequirementType::Streak => format!("{n} day streak"),
            RequirementType::Level => format!("Reach level {n}"),
            RequirementType::Coins => format!("Earn {n} coins"),
            RequirementType::GoalsCreated => format!("Create {n} goal{plural}"),
            RequirementType::Goals => format!("Complete {n} goal{plural}"),
            RequirementType::ActiveDays => format!("{n} active days"),
            RequirementType::NightTask => format!("{n} night task"),
            RequirementType::MorningTask => format!("{n} morning task"),
            RequirementType::Areas => format!("{n} different areas"),
            RequirementType::HighPriorityTasks => format!("{n} high priority tasks"),
            RequirementType::ConcurrentHabits => format!("{n} concurrent habits"),
            RequirementType::HabitStreak => format!("{n} day habit streak"),
            RequirementType::TotalXp => format!("{n} total XP"),
            RequirementType::DailyChallenges => format!("{n} daily challenges"),
            RequirementType::EarlySignup => "Early adopter".to_string(),
            RequirementType::Friends => format!("{n} friends"),
            RequirementType::RewardsRedeemed => format!("Redeem {n} rewards"),
        }
    }

    /// Get total possible XP from all achievements
    pub fn total_xp() -> i64 {
        ACHIEVEMENTS.iter().map(|a| a.xp_reward).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_id_has_a_definition() {
        for id in AchievementId::all() {
            assert!(Achievement::get(*id).is_some(), "missing definition for {:?}", id);
        }
        assert_eq!(ACHIEVEMENTS.len(), AchievementId::all().len());
    }

    #[test]
    fn test_all_ids_unique() {
        let mut ids: Vec<_> = AchievementId::all().iter().map(|id| id.as_str()).collect();
        ids.sort();
        let unique_count = ids.len();
        ids.dedup();
        assert_eq!(ids.len(), unique_count, "All achievement IDs should be unique");
    }

    #[test]
    fn test_id_parse() {
        assert_eq!(AchievementId::from_str("iron_habit"), Some(AchievementId::IronHabit));
        assert_eq!(AchievementId::from_str("nope"), None);
    }

    #[test]
    fn test_requirements_are_positive() {
        for a in ACHIEVEMENTS {
            assert!(a.requirement_value > 0, "{} has zero requirement", a.id.as_str());
            assert!(a.xp_reward >= 0);
        }
    }

    #[test]
    fn test_rarity_bands() {
        assert_eq!(Rarity::for_requirement(1), Rarity::Common);
        assert_eq!(Rarity::for_requirement(5), Rarity::Common);
        assert_eq!(Rarity::for_requirement(6), Rarity::Rare);
        assert_eq!(Rarity::for_requirement(25), Rarity::Rare);
        assert_eq!(Rarity::for_requirement(100), Rarity::Epic);
        assert_eq!(Rarity::for_requirement(101), Rarity::Legendary);
    }

    #[test]
    fn test_requirement_reads_matching_stat() {
        let mut progress = UserProgress::new("u1");
        progress.total_tasks_completed = 12;
        progress.counters.early_adopter = true;
        progress.set_total_xp(1500);
        assert_eq!(RequirementType::Tasks.current_value(&progress), 12);
        assert_eq!(RequirementType::EarlySignup.current_value(&progress), 1);
        assert_eq!(RequirementType::TotalXp.current_value(&progress), 1500);
        assert_eq!(RequirementType::Level.current_value(&progress), 13);
        assert_eq!(RequirementType::Friends.current_value(&progress), 0);
    }

    #[test]
    fn test_total_xp_sums_catalog() {
        let by_hand: i64 = ACHIEVEMENTS.iter().map(|a| a.xp_reward).sum();
        assert_eq!(Achievement::total_xp(), by_hand);
        assert!(Achievement::total_xp() > 0);
    }

    #[test]
    fn test_format_requirement() {
        let habit_builder = Achievement::get(AchievementId::HabitBuilder).unwrap();
        assert_eq!(habit_builder.format_requirement(), "Create 1 habit");
        let goal_crusher = Achievement::get(AchievementId::GoalCrusher).unwrap();
        assert_eq!(goal_crusher.format_requirement(), "Complete 5 goals");
    }
}
