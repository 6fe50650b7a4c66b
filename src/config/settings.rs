//! Settings configuration types

use serde::{Deserialize, Serialize};

use crate::progression::ChallengeSettings;

/// General settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// SQLite database file. Relative paths resolve against `~/.questlog/`.
    /// Unset means `~/.questlog/questlog.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<String>,

    /// User the CLI acts as when `--user` is not given
    #[serde(default = "default_user")]
    pub default_user: String,

    /// XP and achievement behaviour
    #[serde(default)]
    pub progression: ProgressionSettings,

    /// Targets and rewards for newly generated daily challenges
    #[serde(default)]
    pub challenge: ChallengeSettings,
}

/// XP and achievement behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressionSettings {
    /// Credit each unlocked achievement's XP reward to the ledger
    #[serde(default = "default_grant_achievement_xp")]
    pub grant_achievement_xp: bool,
}

fn default_user() -> String {
    "default".to_string()
}

fn default_grant_achievement_xp() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: None,
            default_user: default_user(),
            progression: ProgressionSettings::default(),
            challenge: ChallengeSettings::default(),
        }
    }
}

impl Default for ProgressionSettings {
    fn default() -> Self {
        Self {
            grant_achievement_xp: default_grant_achievement_xp(),
        }
    }
}
