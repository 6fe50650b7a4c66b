//! Configuration loading and management

mod io;
mod settings;

pub use settings::{ProgressionSettings, Settings};

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::progression::EngineSettings;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub settings: Settings,
}

impl Config {
    /// Engine settings built from `[settings.progression]` and `[settings.challenge]`
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            grant_achievement_xp: self.settings.progression.grant_achievement_xp,
            challenge: self.settings.challenge.clone(),
        }
    }

    /// Database path: an explicit override, then `settings.database_path`,
    /// then `~/.questlog/questlog.db`.
    ///
    /// Relative configured paths resolve against the config directory.
    pub fn database_path(&self, override_path: Option<&Path>) -> PathBuf {
        if let Some(path) = override_path {
            return path.to_path_buf();
        }
        match self.settings.database_path.as_deref().map(str::trim) {
            Some(path) if !path.is_empty() => {
                let path = PathBuf::from(path);
                if path.is_absolute() {
                    path
                } else {
                    Self::global_config_dir().join(path)
                }
            }
            _ => Self::default_database_path(),
        }
    }

    /// User to act as: an explicit override, then `settings.default_user`
    pub fn user_id(&self, override_user: Option<&str>) -> String {
        override_user
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(&self.settings.default_user)
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_partial_config() {
        let config: Config = toml::from_str(
            r#"
            [settings]
            default_user = "alice"

            [settings.challenge]
            task_target = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.settings.default_user, "alice");
        assert_eq!(config.settings.challenge.task_target, 5);
        assert_eq!(config.settings.challenge.habit_target, 2);
        assert!(config.settings.progression.grant_achievement_xp);
    }

    #[test]
    fn test_engine_settings() {
        let mut config = Config::default();
        config.settings.progression.grant_achievement_xp = false;
        config.settings.challenge.coin_reward = 40;

        let engine = config.engine_settings();
        assert!(!engine.grant_achievement_xp);
        assert_eq!(engine.challenge.coin_reward, 40);
    }

    #[test]
    fn test_database_path_resolution() {
        let mut config = Config::default();
        assert_eq!(config.database_path(None), Config::default_database_path());

        config.settings.database_path = Some("/tmp/q.db".to_string());
        assert_eq!(config.database_path(None), PathBuf::from("/tmp/q.db"));
        assert_eq!(
            config.database_path(Some(Path::new("/other.db"))),
            PathBuf::from("/other.db")
        );

        config.settings.database_path = Some("data/q.db".to_string());
        assert_eq!(
            config.database_path(None),
            Config::global_config_dir().join("data/q.db")
        );
    }

    #[test]
    fn test_user_override() {
        let config = Config::default();
        assert_eq!(config.user_id(None), "default");
        assert_eq!(config.user_id(Some("bob")), "bob");
        assert_eq!(config.user_id(Some("  ")), "default");
    }
}
