//! TOML-based application configuration.
//!
//! Stores the tunables of the budget core:
//! - Tick cadence and persistence timeout
//! - Cold-start catch-up chunking
//! - Carryover reward/penalty rates
//! - Week-boundary rule for the weekly usage counter
//!
//! Configuration is stored at `~/.config/quizscreen/config.toml`.

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

use super::data_dir;
use crate::error::ConfigError;
use crate::rollover::{CarryoverPolicy, WeekReset};

/// Timer cadence and persistence behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerConfig {
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    /// Durable writes slower than this are treated as failures.
    #[serde(default = "default_persistence_timeout_ms")]
    pub persistence_timeout_ms: u64,
    /// Maximum slice replayed per step when catching up after a restart.
    #[serde(default = "default_catch_up_chunk_secs")]
    pub catch_up_chunk_secs: u64,
}

/// Rates converting end-of-day leftovers into score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarryoverConfig {
    #[serde(default = "default_reward_per_minute")]
    pub reward_per_minute: i64,
    #[serde(default = "default_penalty_per_minute")]
    pub penalty_per_minute: i64,
    #[serde(default = "default_max_daily_score")]
    pub max_daily_score: i64,
}

/// Weekly counter boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeekConfig {
    /// `"weekday"` for a fixed boundary, `"rolling"` for a trailing
    /// seven-day window.
    #[serde(default = "default_week_mode")]
    pub reset: String,
    /// First day of the week when `reset = "weekday"`.
    #[serde(default = "default_week_start")]
    pub start: String,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/quizscreen/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub timer: TimerConfig,
    #[serde(default)]
    pub carryover: CarryoverConfig,
    #[serde(default)]
    pub week: WeekConfig,
}

// Default functions
fn default_tick_interval_secs() -> u64 {
    1
}
fn default_persistence_timeout_ms() -> u64 {
    2000
}
fn default_catch_up_chunk_secs() -> u64 {
    900
}
fn default_reward_per_minute() -> i64 {
    2
}
fn default_penalty_per_minute() -> i64 {
    3
}
fn default_max_daily_score() -> i64 {
    240
}
fn default_week_mode() -> String {
    "weekday".into()
}
fn default_week_start() -> String {
    "mon".into()
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            persistence_timeout_ms: default_persistence_timeout_ms(),
            catch_up_chunk_secs: default_catch_up_chunk_secs(),
        }
    }
}

impl Default for CarryoverConfig {
    fn default() -> Self {
        Self {
            reward_per_minute: default_reward_per_minute(),
            penalty_per_minute: default_penalty_per_minute(),
            max_daily_score: default_max_daily_score(),
        }
    }
}

impl Default for WeekConfig {
    fn default() -> Self {
        Self {
            reset: default_week_mode(),
            start: default_week_start(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() {
            return Err(ConfigError::UnknownKey(String::new()));
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current
                    .as_object_mut()
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
                let existing = obj
                    .get(part)
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;

                let new_value = match existing {
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<i64>() {
                            serde_json::Value::Number(n.into())
                        } else {
                            return Err(ConfigError::InvalidValue {
                                key: key.to_string(),
                                message: format!("cannot parse '{value}' as number"),
                            });
                        }
                    }
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| ConfigError::InvalidValue {
                            key: key.to_string(),
                            message: e.to_string(),
                        })?,
                    ),
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current
                .get_mut(part)
                .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
        }

        Err(ConfigError::UnknownKey(key.to_string()))
    }

    fn path() -> Result<PathBuf, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: PathBuf::from("~/.config/quizscreen"),
            message: e.to_string(),
        })?;
        Ok(dir.join("config.toml"))
    }

    /// Load from disk or return default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                toml::from_str(&content).map_err(|e| ConfigError::ParseFailed(e.to_string()))
            }
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path()?;
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        std::fs::write(&path, content).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key. Returns error if key is unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the config cannot be saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json =
            serde_json::to_value(&*self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self =
            serde_json::from_value(json).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        self.save()?;
        Ok(())
    }

    pub fn carryover_policy(&self) -> CarryoverPolicy {
        CarryoverPolicy {
            reward_per_minute: self.carryover.reward_per_minute,
            penalty_per_minute: self.carryover.penalty_per_minute,
            max_daily_score: self.carryover.max_daily_score,
        }
    }

    pub fn week_reset(&self) -> WeekReset {
        if self.week.reset.eq_ignore_ascii_case("rolling") {
            return WeekReset::Rolling;
        }
        match self.week.start.parse::<Weekday>() {
            Ok(day) => WeekReset::Weekday(day),
            Err(_) => {
                warn!(start = %self.week.start, "unrecognized week start; using monday");
                WeekReset::Weekday(Weekday::Mon)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.timer.tick_interval_secs, 1);
        assert_eq!(parsed.carryover.reward_per_minute, 2);
        assert_eq!(parsed.week.reset, "weekday");
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("timer.tick_interval_secs").as_deref(), Some("1"));
        assert_eq!(cfg.get("carryover.penalty_per_minute").as_deref(), Some("3"));
        assert_eq!(cfg.get("week.start").as_deref(), Some("mon"));
        assert!(cfg.get("timer.missing_key").is_none());
    }

    #[test]
    fn set_json_value_by_path_updates_nested_number() {
        let mut json = serde_json::to_value(Config::default()).unwrap();
        Config::set_json_value_by_path(&mut json, "carryover.reward_per_minute", "5").unwrap();
        assert_eq!(
            Config::get_json_value_by_path(&json, "carryover.reward_per_minute").unwrap(),
            &serde_json::Value::Number(5.into())
        );
    }

    #[test]
    fn set_json_value_by_path_rejects_unknown_key() {
        let mut json = serde_json::to_value(Config::default()).unwrap();
        assert!(Config::set_json_value_by_path(&mut json, "timer.nonexistent", "1").is_err());
    }

    #[test]
    fn set_json_value_by_path_rejects_invalid_number() {
        let mut json = serde_json::to_value(Config::default()).unwrap();
        assert!(
            Config::set_json_value_by_path(&mut json, "timer.tick_interval_secs", "soon").is_err()
        );
    }

    #[test]
    fn week_reset_parses_modes() {
        let mut cfg = Config::default();
        assert_eq!(cfg.week_reset(), WeekReset::Weekday(Weekday::Mon));

        cfg.week.start = "sun".into();
        assert_eq!(cfg.week_reset(), WeekReset::Weekday(Weekday::Sun));

        cfg.week.reset = "rolling".into();
        assert_eq!(cfg.week_reset(), WeekReset::Rolling);

        cfg.week.reset = "weekday".into();
        cfg.week.start = "someday".into();
        assert_eq!(cfg.week_reset(), WeekReset::Weekday(Weekday::Mon));
    }

    #[test]
    fn carryover_policy_reflects_config() {
        let mut cfg = Config::default();
        cfg.carryover.reward_per_minute = 4;
        cfg.carryover.max_daily_score = 100;
        let policy = cfg.carryover_policy();
        assert_eq!(policy.score(30, 0), 100); // 4 * 30 clamped to the cap
    }
}
