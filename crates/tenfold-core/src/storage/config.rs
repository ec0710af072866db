//! TOML-based application configuration.
//!
//! Stores:
//! - Scheduler timezone and trigger times
//! - Completion threshold and question-change quota
//! - Batch fan-out concurrency
//! - Database location
//!
//! Configuration is stored at `<data dir>/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::engine::Rules;
use crate::error::ConfigError;
use crate::scheduler::SchedulePlan;

/// Wall-clock triggers, all interpreted in `timezone`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Fixed UTC offset such as `+03:00`, or `UTC`.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_issue_at")]
    pub issue_at: String,
    /// Reminder times; the last one sends the final reminder.
    #[serde(default = "default_reminders")]
    pub reminders: Vec<String>,
    #[serde(default = "default_close_at")]
    pub close_at: String,
    #[serde(default = "default_true")]
    pub digest_enabled: bool,
    #[serde(default = "default_digest_at")]
    pub digest_at: String,
    #[serde(default = "default_digest_weekday")]
    pub digest_weekday: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    #[serde(default = "default_completion_threshold")]
    pub completion_threshold: u32,
    #[serde(default = "default_max_question_changes")]
    pub max_question_changes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutConfig {
    /// Upper bound on per-user tasks in flight during one batch.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Defaults to `<data dir>/tenfold.db`.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
    #[serde(default)]
    pub fanout: FanoutConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

// Default functions
fn default_timezone() -> String {
    "+03:00".into()
}
fn default_issue_at() -> String {
    "10:00".into()
}
fn default_reminders() -> Vec<String> {
    vec!["18:00".into(), "22:00".into()]
}
fn default_close_at() -> String {
    "23:59".into()
}
fn default_digest_at() -> String {
    "18:00".into()
}
fn default_digest_weekday() -> String {
    "Fri".into()
}
fn default_true() -> bool {
    true
}
fn default_completion_threshold() -> u32 {
    10
}
fn default_max_question_changes() -> u32 {
    3
}
fn default_max_concurrency() -> usize {
    8
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            issue_at: default_issue_at(),
            reminders: default_reminders(),
            close_at: default_close_at(),
            digest_enabled: true,
            digest_at: default_digest_at(),
            digest_weekday: default_digest_weekday(),
        }
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            completion_threshold: default_completion_threshold(),
            max_question_changes: default_max_question_changes(),
        }
    }
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
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
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() || key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|e| ConfigError::invalid(key, e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => serde_json::Value::Number(
                        value
                            .parse::<u64>()
                            .map_err(|e| ConfigError::invalid(key, e.to_string()))?
                            .into(),
                    ),
                    serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
                        serde_json::from_str(value)
                            .map_err(|e| ConfigError::invalid(key, e.to_string()))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    /// Default location of the config file.
    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the default location, writing defaults if the file is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
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

    /// Set a config value by key without persisting it.
    ///
    /// The updated config must still validate; otherwise `self` is untouched.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json =
            serde_json::to_value(&*self).map_err(|e| ConfigError::invalid(key, e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config =
            serde_json::from_value(json).map_err(|e| ConfigError::invalid(key, e.to_string()))?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Check every field that has a restricted format or range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.progress.completion_threshold == 0 {
            return Err(ConfigError::invalid(
                "progress.completion_threshold",
                "must be at least 1",
            ));
        }
        if self.fanout.max_concurrency == 0 {
            return Err(ConfigError::invalid(
                "fanout.max_concurrency",
                "must be at least 1",
            ));
        }
        self.plan().map(|_| ())
    }

    pub fn rules(&self) -> Rules {
        Rules {
            completion_threshold: self.progress.completion_threshold,
            max_question_changes: self.progress.max_question_changes,
        }
    }

    /// Parse the `[schedule]` section into concrete triggers.
    pub fn plan(&self) -> Result<SchedulePlan, ConfigError> {
        SchedulePlan::from_config(&self.schedule)
    }

    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.storage.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join("tenfold.db")),
        }
    }
}
