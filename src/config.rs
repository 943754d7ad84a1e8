use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::reminder::work::{MIN_FLEX, MIN_PERIODIC_INTERVAL};

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MedremConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub schedule: ScheduleConfig,
    pub notification: NotificationConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    pub default_user: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScheduleConfig {
    pub interval_minutes: u64,
    pub flex_minutes: u64,
    pub due_window_secs: u32,
    pub poll_interval_secs: u64,
    pub tick_budget_secs: u64,
    pub retry_backoff_secs: u64,
    pub max_backoff_secs: u64,
    pub reschedule_remaining_on_delete: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NotificationConfig {
    /// One of `log`, `outbox`, `command`.
    pub sink: String,
    pub command: String,
    pub args: Vec<String>,
}

impl Default for MedremConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            schedule: ScheduleConfig::default(),
            notification: NotificationConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_medrem_dir()
            .join("medrem.db")
            .to_string_lossy()
            .into_owned();
        Self {
            db_path,
            default_user: "default".into(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 15,
            flex_minutes: 5,
            due_window_secs: 900,
            poll_interval_secs: 30,
            tick_budget_secs: 600,
            retry_backoff_secs: 30,
            max_backoff_secs: 5 * 60 * 60,
            reschedule_remaining_on_delete: true,
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            sink: "log".into(),
            command: "notify-send".into(),
            args: vec!["--urgency=critical".into()],
        }
    }
}

impl ScheduleConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.saturating_mul(60))
    }

    pub fn flex(&self) -> Duration {
        Duration::from_secs(self.flex_minutes.saturating_mul(60))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn tick_budget(&self) -> Duration {
        Duration::from_secs(self.tick_budget_secs)
    }
}

/// Returns `~/.medrem/`
pub fn default_medrem_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".medrem")
}

/// Returns the default config file path: `~/.medrem/config.toml`
pub fn default_config_path() -> PathBuf {
    default_medrem_dir().join("config.toml")
}

impl MedremConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            MedremConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides (MEDREM_DB, MEDREM_USER, MEDREM_LOG_LEVEL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("MEDREM_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("MEDREM_USER") {
            self.storage.default_user = val;
        }
        if let Ok(val) = std::env::var("MEDREM_LOG_LEVEL") {
            self.server.log_level = val;
        }
    }

    /// Reject schedule settings the work queue cannot honor.
    pub fn validate(&self) -> Result<()> {
        let schedule = &self.schedule;
        ensure!(
            schedule.interval() >= MIN_PERIODIC_INTERVAL,
            "schedule.interval_minutes must be at least {} minutes",
            MIN_PERIODIC_INTERVAL.as_secs() / 60
        );
        ensure!(
            schedule.flex() >= MIN_FLEX && schedule.flex() <= schedule.interval(),
            "schedule.flex_minutes must be between {} and interval_minutes",
            MIN_FLEX.as_secs() / 60
        );
        ensure!(
            schedule.poll_interval_secs > 0 && schedule.poll_interval() <= schedule.flex(),
            "schedule.poll_interval_secs must be positive and no longer than the flex window"
        );
        ensure!(
            schedule.due_window_secs < crate::reminder::time_math::SECONDS_PER_DAY / 2,
            "schedule.due_window_secs must be under twelve hours"
        );
        ensure!(
            schedule.retry_backoff_secs > 0
                && schedule.retry_backoff_secs <= schedule.max_backoff_secs,
            "schedule.retry_backoff_secs must be positive and no larger than max_backoff_secs"
        );
        Ok(())
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = MedremConfig::default();
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.storage.default_user, "default");
        assert_eq!(config.schedule.interval_minutes, 15);
        assert_eq!(config.schedule.flex_minutes, 5);
        assert_eq!(config.schedule.due_window_secs, 900);
        assert_eq!(config.notification.sink, "log");
        assert!(config.storage.db_path.ends_with("medrem.db"));
        config.validate().unwrap();
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[server]
log_level = "debug"

[storage]
db_path = "/tmp/test.db"
default_user = "alice"

[schedule]
interval_minutes = 30

[notification]
sink = "outbox"
"#;
        let config: MedremConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.storage.db_path, "/tmp/test.db");
        assert_eq!(config.storage.default_user, "alice");
        assert_eq!(config.schedule.interval_minutes, 30);
        assert_eq!(config.notification.sink, "outbox");
        // defaults still apply for unset fields
        assert_eq!(config.schedule.flex_minutes, 5);
        assert!(config.schedule.reschedule_remaining_on_delete);
    }

    #[test]
    fn validate_rejects_short_interval() {
        let mut config = MedremConfig::default();
        config.schedule.interval_minutes = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn huge_minute_values_saturate() {
        let mut config = MedremConfig::default();
        config.schedule.flex_minutes = u64::MAX;
        assert_eq!(config.schedule.flex(), Duration::from_secs(u64::MAX));
        assert!(config.validate().is_err());

        config.schedule.interval_minutes = u64::MAX;
        assert_eq!(config.schedule.interval(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn validate_rejects_flex_longer_than_interval() {
        let mut config = MedremConfig::default();
        config.schedule.flex_minutes = 20;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_poll_slower_than_flex() {
        let mut config = MedremConfig::default();
        config.schedule.poll_interval_secs = 600;
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = MedremConfig::default();
        std::env::set_var("MEDREM_DB", "/tmp/override.db");
        std::env::set_var("MEDREM_USER", "env-user");
        std::env::set_var("MEDREM_LOG_LEVEL", "trace");

        config.apply_env_overrides();

        assert_eq!(config.storage.db_path, "/tmp/override.db");
        assert_eq!(config.storage.default_user, "env-user");
        assert_eq!(config.server.log_level, "trace");

        // Clean up
        std::env::remove_var("MEDREM_DB");
        std::env::remove_var("MEDREM_USER");
        std::env::remove_var("MEDREM_LOG_LEVEL");
    }
}
