//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (the bridge API key) are referenced by env-var name in the
//! config and resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::time::Duration;

/// Default config file path, overridable with `TRADECYCLE_CONFIG`.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub database: DatabaseConfig,
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub cycle: CycleConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// SQLite connection URL, e.g. `sqlite://data/tradecycle.db`.
    /// `DATABASE_URL` takes precedence when set.
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BridgeConfig {
    pub base_url: String,
    /// Name of the env var holding the bridge API key. The enhanced
    /// strategy cannot be built without it.
    pub api_key_env: String,
    #[serde(default = "default_bridge_timeout")]
    pub timeout_secs: u64,
    /// Try the enhanced strategy first.
    #[serde(default = "default_true")]
    pub enhanced: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CycleConfig {
    /// Maximum instruments analysed per cycle.
    #[serde(default = "default_max_pairs")]
    pub max_pairs: usize,
    /// Analyses slower than this are logged as warnings.
    #[serde(default = "default_slow_analysis_secs")]
    pub slow_analysis_secs: u64,
    /// Pause after each analysed instrument.
    #[serde(default = "default_pair_delay_ms")]
    pub pair_delay_ms: u64,
    /// Skip the whole cycle when AI signal generation is disabled.
    #[serde(default = "default_true")]
    pub require_ai: bool,
    #[serde(default = "default_lock_file")]
    pub lock_file: String,
    /// A cycle holding the run lock longer than this is reported as overdue.
    #[serde(default = "default_lock_stale_secs")]
    pub lock_stale_secs: u64,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            max_pairs: default_max_pairs(),
            slow_analysis_secs: default_slow_analysis_secs(),
            pair_delay_ms: default_pair_delay_ms(),
            require_ai: true,
            lock_file: default_lock_file(),
            lock_stale_secs: default_lock_stale_secs(),
        }
    }
}

impl CycleConfig {
    pub fn slow_analysis(&self) -> Duration {
        Duration::from_secs(self.slow_analysis_secs)
    }

    pub fn pair_delay(&self) -> Duration {
        Duration::from_millis(self.pair_delay_ms)
    }

    pub fn lock_stale_after(&self) -> Duration {
        Duration::from_secs(self.lock_stale_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertsConfig {
    /// Results strictly above this confidence raise a notification.
    #[serde(default = "default_notify_threshold")]
    pub notify_threshold: f64,
    /// Results strictly above this confidence are HIGH priority.
    #[serde(default = "default_high_priority_threshold")]
    pub high_priority_threshold: f64,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            notify_threshold: default_notify_threshold(),
            high_priority_threshold: default_high_priority_threshold(),
        }
    }
}

/// Upper bound for any retention window (100 years).
pub const MAX_RETENTION_DAYS: i64 = 36_500;

#[derive(Debug, Deserialize, Clone)]
pub struct RetentionConfig {
    #[serde(default = "default_read_notification_days")]
    pub read_notification_days: i64,
    #[serde(default = "default_log_days")]
    pub log_days: i64,
    #[serde(default = "default_critical_log_days")]
    pub critical_log_days: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            read_notification_days: default_read_notification_days(),
            log_days: default_log_days(),
            critical_log_days: default_critical_log_days(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_bridge_timeout() -> u64 {
    60
}
fn default_max_pairs() -> usize {
    10
}
fn default_slow_analysis_secs() -> u64 {
    30
}
fn default_pair_delay_ms() -> u64 {
    1000
}
fn default_lock_file() -> String {
    "tradecycle.lock".to_string()
}
fn default_lock_stale_secs() -> u64 {
    3600
}
fn default_notify_threshold() -> f64 {
    0.8
}
fn default_high_priority_threshold() -> f64 {
    0.9
}
fn default_read_notification_days() -> i64 {
    7
}
fn default_log_days() -> i64 {
    30
}
fn default_critical_log_days() -> i64 {
    90
}

impl AppConfig {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Invalid config file: {path}"))
    }

    /// Parse and validate configuration from a TOML string.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(contents).context("Failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the orchestrator cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.cycle.max_pairs == 0 {
            anyhow::bail!("cycle.max_pairs must be at least 1");
        }
        let alerts = &self.alerts;
        for (name, value) in [
            ("alerts.notify_threshold", alerts.notify_threshold),
            ("alerts.high_priority_threshold", alerts.high_priority_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("{name} must be within [0, 1], got {value}");
            }
        }
        if alerts.high_priority_threshold < alerts.notify_threshold {
            anyhow::bail!("alerts.high_priority_threshold must not be below alerts.notify_threshold");
        }
        let retention = &self.retention;
        for (name, days) in [
            ("retention.read_notification_days", retention.read_notification_days),
            ("retention.log_days", retention.log_days),
            ("retention.critical_log_days", retention.critical_log_days),
        ] {
            if !(1..=MAX_RETENTION_DAYS).contains(&days) {
                anyhow::bail!("{name} must be within [1, {MAX_RETENTION_DAYS}], got {days}");
            }
        }
        if retention.critical_log_days <= retention.log_days {
            anyhow::bail!(
                "retention.critical_log_days ({}) must exceed retention.log_days ({})",
                retention.critical_log_days,
                retention.log_days
            );
        }
        Ok(())
    }

    /// Database URL, preferring `DATABASE_URL` from the environment.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| self.database.url.clone())
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
