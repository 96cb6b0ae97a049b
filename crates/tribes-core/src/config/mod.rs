//! Runtime configuration read from `TRIBES_*` environment variables

use std::collections::HashMap;
use std::env;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::models::DEFAULT_COOLDOWN_DAYS;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Tunables for the storage, sweeper, sync and menu components
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// Database file; `None` lets the binary pick its platform default
    pub db_path: Option<PathBuf>,
    pub share_sweep_interval: Duration,
    /// Bound on acquiring the database and on SQLite's busy wait
    pub storage_timeout: Duration,
    /// Bound on one sync adapter call
    pub sync_timeout: Duration,
    pub menu_default_cooldown_days: i64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            share_sweep_interval: Duration::from_secs(3_600),
            storage_timeout: Duration::from_millis(5_000),
            sync_timeout: Duration::from_secs(30),
            menu_default_cooldown_days: DEFAULT_COOLDOWN_DAYS,
        }
    }
}

impl CoreConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let db_path = optional_trimmed(&lookup, "TRIBES_DB_PATH").map(PathBuf::from);

        let sweep_secs = ranged(
            &lookup,
            "TRIBES_SHARE_SWEEP_INTERVAL_SECS",
            3_600,
            10..=86_400,
        )?;
        let storage_timeout_ms = ranged(&lookup, "TRIBES_STORAGE_TIMEOUT_MS", 5_000, 100..=60_000)?;
        let sync_timeout_secs = ranged(&lookup, "TRIBES_SYNC_TIMEOUT_SECS", 30, 1..=600)?;
        let cooldown_days = ranged(
            &lookup,
            "TRIBES_MENU_DEFAULT_COOLDOWN_DAYS",
            DEFAULT_COOLDOWN_DAYS,
            0..=3_650,
        )?;

        Ok(Self {
            db_path,
            share_sweep_interval: Duration::from_secs(sweep_secs),
            storage_timeout: Duration::from_millis(storage_timeout_ms),
            sync_timeout: Duration::from_secs(sync_timeout_secs),
            menu_default_cooldown_days: cooldown_days,
        })
    }
}

fn ranged<T>(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
    range: RangeInclusive<T>,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + std::fmt::Display + Copy,
{
    let Some(raw) = optional_trimmed(lookup, name) else {
        return Ok(default);
    };
    let value = raw.parse::<T>().map_err(|_| {
        ConfigError::Invalid(format!(
            "{name} must be an integer in [{}, {}]",
            range.start(),
            range.end()
        ))
    })?;
    if !range.contains(&value) {
        return Err(ConfigError::Invalid(format!(
            "{name} must be in [{}, {}]",
            range.start(),
            range.end()
        )));
    }
    Ok(value)
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
