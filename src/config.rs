//! Engine configuration, loaded from TOML
//!
//! Every key is optional; a missing file section or key takes its default.
//!
//! ```toml
//! home_page = "HomePage"
//! legacy_link_prefix = "/wiki/documentation/pages/"
//! merge_window_minutes = 30
//! lock_minutes = 30
//! database = "/var/lib/wikiledger/wiki.db"
//! ```

use crate::markup::DEFAULT_LEGACY_PREFIX;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Longest accepted merge window or lock period: one year
pub const MAX_WINDOW_MINUTES: i64 = 365 * 24 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WikiConfig {
    /// Page that is never an orphan
    pub home_page: String,
    /// Path prefix stripped from legacy inline links; empty disables it
    pub legacy_link_prefix: String,
    /// Same-author saves closer together than this amend the last revision
    pub merge_window_minutes: i64,
    /// How long an edit lock holds
    pub lock_minutes: i64,
    /// SQLite database file; `None` leaves the choice to the caller
    pub database: Option<PathBuf>,
}

impl Default for WikiConfig {
    fn default() -> Self {
        Self {
            home_page: "HomePage".to_string(),
            legacy_link_prefix: DEFAULT_LEGACY_PREFIX.to_string(),
            merge_window_minutes: 30,
            lock_minutes: 30,
            database: None,
        }
    }
}

impl WikiConfig {
    /// Read and validate a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        tracing::debug!("Reading config from {:?}", path);
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: WikiConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.home_page.trim().is_empty() {
            return Err(ConfigError::Invalid("home_page cannot be blank".to_string()));
        }
        check_window("merge_window_minutes", self.merge_window_minutes)?;
        check_window("lock_minutes", self.lock_minutes)?;
        Ok(())
    }

    /// Clamped into the accepted range even when `validate` was skipped
    pub fn merge_window(&self) -> Duration {
        Duration::minutes(self.merge_window_minutes.clamp(1, MAX_WINDOW_MINUTES))
    }

    pub fn lock_period(&self) -> Duration {
        Duration::minutes(self.lock_minutes.clamp(1, MAX_WINDOW_MINUTES))
    }
}

fn check_window(key: &str, minutes: i64) -> Result<(), ConfigError> {
    if minutes <= 0 {
        return Err(ConfigError::Invalid(format!("{} must be positive, got {}", key, minutes)));
    }
    if minutes > MAX_WINDOW_MINUTES {
        return Err(ConfigError::Invalid(format!(
            "{} must be at most {}, got {}",
            key, MAX_WINDOW_MINUTES, minutes
        )));
    }
    Ok(())
}
