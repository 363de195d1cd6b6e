use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, Result};

pub const DEFAULT_MAX_STEPS: u32 = 1000; // hard bound on recurrence stepping per call
pub const DEFAULT_NEXT_SCAN_DAYS: u32 = 365; // next_occurrence linear-scan cap
pub const DEFAULT_WINDOW_PADDING_DAYS: u32 = 60; // conflict scan expansion on each side

/// Top-level config (rota.toml + ROTA_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RotaConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub recurrence: RecurrenceConfig,
    #[serde(default)]
    pub conflicts: ConflictConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Bounds applied by the recurrence engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurrenceConfig {
    /// Generation stops (and reports truncation) after this many steps.
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    /// How many days `next_occurrence` scans before giving up.
    #[serde(default = "default_next_scan_days")]
    pub next_occurrence_scan_days: u32,
}

impl Default for RecurrenceConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            next_occurrence_scan_days: DEFAULT_NEXT_SCAN_DAYS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictConfig {
    /// Days added before and after the requested window when expanding
    /// recurring shifts, so moved occurrences are still found.
    #[serde(default = "default_window_padding_days")]
    pub window_padding_days: u32,
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            window_padding_days: DEFAULT_WINDOW_PADDING_DAYS,
        }
    }
}

fn default_max_steps() -> u32 {
    DEFAULT_MAX_STEPS
}
fn default_next_scan_days() -> u32 {
    DEFAULT_NEXT_SCAN_DAYS
}
fn default_window_padding_days() -> u32 {
    DEFAULT_WINDOW_PADDING_DAYS
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.rota/rota.db", home)
}

impl RotaConfig {
    /// Load config from a TOML file with ROTA_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. `ROTA_CONFIG` env var
    ///   3. ~/.rota/rota.toml
    ///
    /// A missing file is not an error; defaults apply. Nested keys use a
    /// double underscore: `ROTA_RECURRENCE__MAX_STEPS=2000`.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("ROTA_CONFIG").ok())
            .unwrap_or_else(default_config_path);
        debug!(%path, "loading config");

        Figment::from(Serialized::defaults(RotaConfig::default()))
            .merge(Toml::file(&path))
            .merge(Env::prefixed("ROTA_").ignore(&["CONFIG"]).split("__"))
            .extract()
            .map_err(|e| CoreError::Config(e.to_string()))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.rota/rota.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = RotaConfig::load(Some("/nonexistent/rota.toml")).expect("load failed");
        assert_eq!(config.recurrence.max_steps, DEFAULT_MAX_STEPS);
        assert_eq!(
            config.recurrence.next_occurrence_scan_days,
            DEFAULT_NEXT_SCAN_DAYS
        );
        assert_eq!(
            config.conflicts.window_padding_days,
            DEFAULT_WINDOW_PADDING_DAYS
        );
        assert!(config.database.path.ends_with("rota.db"));
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config: RotaConfig = Figment::from(Serialized::defaults(RotaConfig::default()))
            .merge(Toml::string("[recurrence]\nmax_steps = 50\n"))
            .extract()
            .expect("extract failed");
        assert_eq!(config.recurrence.max_steps, 50);
        assert_eq!(
            config.recurrence.next_occurrence_scan_days,
            DEFAULT_NEXT_SCAN_DAYS
        );
    }
}
