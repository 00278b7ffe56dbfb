// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables and the
//! repository's optional `config/settings.yaml`.
//!
//! The configuration is built once at startup and handed by reference to
//! the repository, metrics engine and sync pipeline. Nothing here is cached
//! globally, so tests can run several repositories side by side.

use crate::models::{SportMultiplier, SportType};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A lock older than this is reclaimed regardless of its holder.
pub const LOCK_STALE_SECS: u64 = 300;
/// Sleep between lock polls.
pub const LOCK_POLL_INTERVAL_MS: u64 = 50;
/// A sync finding the lock held gives up at once.
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 0;
/// Window fetched on the very first sync.
pub const DEFAULT_LOOKBACK_DAYS: i64 = 120;
/// Incremental syncs re-read this much before the last sync to catch late uploads.
pub const INCREMENTAL_OVERLAP_HOURS: i64 = 24;
pub const DEFAULT_RPE: u8 = 5;
pub const FUZZY_START_TOLERANCE_MINUTES: i64 = 30;
pub const FUZZY_DURATION_TOLERANCE_SECS: u32 = 60;
pub const STRAVA_API_BASE_URL: &str = "https://www.strava.com/api/v3";

/// Relative location of the optional settings override file.
pub const SETTINGS_FILE: &str = "config/settings.yaml";

/// Application configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Repository root holding `data/` and `config/`
    pub root: PathBuf,
    /// How long the sync waits for another mutating operation. Zero fails
    /// fast on the first contended attempt.
    pub lock_timeout: Duration,
    pub lock_stale_after: Duration,
    pub lock_poll_interval: Duration,
    /// First-sync lookback window in days
    pub lookback_days: i64,
    /// Bearer token for the Strava API (obtained outside this crate)
    pub strava_access_token: Option<String>,
    pub strava_base_url: String,
    pub load: LoadSettings,
    pub dedup: DedupSettings,
}

/// Inputs to the per-activity load calculation.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadSettings {
    /// Overrides of the built-in sport multipliers
    pub multipliers: BTreeMap<SportType, SportMultiplier>,
    /// RPE used when neither a reported RPE nor heart rate is available
    pub default_rpe: u8,
    /// Athlete max heart rate, enables HR-based RPE estimation
    pub max_heart_rate: Option<u16>,
}

impl Default for LoadSettings {
    fn default() -> Self {
        Self {
            multipliers: BTreeMap::new(),
            default_rpe: DEFAULT_RPE,
            max_heart_rate: None,
        }
    }
}

impl LoadSettings {
    /// Multiplier pair for a sport, honouring overrides.
    pub fn multiplier(&self, sport: SportType) -> SportMultiplier {
        self.multipliers
            .get(&sport)
            .copied()
            .unwrap_or_else(|| sport.default_multiplier())
    }
}

/// Tolerances for matching an upstream activity against a manual entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DedupSettings {
    pub start_tolerance: chrono::Duration,
    pub duration_tolerance_secs: u32,
}

impl Default for DedupSettings {
    fn default() -> Self {
        Self {
            start_tolerance: chrono::Duration::minutes(FUZZY_START_TOLERANCE_MINUTES),
            duration_tolerance_secs: FUZZY_DURATION_TOLERANCE_SECS,
        }
    }
}

/// On-disk overrides (`config/settings.yaml`). Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SettingsFile {
    multipliers: BTreeMap<SportType, SportMultiplier>,
    default_rpe: Option<u8>,
    max_heart_rate: Option<u16>,
    fuzzy_start_tolerance_minutes: Option<i64>,
    fuzzy_duration_tolerance_secs: Option<u32>,
    lock_stale_secs: Option<u64>,
}

impl Config {
    /// Default configuration rooted at `root`. Used by tests and as the base
    /// that `from_env` refines.
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock_timeout: Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS),
            lock_stale_after: Duration::from_secs(LOCK_STALE_SECS),
            lock_poll_interval: Duration::from_millis(LOCK_POLL_INTERVAL_MS),
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            strava_access_token: None,
            strava_base_url: STRAVA_API_BASE_URL.to_string(),
            load: LoadSettings::default(),
            dedup: DedupSettings::default(),
        }
    }

    /// Load configuration from environment variables, then apply the
    /// repository's settings file if one exists.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let root = env::var("TRAINLOAD_ROOT").unwrap_or_else(|_| ".".to_string());
        let mut config = Self::for_root(root);

        if let Some(ms) = parse_env::<u64>("TRAINLOAD_LOCK_TIMEOUT_MS")? {
            config.lock_timeout = Duration::from_millis(ms);
        }
        if let Some(days) = parse_env::<i64>("TRAINLOAD_LOOKBACK_DAYS")? {
            if days <= 0 {
                return Err(ConfigError::Invalid {
                    name: "TRAINLOAD_LOOKBACK_DAYS",
                    value: days.to_string(),
                });
            }
            config.lookback_days = days;
        }
        config.strava_access_token = env::var("STRAVA_ACCESS_TOKEN")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        if let Ok(url) = env::var("STRAVA_API_BASE_URL") {
            config.strava_base_url = url.trim_end_matches('/').to_string();
        }

        config.with_settings_file()
    }

    /// Apply `config/settings.yaml` under the repository root, if present.
    pub fn with_settings_file(mut self) -> Result<Self, ConfigError> {
        let path = self.root.join(SETTINGS_FILE);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(self),
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let settings: SettingsFile =
            serde_yaml::from_str(&text).map_err(|e| ConfigError::Settings {
                path: path.clone(),
                message: e.to_string(),
            })?;
        self.apply(settings, &path)?;

        tracing::info!(path = %path.display(), "Applied repository settings");
        Ok(self)
    }

    fn apply(&mut self, settings: SettingsFile, path: &Path) -> Result<(), ConfigError> {
        for (sport, multiplier) in settings.multipliers {
            if multiplier.systemic < 0.0 || multiplier.lower_body < 0.0 {
                return Err(ConfigError::Settings {
                    path: path.to_path_buf(),
                    message: format!("negative multiplier for {}", sport.as_str()),
                });
            }
            self.load.multipliers.insert(sport, multiplier);
        }
        if let Some(rpe) = settings.default_rpe {
            if !(1..=10).contains(&rpe) {
                return Err(ConfigError::Settings {
                    path: path.to_path_buf(),
                    message: format!("default_rpe must be 1-10, got {}", rpe),
                });
            }
            self.load.default_rpe = rpe;
        }
        if settings.max_heart_rate.is_some() {
            self.load.max_heart_rate = settings.max_heart_rate;
        }
        if let Some(minutes) = settings.fuzzy_start_tolerance_minutes {
            self.dedup.start_tolerance = chrono::Duration::minutes(minutes);
        }
        if let Some(secs) = settings.fuzzy_duration_tolerance_secs {
            self.dedup.duration_tolerance_secs = secs;
        }
        if let Some(secs) = settings.lock_stale_secs {
            self.lock_stale_after = Duration::from_secs(secs);
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(None),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {name}: {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("Invalid settings file {}: {message}", path.display())]
    Settings { path: PathBuf, message: String },

    #[error("Failed to read settings: {0}")]
    Io(#[from] std::io::Error),
}
