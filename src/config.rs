//! Configuration for the harvester.
//!
//! Every key is optional; an absent file yields the built-in defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::browser::BrowserEngineConfig;
use crate::scrapers::humanize::{DelayRange, Humanizer};
use crate::scrapers::site::SiteConfig;

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILENAME: &str = "harvest.toml";

/// Default directory for the daily stores.
pub const DEFAULT_DATA_DIR: &str = "data/raw";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestConfig {
    /// Directory holding the daily record stores.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Store filename prefix; files are named `<prefix>_<YYYYMMDD>.csv`.
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
    #[serde(default)]
    pub browser: BrowserEngineConfig,
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub targets: TargetsConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_DIR)
}

fn default_file_prefix() -> String {
    "tweets".to_string()
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            file_prefix: default_file_prefix(),
            browser: BrowserEngineConfig::default(),
            site: SiteConfig::default(),
            targets: TargetsConfig::default(),
            timing: TimingConfig::default(),
            source_path: None,
        }
    }
}

impl HarvestConfig {
    /// Load from `path`, or from `harvest.toml` in the working directory if present.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config = match path {
            Some(path) => Self::load_from_path(path)?,
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILENAME);
                if fallback.exists() {
                    Self::load_from_path(fallback)?
                } else {
                    Self::default()
                }
            }
        };
        Ok(config.with_env_overrides())
    }

    /// Load configuration from a specific TOML (or JSON, by extension) file.
    pub fn load_from_path(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let mut config: HarvestConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config {}", path.display()))?,
            _ => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config {}", path.display()))?,
        };

        if let Some(base) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            config.data_dir = resolve_path(&config.data_dir, base);
        }
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Apply `HARVEST_DATA_DIR` and the browser environment overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(dir) = std::env::var("HARVEST_DATA_DIR")
            .ok()
            .filter(|s| !s.is_empty())
        {
            self.data_dir = PathBuf::from(shellexpand::tilde(&dir).as_ref());
        }
        self.browser = self.browser.with_env_overrides();
        self
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}

/// Expand `~` and resolve a relative path against `base_dir`.
pub fn resolve_path(path: &Path, base_dir: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    let expanded = shellexpand::tilde(raw.as_ref());
    let expanded = Path::new(expanded.as_ref());

    if expanded.is_absolute() {
        expanded.to_path_buf()
    } else {
        base_dir.join(expanded)
    }
}

/// What one harvesting pass visits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetsConfig {
    /// Profile handles harvested at the start of every pass.
    pub profiles: Vec<String>,
    pub max_per_profile: usize,
    /// Walk the trending topics after the profiles.
    pub trending: bool,
    pub per_topic_cap: usize,
}

impl Default for TargetsConfig {
    fn default() -> Self {
        Self {
            profiles: Vec::new(),
            max_per_profile: 20,
            trending: true,
            per_topic_cap: 5,
        }
    }
}

/// Waits, pauses and recovery delays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Bound on explicit element waits.
    pub wait_timeout_secs: u64,
    /// Bound on the verification challenge probe.
    pub challenge_timeout_secs: u64,
    /// Consecutive rounds without height growth before a feed counts as exhausted.
    pub stall_ceiling: u32,
    /// Scroll rounds per topic (inclusive bounds).
    pub topic_scroll_rounds: (u32, u32),
    pub stall_pause_secs: u64,
    pub auth_retry_secs: u64,
    pub fatal_backoff_secs: u64,
    pub cycle_cooldown_secs: u64,

    pub login_load: DelayRange,
    pub field_pause: DelayRange,
    pub step_pause: DelayRange,
    pub challenge_settle: DelayRange,
    pub login_settle: DelayRange,

    pub profile_load: DelayRange,
    pub scroll_pause: DelayRange,

    pub trending_load: DelayRange,
    pub list_settle: DelayRange,
    pub click_pause: DelayRange,
    pub hover_pause: DelayRange,
    pub topic_settle: DelayRange,
    pub topic_scroll_pause: DelayRange,
    pub posts_settle: DelayRange,
    pub topic_linger: DelayRange,
    pub return_settle: DelayRange,
    /// Pause after a completed pass, before cooldown.
    pub cycle_pause: DelayRange,

    pub humanizer: Humanizer,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            wait_timeout_secs: 20,
            challenge_timeout_secs: 5,
            stall_ceiling: 30,
            login_load: DelayRange::secs(3, 5),
            field_pause: DelayRange::secs(1, 2),
            step_pause: DelayRange::secs(2, 3),
            challenge_settle: DelayRange::secs(5, 7),
            login_settle: DelayRange::secs(5, 7),
            profile_load: DelayRange::secs(3, 5),
            scroll_pause: DelayRange::secs(2, 3),
            trending_load: DelayRange::secs(5, 7),
            list_settle: DelayRange::secs(2, 3),
            click_pause: DelayRange::secs(1, 2),
            hover_pause: DelayRange::millis(500, 1000),
            topic_settle: DelayRange::secs(5, 8),
            topic_scroll_rounds: (1, 3),
            topic_scroll_pause: DelayRange::secs(2, 4),
            posts_settle: DelayRange::secs(2, 3),
            topic_linger: DelayRange::secs(5, 10),
            return_settle: DelayRange::secs(5, 8),
            cycle_pause: DelayRange::secs(10, 15),
            stall_pause_secs: 30,
            auth_retry_secs: 60,
            fatal_backoff_secs: 60,
            cycle_cooldown_secs: 300,
            humanizer: Humanizer::default(),
        }
    }
}

impl TimingConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub fn challenge_timeout(&self) -> Duration {
        Duration::from_secs(self.challenge_timeout_secs)
    }

    pub fn stall_pause(&self) -> Duration {
        Duration::from_secs(self.stall_pause_secs)
    }

    pub fn auth_retry(&self) -> Duration {
        Duration::from_secs(self.auth_retry_secs)
    }

    pub fn fatal_backoff(&self) -> Duration {
        Duration::from_secs(self.fatal_backoff_secs)
    }

    pub fn cycle_cooldown(&self) -> Duration {
        Duration::from_secs(self.cycle_cooldown_secs)
    }
}
