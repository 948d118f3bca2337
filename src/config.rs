//! TOML configuration.
//!
//! Every section except `[db]` is optional and falls back to the defaults
//! used by the import pipeline.

use anyhow::{Context, Result};
use chrono::Duration;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use dayline_core::models::{SleepStage, SIGNAL_PULSE, SIGNAL_SLEEP_STAGES, SIGNAL_SPO2};
use dayline_core::reconcile::ReconcileOptions;
use dayline_core::splice::FillerPolicy;

/// Largest accepted `import.merge_gap_minutes`: one week.
pub const MAX_MERGE_GAP_MINUTES: i64 = 7 * 24 * 60;
/// Largest accepted `import.margin_days` and `import.lookback_days`.
pub const MAX_WINDOW_DAYS: i64 = 3650;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub profile: ProfileConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub oximetry: OximetryConfig,
    #[serde(default)]
    pub connectors: ConnectorsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProfileConfig {
    #[serde(default = "default_profile_id")]
    pub id: i64,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            id: default_profile_id(),
        }
    }
}

fn default_profile_id() -> i64 {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct ImportConfig {
    #[serde(default = "default_merge_gap_minutes")]
    pub merge_gap_minutes: i64,
    #[serde(default = "default_margin_days")]
    pub margin_days: i64,
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
    #[serde(default = "default_recompute_signals")]
    pub recompute_signals: Vec<String>,
    #[serde(default = "default_fillers")]
    pub fillers: HashMap<String, f64>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            merge_gap_minutes: default_merge_gap_minutes(),
            margin_days: default_margin_days(),
            lookback_days: default_lookback_days(),
            recompute_signals: default_recompute_signals(),
            fillers: default_fillers(),
        }
    }
}

fn default_merge_gap_minutes() -> i64 {
    60
}
fn default_margin_days() -> i64 {
    1
}
fn default_lookback_days() -> i64 {
    30
}
fn default_recompute_signals() -> Vec<String> {
    vec![SIGNAL_SPO2.to_string(), SIGNAL_PULSE.to_string()]
}
fn default_fillers() -> HashMap<String, f64> {
    HashMap::from([(SIGNAL_SLEEP_STAGES.to_string(), SleepStage::Awake.value())])
}

impl ImportConfig {
    pub fn merge_gap(&self) -> Duration {
        Duration::minutes(self.merge_gap_minutes)
    }

    pub fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            fillers: FillerPolicy::from(self.fillers.clone()),
            recompute_signals: self.recompute_signals.clone(),
        }
    }
}

/// Adjustments applied when decoding pulse-oximetry exports.
#[derive(Debug, Deserialize, Clone)]
pub struct OximetryConfig {
    /// Added to every SpO2 sample.
    #[serde(default = "default_calibration_adjust")]
    pub calibration_adjust: f64,
    /// Added to the recording start time.
    #[serde(default = "default_time_adjust_secs")]
    pub time_adjust_secs: i64,
    #[serde(default)]
    pub events: OximetryEventConfig,
}

impl Default for OximetryConfig {
    fn default() -> Self {
        Self {
            calibration_adjust: default_calibration_adjust(),
            time_adjust_secs: default_time_adjust_secs(),
            events: OximetryEventConfig::default(),
        }
    }
}

fn default_calibration_adjust() -> f64 {
    -1.0
}
fn default_time_adjust_secs() -> i64 {
    -60
}

/// Thresholds for the events derived from decoded oximetry signals.
///
/// Each sample is compared with the mean of the valid samples in the
/// preceding `baseline_window_secs`.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct OximetryEventConfig {
    #[serde(default = "default_events_enabled")]
    pub enabled: bool,
    #[serde(default = "default_baseline_window_secs")]
    pub baseline_window_secs: f64,
    /// SpO2 points below baseline that count as a desaturation.
    #[serde(default = "default_desaturation_drop")]
    pub desaturation_drop: f64,
    #[serde(default = "default_desaturation_min_secs")]
    pub desaturation_min_secs: f64,
    /// Beats per minute away from baseline, in either direction.
    #[serde(default = "default_pulse_change_delta")]
    pub pulse_change_delta: f64,
    #[serde(default = "default_pulse_change_min_secs")]
    pub pulse_change_min_secs: f64,
}

impl Default for OximetryEventConfig {
    fn default() -> Self {
        Self {
            enabled: default_events_enabled(),
            baseline_window_secs: default_baseline_window_secs(),
            desaturation_drop: default_desaturation_drop(),
            desaturation_min_secs: default_desaturation_min_secs(),
            pulse_change_delta: default_pulse_change_delta(),
            pulse_change_min_secs: default_pulse_change_min_secs(),
        }
    }
}

fn default_events_enabled() -> bool {
    true
}
fn default_baseline_window_secs() -> f64 {
    120.0
}
fn default_desaturation_drop() -> f64 {
    3.0
}
fn default_desaturation_min_secs() -> f64 {
    10.0
}
fn default_pulse_change_delta() -> f64 {
    20.0
}
fn default_pulse_change_min_secs() -> f64 {
    10.0
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConnectorsConfig {
    pub filesystem: Option<FilesystemConnectorConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilesystemConnectorConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.json".to_string(), "**/*.csv".to_string()]
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config = parse_config(&content)?;
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate import
    if !(1..=MAX_MERGE_GAP_MINUTES).contains(&config.import.merge_gap_minutes) {
        anyhow::bail!(
            "import.merge_gap_minutes must be between 1 and {}",
            MAX_MERGE_GAP_MINUTES
        );
    }
    if !(1..=MAX_WINDOW_DAYS).contains(&config.import.margin_days) {
        anyhow::bail!("import.margin_days must be between 1 and {}", MAX_WINDOW_DAYS);
    }
    if !(0..=MAX_WINDOW_DAYS).contains(&config.import.lookback_days) {
        anyhow::bail!(
            "import.lookback_days must be between 0 and {}",
            MAX_WINDOW_DAYS
        );
    }
    if config.import.recompute_signals.iter().any(|s| s.trim().is_empty()) {
        anyhow::bail!("import.recompute_signals must not contain empty names");
    }
    for (signal, filler) in &config.import.fillers {
        if !filler.is_finite() {
            anyhow::bail!("import.fillers.\"{}\" must be a finite number", signal);
        }
    }

    // Validate oximetry
    if !config.oximetry.calibration_adjust.is_finite() {
        anyhow::bail!("oximetry.calibration_adjust must be a finite number");
    }
    let events = &config.oximetry.events;
    for (name, value) in [
        ("baseline_window_secs", events.baseline_window_secs),
        ("desaturation_drop", events.desaturation_drop),
        ("pulse_change_delta", events.pulse_change_delta),
    ] {
        if !(value.is_finite() && value > 0.0) {
            anyhow::bail!("oximetry.events.{} must be a positive number", name);
        }
    }
    for (name, value) in [
        ("desaturation_min_secs", events.desaturation_min_secs),
        ("pulse_change_min_secs", events.pulse_change_min_secs),
    ] {
        if !(value.is_finite() && value >= 0.0) {
            anyhow::bail!("oximetry.events.{} must be >= 0", name);
        }
    }

    Ok(config)
}
