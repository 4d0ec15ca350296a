//! Persistent user preferences, stored as TOML via `confy`.
//!
//! Mirrors `AppConfig::load`/`save` from the teacher's `src/config.rs`: a
//! versioned struct confy serializes to the platform config directory, with
//! `#[serde(default = ...)]` on every field so old config files deserialize
//! cleanly as fields are added. This is a fresh schema (version 1) with no
//! legacy format to migrate from.

use serde::{Deserialize, Serialize};

const APP_NAME: &str = "sdr-cli";
const CONFIG_NAME: &str = "config";

fn default_config_version() -> u32 {
    1
}

fn default_squelch_db() -> f64 {
    -60.0
}

fn default_audio_rate() -> f64 {
    16_000.0
}

fn default_bundle_root() -> String {
    "runs".to_string()
}

fn default_sample_rate_hz() -> f64 {
    2.5e5
}

/// The last frequency plan the user ran, persisted so `sdr-cli run` with no
/// arguments resumes where the user left off.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedPlan {
    #[serde(default)]
    pub start_hz: f64,
    #[serde(default)]
    pub stop_hz: f64,
    #[serde(default)]
    pub step_hz: f64,
}

impl Default for PersistedPlan {
    fn default() -> Self {
        Self { start_hz: 100.0e6, stop_hz: 101.0e6, step_hz: 0.2e6 }
    }
}

/// Application configuration stored in TOML format at the platform config
/// directory (`confy::get_configuration_file_path`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configuration schema version, for forward migrations.
    #[serde(default = "default_config_version")]
    pub config_version: u32,

    /// Last-used frequency plan.
    #[serde(default)]
    pub plan: PersistedPlan,

    /// Default squelch threshold in dBFS.
    #[serde(default = "default_squelch_db")]
    pub squelch_db: f64,

    /// Default nominal sample rate in Hz.
    #[serde(default = "default_sample_rate_hz")]
    pub sample_rate_hz: f64,

    /// Default demodulated audio rate in Hz.
    #[serde(default = "default_audio_rate")]
    pub audio_rate: f64,

    /// Directory event bundles are written under.
    #[serde(default = "default_bundle_root")]
    pub bundle_root: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_version: default_config_version(),
            plan: PersistedPlan::default(),
            squelch_db: default_squelch_db(),
            sample_rate_hz: default_sample_rate_hz(),
            audio_rate: default_audio_rate(),
            bundle_root: default_bundle_root(),
        }
    }
}

impl AppConfig {
    /// Load configuration from disk, falling back to defaults if absent.
    pub fn load() -> Result<Self, confy::ConfyError> {
        confy::load(APP_NAME, CONFIG_NAME)
    }

    /// Persist configuration to disk.
    pub fn save(&self) -> Result<(), confy::ConfyError> {
        confy::store(APP_NAME, CONFIG_NAME, self)
    }

    /// The on-disk path of the config file, for display to the user.
    pub fn config_path() -> Result<std::path::PathBuf, confy::ConfyError> {
        confy::get_configuration_file_path(APP_NAME, CONFIG_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_current_schema_version() {
        assert_eq!(AppConfig::default().config_version, 1);
    }

    #[test]
    fn default_plan_is_fm_broadcast_band_slice() {
        let plan = PersistedPlan::default();
        assert!(plan.start_hz < plan.stop_hz);
        assert!(plan.step_hz > 0.0);
    }
}
