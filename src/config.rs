//! User settings from `config.toml` in the config directory
//!
//! Every field is optional; a missing file means defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Settings file name inside the config directory
pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub submit: SubmitSettings,
    pub execute: ExecuteSettings,
    pub state: StateSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmitSettings {
    /// Base URL; the plan is posted to `<endpoint>/plan`
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
}

impl Default for SubmitSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecuteSettings {
    pub jobs: usize,
    /// Overall budget for a run, unlimited when unset
    pub timeout_secs: Option<f64>,
}

impl Default for ExecuteSettings {
    fn default() -> Self {
        Self {
            jobs: 4,
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateSettings {
    /// State file written next to the plan file
    pub file_name: String,
}

impl Default for StateSettings {
    fn default() -> Self {
        Self {
            file_name: ".plan_state.json".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from the config directory
    pub fn load() -> Result<Self> {
        let dir = crate::paths::config_dir()?;
        Self::load_from(&dir.join(CONFIG_FILE))
    }

    /// Load settings from a file, defaults when it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        let settings: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse settings: {}", path.display()))?;

        log::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }
}

/// Convert a seconds flag into a duration, rejecting negative or non-finite values
pub fn seconds(value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .with_context(|| format!("Invalid timeout: {value} seconds"))
}
