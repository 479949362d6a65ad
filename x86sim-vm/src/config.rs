//! Simulator configuration, deserialized from JSON. Missing or malformed
//! config is non-fatal: callers fall back to [`SimConfig::default`] and log a
//! warning rather than aborting a run over optional settings.

use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeviceConfig {
    pub name: String,
    pub port: u16,
}

/// One process entry in a multi-process config: the path to the program
/// image to load into its own `Runner`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProcessConfig {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub ui_enabled: bool,
    #[serde(default)]
    pub processes: Vec<ProcessConfig>,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            ui_enabled: false,
            processes: Vec::new(),
            devices: Vec::new(),
        }
    }
}

impl SimConfig {
    /// Parse `text` as JSON config, falling back to defaults (with a logged
    /// warning) on any parse error.
    pub fn from_json(text: &str) -> Self {
        match serde_json::from_str(text) {
            Ok(config) => config,
            Err(err) => {
                warn!(error = %err, "malformed config, falling back to defaults");
                Self::default()
            }
        }
    }
}
