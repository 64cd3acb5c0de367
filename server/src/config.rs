//! Gameplay and persistence settings.
//!
//! Loaded from `config.json` in the data directory. Every field has a
//! default, so a partial file only overrides what it names.

use crate::error::ConfigError;
use dropper_shared::DEFAULT_MIN_ALTITUDE;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DropperConfig {
    /// Seconds between autosaves; 0 disables autosave.
    pub autosave_interval_seconds: u64,
    pub min_altitude_threshold: f64,
    /// Send players back to their checkpoint when they fall below the threshold.
    pub teleport_on_fall: bool,
    /// 0 makes players immune, otherwise incoming damage is scaled.
    pub damage_multiplier: f64,
    pub clear_inventory_on_start: bool,
    pub restore_inventory_on_stop: bool,
    pub allow_flight_during_session: bool,
    pub stats_enabled: bool,
    pub reward_commands_enabled: bool,
    /// Console commands run on completion. `%player%` and `%map%` are substituted.
    pub reward_commands: Vec<String>,
}

impl Default for DropperConfig {
    fn default() -> Self {
        Self {
            autosave_interval_seconds: 300,
            min_altitude_threshold: DEFAULT_MIN_ALTITUDE,
            teleport_on_fall: true,
            damage_multiplier: 0.0,
            clear_inventory_on_start: true,
            restore_inventory_on_stop: true,
            allow_flight_during_session: false,
            stats_enabled: true,
            reward_commands_enabled: false,
            reward_commands: Vec::new(),
        }
    }
}

impl DropperConfig {
    /// Reads `config.json` from `data_dir`, writing the defaults out if it is missing.
    pub fn load_or_init(data_dir: &Path) -> Result<Self, ConfigError> {
        let path = data_dir.join(CONFIG_FILE);
        let display = path.display().to_string();

        match fs::read(&path) {
            Ok(bytes) => {
                let config = serde_json::from_slice(&bytes).map_err(|source| {
                    ConfigError::Parse {
                        path: display.clone(),
                        source,
                    }
                })?;
                info!("Loaded config from {}", display);
                Ok(config)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let config = Self::default();
                if let Err(e) = config.write(&path) {
                    warn!("Failed to write default config to {}: {}", display, e);
                }
                Ok(config)
            }
            Err(source) => Err(ConfigError::Io {
                path: display,
                source,
            }),
        }
    }

    fn write(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(self).map_err(std::io::Error::from)?;
        fs::write(path, bytes)
    }

    pub fn autosave_interval(&self) -> Option<Duration> {
        (self.autosave_interval_seconds > 0)
            .then(|| Duration::from_secs(self.autosave_interval_seconds))
    }

    /// Reward commands with placeholders filled in.
    pub fn rewards_for(&self, player_name: &str, map_name: &str) -> Vec<String> {
        if !self.reward_commands_enabled {
            return Vec::new();
        }
        self.reward_commands
            .iter()
            .map(|template| {
                template
                    .replace("%player%", player_name)
                    .replace("%map%", map_name)
            })
            .collect()
    }
}
