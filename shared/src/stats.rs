//! Per-player, per-map play statistics.

use crate::{format_duration_ms, PlayerId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The whole persisted statistics table, keyed by player identity.
pub type StatisticsTable = BTreeMap<PlayerId, PlayerStatistics>;

/// Aggregate counters for one player on one map.
///
/// `best_time` is in milliseconds; 0 means no completion yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapStats {
    #[serde(default)]
    pub plays: u32,
    #[serde(default)]
    pub completions: u32,
    #[serde(default)]
    pub best_time: u64,
}

impl MapStats {
    pub fn record_play(&mut self) {
        self.plays = self.plays.saturating_add(1);
    }

    /// Counts a completion and keeps the lower of the old and new best time.
    pub fn record_completion(&mut self, elapsed_ms: u64) {
        self.completions = self.completions.saturating_add(1);
        if self.best_time == 0 || elapsed_ms < self.best_time {
            self.best_time = elapsed_ms;
        }
    }

    pub fn has_best_time(&self) -> bool {
        self.best_time != 0
    }

    pub fn formatted_best_time(&self) -> String {
        if self.has_best_time() {
            format_duration_ms(self.best_time)
        } else {
            "N/A".to_string()
        }
    }
}

/// All map statistics for a single player.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStatistics {
    /// Carried by the table key when persisted.
    #[serde(skip)]
    pub player_id: PlayerId,
    #[serde(default)]
    map_stats: BTreeMap<String, MapStats>,
}

impl PlayerStatistics {
    pub fn new(player_id: PlayerId) -> Self {
        Self {
            player_id,
            map_stats: BTreeMap::new(),
        }
    }

    /// Read-only view; an unplayed map reports zeroed counters.
    pub fn stats(&self, map_name: &str) -> MapStats {
        self.map_stats.get(map_name).copied().unwrap_or_default()
    }

    /// Returns the entry for `map_name`, creating it on first use.
    pub fn stats_or_create(&mut self, map_name: &str) -> &mut MapStats {
        self.map_stats.entry(map_name.to_string()).or_default()
    }

    pub fn record_play(&mut self, map_name: &str) {
        self.stats_or_create(map_name).record_play();
    }

    pub fn record_completion(&mut self, map_name: &str, elapsed_ms: u64) {
        self.stats_or_create(map_name).record_completion(elapsed_ms);
    }

    pub fn maps(&self) -> impl Iterator<Item = (&String, &MapStats)> {
        self.map_stats.iter()
    }
}
