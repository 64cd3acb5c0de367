//! Per-player statistics table and its bulk persistence.

use crate::error::{DropperError, StorageError};
use crate::storage::{Collection, Storage, STATISTICS_KEY};
use dropper_shared::{MapStats, PlayerId, PlayerStatistics, StatisticsTable};
use log::{info, warn};
use std::fmt;

/// Formatted read-out of one player's record on one map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapStatsView {
    pub plays: u32,
    pub completions: u32,
    /// `m:ss.mmm`, `s.mmms`, or `N/A` before the first completion
    pub best_time: String,
}

impl From<MapStats> for MapStatsView {
    fn from(stats: MapStats) -> Self {
        Self {
            plays: stats.plays,
            completions: stats.completions,
            best_time: stats.formatted_best_time(),
        }
    }
}

impl fmt::Display for MapStatsView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Plays: {} | Completions: {} | Best time: {}",
            self.plays, self.completions, self.best_time
        )
    }
}

pub struct StatisticsStore {
    table: StatisticsTable,
    storage: Box<dyn Storage>,
}

impl StatisticsStore {
    pub fn new(storage: impl Storage + 'static) -> Self {
        Self {
            table: StatisticsTable::new(),
            storage: Box::new(storage),
        }
    }

    /// Replaces the in-memory table with the stored one.
    ///
    /// A table that fails to decode is logged and the store starts empty.
    /// Returns the number of players loaded.
    pub fn load_all(&mut self) -> usize {
        self.table.clear();

        let bytes = match self.storage.read(Collection::Statistics, STATISTICS_KEY) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return 0,
            Err(e) => {
                warn!("Failed to load statistics: {}", e);
                return 0;
            }
        };

        match serde_json::from_slice::<StatisticsTable>(&bytes) {
            Ok(mut table) => {
                for (id, stats) in table.iter_mut() {
                    stats.player_id = *id;
                }
                self.table = table;
                info!("Loaded statistics for {} player(s)", self.table.len());
                self.table.len()
            }
            Err(e) => {
                warn!("Failed to load statistics: {}", e);
                0
            }
        }
    }

    /// Writes the whole table.
    pub fn save_all(&mut self) -> Result<(), DropperError> {
        let bytes = serde_json::to_vec_pretty(&self.table).map_err(|source| {
            StorageError::Encode {
                key: STATISTICS_KEY.to_string(),
                source,
            }
        })?;
        self.storage
            .write(Collection::Statistics, STATISTICS_KEY, &bytes)?;
        Ok(())
    }

    /// Returns the player's record, creating an empty one on first access.
    pub fn get_or_create(&mut self, player: PlayerId) -> &mut PlayerStatistics {
        self.table
            .entry(player)
            .or_insert_with(|| PlayerStatistics::new(player))
    }

    pub fn get(&self, player: &PlayerId) -> Option<&PlayerStatistics> {
        self.table.get(player)
    }

    pub fn record_play(&mut self, player: PlayerId, map_name: &str) {
        self.get_or_create(player).record_play(map_name);
    }

    pub fn record_completion(&mut self, player: PlayerId, map_name: &str, elapsed_ms: u64) {
        self.get_or_create(player)
            .record_completion(map_name, elapsed_ms);
    }

    /// Counters for one map. Never creates a record.
    pub fn map_stats(&self, player: &PlayerId, map_name: &str) -> MapStats {
        self.table
            .get(player)
            .map(|stats| stats.stats(map_name))
            .unwrap_or_default()
    }

    pub fn map_stats_view(&self, player: &PlayerId, map_name: &str) -> MapStatsView {
        self.map_stats(player, map_name).into()
    }

    /// Number of players with a record.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
