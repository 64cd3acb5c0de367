//! Courses and the numbered levels they are made of.

use crate::{now_millis, Location};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which marker of a level an editing command sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelPoint {
    Start,
    End,
}

/// One numbered segment of a map.
///
/// A level is playable once both its start and end markers are placed. The
/// checkpoint is optional; recovery falls back to the start when it is unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Level {
    #[serde(default)]
    pub level_number: u32,
    #[serde(rename = "startLocation")]
    pub start: Option<Location>,
    #[serde(rename = "endLocation")]
    pub end: Option<Location>,
    #[serde(rename = "checkpointLocation")]
    pub checkpoint: Option<Location>,
}

impl Level {
    pub fn new(level_number: u32) -> Self {
        Self {
            level_number,
            start: None,
            end: None,
            checkpoint: None,
        }
    }

    pub fn with_points(level_number: u32, start: Location, end: Location) -> Self {
        Self {
            level_number,
            start: Some(start),
            end: Some(end),
            checkpoint: None,
        }
    }

    pub fn set_point(&mut self, point: LevelPoint, location: Location) {
        match point {
            LevelPoint::Start => self.start = Some(location),
            LevelPoint::End => self.end = Some(location),
        }
    }

    pub fn has_checkpoint(&self) -> bool {
        self.checkpoint.is_some()
    }

    pub fn is_complete(&self) -> bool {
        self.start.is_some() && self.end.is_some()
    }

    /// Where a player on this level is sent after a fall or a death.
    pub fn recovery_point(&self) -> Option<&Location> {
        self.checkpoint.as_ref().or(self.start.as_ref())
    }
}

/// A named course made of levels keyed by their number.
///
/// Level numbers start at 1 but need not be contiguous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropperMap {
    pub name: String,
    pub creator: String,
    #[serde(rename = "createdDate")]
    pub created_at: u64,
    #[serde(default)]
    levels: BTreeMap<u32, Level>,
}

impl DropperMap {
    pub fn new(name: impl Into<String>, creator: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            creator: creator.into(),
            created_at: now_millis(),
            levels: BTreeMap::new(),
        }
    }

    /// Case-insensitive catalog key for a map name.
    pub fn key_for(name: &str) -> String {
        name.to_lowercase()
    }

    pub fn key(&self) -> String {
        Self::key_for(&self.name)
    }

    /// Decodes a persisted map record.
    ///
    /// The key of the `levels` object is authoritative for the level number.
    /// A record containing level 0 is rejected.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let mut map: DropperMap = serde_json::from_slice(bytes)?;
        if map.levels.contains_key(&0) {
            return Err(serde::de::Error::custom("level numbers start at 1"));
        }
        for (number, level) in map.levels.iter_mut() {
            level.level_number = *number;
        }
        Ok(map)
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    pub fn add_level(&mut self, level: Level) {
        self.levels.insert(level.level_number, level);
    }

    pub fn level(&self, level_number: u32) -> Option<&Level> {
        self.levels.get(&level_number)
    }

    pub fn level_mut(&mut self, level_number: u32) -> Option<&mut Level> {
        self.levels.get_mut(&level_number)
    }

    /// Returns the level, creating an empty one on first reference.
    pub fn level_or_create(&mut self, level_number: u32) -> &mut Level {
        self.levels
            .entry(level_number)
            .or_insert_with(|| Level::new(level_number))
    }

    pub fn has_level(&self, level_number: u32) -> bool {
        self.levels.contains_key(&level_number)
    }

    pub fn remove_level(&mut self, level_number: u32) -> Option<Level> {
        self.levels.remove(&level_number)
    }

    pub fn levels(&self) -> impl Iterator<Item = &Level> {
        self.levels.values()
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn max_level(&self) -> u32 {
        self.levels.keys().next_back().copied().unwrap_or(0)
    }

    pub fn sorted_level_numbers(&self) -> Vec<u32> {
        self.levels.keys().copied().collect()
    }

    pub fn is_complete(&self) -> bool {
        !self.levels.is_empty() && self.levels.values().all(Level::is_complete)
    }

    /// Whether a session can begin on this map: complete, with a level 1.
    pub fn is_playable(&self) -> bool {
        self.is_complete() && self.has_level(1)
    }

    /// True when any level's start marker lies in `world`.
    pub fn contains_world(&self, world: &str) -> bool {
        self.levels
            .values()
            .filter_map(|level| level.start.as_ref())
            .any(|start| start.world == world)
    }
}
