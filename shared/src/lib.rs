//! Data model shared by the dropper server and its tooling.
//!
//! Everything in this crate is plain data: positions, levels, maps and
//! per-player statistics, together with the serde layout used when those
//! records are persisted. No behaviour here touches the host server.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub mod map;
pub mod stats;

pub use map::{DropperMap, Level, LevelPoint};
pub use stats::{MapStats, PlayerStatistics, StatisticsTable};

/// Identity of a player as reported by the host.
pub type PlayerId = uuid::Uuid;

/// Distance from a level's end marker that counts as reaching it.
pub const END_PROXIMITY: f64 = 2.0;
/// Altitude below which a playing player is sent back to safety.
pub const DEFAULT_MIN_ALTITUDE: f64 = -64.0;

/// A position in a named world, with facing.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Location {
    pub world: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(default)]
    pub yaw: f32,
    #[serde(default)]
    pub pitch: f32,
}

impl Location {
    pub fn new(world: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
            yaw: 0.0,
            pitch: 0.0,
        }
    }

    pub fn with_rotation(mut self, yaw: f32, pitch: f32) -> Self {
        self.yaw = yaw;
        self.pitch = pitch;
        self
    }

    /// Straight-line distance, ignoring which world either point is in.
    pub fn distance(&self, other: &Location) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        let dz = other.z - self.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// True when both points share a world and lie within `radius` of each other.
    pub fn is_near(&self, other: &Location, radius: f64) -> bool {
        self.world == other.world && self.distance(other) <= radius
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

/// Formats a run time as `m:ss.mmm`, or `s.mmms` when under a minute.
pub fn format_duration_ms(elapsed_ms: u64) -> String {
    let seconds = elapsed_ms / 1000;
    let minutes = seconds / 60;
    let seconds = seconds % 60;
    let millis = elapsed_ms % 1000;

    if minutes > 0 {
        format!("{}:{:02}.{:03}", minutes, seconds, millis)
    } else {
        format!("{}.{:03}s", seconds, millis)
    }
}
