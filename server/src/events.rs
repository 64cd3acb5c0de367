//! Inbound host events and the outbound effects they produce.
//!
//! The host translates its callbacks (movement, damage, death, respawn,
//! disconnect, teleport) into [`GameEvent`] values. The progression engine
//! answers each with a list of [`Effect`]s that the caller applies against
//! the host, so the engine itself never touches a player directly.

use crate::host::{GameMode, InventorySnapshot};
use dropper_shared::{format_duration_ms, Location, PlayerId};
use std::fmt;

/// Why the host teleported a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeleportCause {
    /// Issued by a plugin, including this one.
    Plugin,
    /// Issued through a command.
    Command,
    EnderPearl,
    Portal,
    Unknown,
}

impl TeleportCause {
    /// Teleports the player did not cause themselves are never policed.
    pub fn is_administrative(self) -> bool {
        matches!(self, TeleportCause::Plugin | TeleportCause::Command)
    }
}

/// Events the host reports for a player.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    Move {
        player: PlayerId,
        to: Location,
    },
    Damage {
        player: PlayerId,
        amount: f64,
        /// Health before the hit lands.
        health: f64,
    },
    Death {
        player: PlayerId,
    },
    Respawn {
        player: PlayerId,
    },
    Disconnect {
        player: PlayerId,
    },
    Kick {
        player: PlayerId,
    },
    Teleport {
        player: PlayerId,
        to: Location,
        cause: TeleportCause,
    },
}

impl GameEvent {
    pub fn player(&self) -> PlayerId {
        match self {
            GameEvent::Move { player, .. }
            | GameEvent::Damage { player, .. }
            | GameEvent::Death { player }
            | GameEvent::Respawn { player }
            | GameEvent::Disconnect { player }
            | GameEvent::Kick { player }
            | GameEvent::Teleport { player, .. } => *player,
        }
    }
}

/// Player-facing notices. Wording lives in the message layer; the
/// `Display` impl is the plain English fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    GameStarted { map: String },
    LevelCompleted { level: u32, next: u32 },
    TeleportedToCheckpoint,
    MapCompleted { map: String, elapsed_ms: u64 },
    GameStopped,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::GameStarted { map } => write!(f, "Started playing {}. Good luck!", map),
            Notice::LevelCompleted { level, next } => {
                write!(f, "Level {} completed! Moving on to level {}.", level, next)
            }
            Notice::TeleportedToCheckpoint => write!(f, "Teleported back to your checkpoint."),
            Notice::MapCompleted { map, elapsed_ms } => write!(
                f,
                "You completed {} in {}!",
                map,
                format_duration_ms(*elapsed_ms)
            ),
            Notice::GameStopped => write!(f, "Your dropper game has been stopped."),
        }
    }
}

/// A side effect for the caller to apply against the host.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Teleport {
        player: PlayerId,
        to: Location,
    },
    ClearInventory {
        player: PlayerId,
    },
    RestoreInventory {
        player: PlayerId,
        inventory: InventorySnapshot,
    },
    SetGameMode {
        player: PlayerId,
        mode: GameMode,
    },
    /// Allow or forbid flight; flying is always switched off.
    SetFlight {
        player: PlayerId,
        allowed: bool,
    },
    /// Refill health and hunger.
    RestoreVitals {
        player: PlayerId,
    },
    SetRespawnPoint {
        player: PlayerId,
        at: Location,
    },
    /// Cancel the event being handled.
    CancelEvent,
    /// Replace the damage of the event being handled.
    SetDamage {
        amount: f64,
    },
    /// Run a command on the host console.
    DispatchCommand {
        command: String,
    },
    Notify {
        player: PlayerId,
        notice: Notice,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_administrative_causes() {
        assert!(TeleportCause::Plugin.is_administrative());
        assert!(TeleportCause::Command.is_administrative());
        assert!(!TeleportCause::EnderPearl.is_administrative());
        assert!(!TeleportCause::Portal.is_administrative());
        assert!(!TeleportCause::Unknown.is_administrative());
    }

    #[test]
    fn test_event_player() {
        let id = PlayerId::new_v4();
        let events = vec![
            GameEvent::Move {
                player: id,
                to: Location::new("world", 0.0, 0.0, 0.0),
            },
            GameEvent::Damage {
                player: id,
                amount: 4.0,
                health: 20.0,
            },
            GameEvent::Death { player: id },
            GameEvent::Respawn { player: id },
            GameEvent::Disconnect { player: id },
            GameEvent::Kick { player: id },
            GameEvent::Teleport {
                player: id,
                to: Location::new("world", 0.0, 0.0, 0.0),
                cause: TeleportCause::Portal,
            },
        ];
        for event in events {
            assert_eq!(event.player(), id);
        }
    }

    #[test]
    fn test_notice_text() {
        let notice = Notice::MapCompleted {
            map: "Test".to_string(),
            elapsed_ms: 61_005,
        };
        assert_eq!(notice.to_string(), "You completed Test in 1:01.005!");
        assert_eq!(
            Notice::LevelCompleted { level: 1, next: 2 }.to_string(),
            "Level 1 completed! Moving on to level 2."
        );
    }
}
