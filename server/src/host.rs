//! Capabilities the dropper core needs from the host game server.
//!
//! The core never reaches into host entities itself. It captures a
//! [`PlayerSnapshot`] when a session starts and afterwards only emits
//! [`Effect`]s, which [`apply_effects`] replays against a [`Host`].

use crate::events::{Effect, Notice};
use dropper_shared::{Location, PlayerId};
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameMode {
    Survival,
    Creative,
    Adventure,
    Spectator,
}

impl GameMode {
    /// Modes in which the host lets players fly.
    pub fn allows_flight(self) -> bool {
        matches!(self, GameMode::Creative | GameMode::Spectator)
    }
}

/// Host-encoded inventory contents. Opaque to the core.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventorySnapshot(Vec<u8>);

impl InventorySnapshot {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Player state captured before a session changes anything.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    pub name: String,
    pub location: Location,
    pub game_mode: GameMode,
    pub inventory: InventorySnapshot,
}

/// One online player as the host exposes it.
pub trait PlayerHandle {
    fn id(&self) -> PlayerId;
    fn name(&self) -> &str;
    fn location(&self) -> Location;
    fn game_mode(&self) -> GameMode;
    fn inventory_snapshot(&self) -> InventorySnapshot;

    fn teleport(&mut self, to: &Location);
    fn set_game_mode(&mut self, mode: GameMode);
    fn set_allow_flight(&mut self, allowed: bool);
    fn set_flying(&mut self, flying: bool);
    fn clear_inventory(&mut self);
    fn restore_inventory(&mut self, snapshot: &InventorySnapshot);
    fn restore_vitals(&mut self);
    fn set_respawn_location(&mut self, at: &Location);
    fn send_notice(&mut self, notice: &Notice);

    fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            id: self.id(),
            name: self.name().to_string(),
            location: self.location(),
            game_mode: self.game_mode(),
            inventory: self.inventory_snapshot(),
        }
    }
}

/// The host server: player lookup plus console access.
pub trait Host {
    /// An online player, or `None` once they have left.
    fn player_mut(&mut self, id: &PlayerId) -> Option<&mut dyn PlayerHandle>;

    fn dispatch_command(&mut self, command: &str);
}

/// What should happen to the host event that produced the effects.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EventVerdict {
    pub cancelled: bool,
    /// Replacement damage for a damage event.
    pub damage: Option<f64>,
}

/// Replays effects against the host in order.
///
/// Effects aimed at players the host no longer knows are dropped, which makes
/// teardown of sessions for departed players best-effort.
pub fn apply_effects<H: Host + ?Sized>(host: &mut H, effects: Vec<Effect>) -> EventVerdict {
    let mut verdict = EventVerdict::default();

    for effect in effects {
        let target = match &effect {
            Effect::CancelEvent => {
                verdict.cancelled = true;
                continue;
            }
            Effect::SetDamage { amount } => {
                verdict.damage = Some(*amount);
                continue;
            }
            Effect::DispatchCommand { command } => {
                host.dispatch_command(command);
                continue;
            }
            Effect::Teleport { player, .. }
            | Effect::ClearInventory { player }
            | Effect::RestoreInventory { player, .. }
            | Effect::SetGameMode { player, .. }
            | Effect::SetFlight { player, .. }
            | Effect::RestoreVitals { player }
            | Effect::SetRespawnPoint { player, .. }
            | Effect::Notify { player, .. } => *player,
        };

        let Some(handle) = host.player_mut(&target) else {
            debug!("Dropping {:?} for offline player {}", effect, target);
            continue;
        };

        match effect {
            Effect::Teleport { to, .. } => handle.teleport(&to),
            Effect::ClearInventory { .. } => handle.clear_inventory(),
            Effect::RestoreInventory { inventory, .. } => handle.restore_inventory(&inventory),
            Effect::SetGameMode { mode, .. } => handle.set_game_mode(mode),
            Effect::SetFlight { allowed, .. } => {
                handle.set_allow_flight(allowed);
                handle.set_flying(false);
            }
            Effect::RestoreVitals { .. } => handle.restore_vitals(),
            Effect::SetRespawnPoint { at, .. } => handle.set_respawn_location(&at),
            Effect::Notify { notice, .. } => handle.send_notice(&notice),
            Effect::CancelEvent | Effect::SetDamage { .. } | Effect::DispatchCommand { .. } => {}
        }
    }

    verdict
}
