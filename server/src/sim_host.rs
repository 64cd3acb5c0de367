//! In-process stand-in for the host game server.
//!
//! Used by the console binary and by tests. Players are plain structs;
//! inventories are lists of item stacks that are snapshotted with bincode,
//! the same way a real host would hand the core an opaque blob.

use crate::events::Notice;
use crate::host::{GameMode, Host, InventorySnapshot, PlayerHandle};
use bincode::{deserialize, serialize};
use dropper_shared::{Location, PlayerId};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const MAX_HEALTH: f64 = 20.0;
pub const MAX_FOOD: u32 = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub material: String,
    pub amount: u32,
}

impl ItemStack {
    pub fn new(material: impl Into<String>, amount: u32) -> Self {
        Self {
            material: material.into(),
            amount,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimPlayer {
    pub id: PlayerId,
    pub name: String,
    pub location: Location,
    pub game_mode: GameMode,
    pub allow_flight: bool,
    pub flying: bool,
    pub inventory: Vec<ItemStack>,
    pub health: f64,
    pub food: u32,
    pub respawn_location: Option<Location>,
    /// Every notice sent to this player, oldest first
    pub notices: Vec<Notice>,
}

impl SimPlayer {
    pub fn new(id: PlayerId, name: impl Into<String>, location: Location) -> Self {
        Self {
            id,
            name: name.into(),
            location,
            game_mode: GameMode::Survival,
            allow_flight: false,
            flying: false,
            inventory: Vec::new(),
            health: MAX_HEALTH,
            food: MAX_FOOD,
            respawn_location: None,
            notices: Vec::new(),
        }
    }
}

impl PlayerHandle for SimPlayer {
    fn id(&self) -> PlayerId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn location(&self) -> Location {
        self.location.clone()
    }

    fn game_mode(&self) -> GameMode {
        self.game_mode
    }

    fn inventory_snapshot(&self) -> InventorySnapshot {
        match serialize(&self.inventory) {
            Ok(bytes) => InventorySnapshot::new(bytes),
            Err(e) => {
                warn!("Failed to snapshot inventory of {}: {}", self.name, e);
                InventorySnapshot::default()
            }
        }
    }

    fn teleport(&mut self, to: &Location) {
        self.location = to.clone();
    }

    fn set_game_mode(&mut self, mode: GameMode) {
        self.game_mode = mode;
    }

    fn set_allow_flight(&mut self, allowed: bool) {
        self.allow_flight = allowed;
        if !allowed {
            self.flying = false;
        }
    }

    fn set_flying(&mut self, flying: bool) {
        self.flying = flying && self.allow_flight;
    }

    fn clear_inventory(&mut self) {
        self.inventory.clear();
    }

    fn restore_inventory(&mut self, snapshot: &InventorySnapshot) {
        if snapshot.as_bytes().is_empty() {
            self.inventory.clear();
            return;
        }
        match deserialize::<Vec<ItemStack>>(snapshot.as_bytes()) {
            Ok(items) => self.inventory = items,
            Err(e) => warn!("Failed to restore inventory of {}: {}", self.name, e),
        }
    }

    fn restore_vitals(&mut self) {
        self.health = MAX_HEALTH;
        self.food = MAX_FOOD;
    }

    fn set_respawn_location(&mut self, at: &Location) {
        self.respawn_location = Some(at.clone());
    }

    fn send_notice(&mut self, notice: &Notice) {
        info!("[{}] {}", self.name, notice);
        self.notices.push(notice.clone());
    }
}

/// A host with a set of online players and a recording console.
#[derive(Debug, Default)]
pub struct SimHost {
    players: HashMap<PlayerId, SimPlayer>,
    dispatched: Vec<String>,
}

impl SimHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Brings a new player online and returns their identity.
    pub fn join(&mut self, name: &str, location: Location) -> PlayerId {
        let id = PlayerId::new_v4();
        self.join_as(id, name, location);
        id
    }

    /// Brings a player online under an identity chosen by the caller.
    pub fn join_as(&mut self, id: PlayerId, name: &str, location: Location) {
        self.players.insert(id, SimPlayer::new(id, name, location));
        info!("{} joined as {}", name, id);
    }

    pub fn leave(&mut self, id: &PlayerId) -> Option<SimPlayer> {
        self.players.remove(id)
    }

    pub fn player(&self, id: &PlayerId) -> Option<&SimPlayer> {
        self.players.get(id)
    }

    pub fn sim_player_mut(&mut self, id: &PlayerId) -> Option<&mut SimPlayer> {
        self.players.get_mut(id)
    }

    /// Console commands dispatched so far, oldest first.
    pub fn dispatched(&self) -> &[String] {
        &self.dispatched
    }

    pub fn online_count(&self) -> usize {
        self.players.len()
    }
}

impl Host for SimHost {
    fn player_mut(&mut self, id: &PlayerId) -> Option<&mut dyn PlayerHandle> {
        self.players
            .get_mut(id)
            .map(|player| player as &mut dyn PlayerHandle)
    }

    fn dispatch_command(&mut self, command: &str) {
        info!("Console: {}", command);
        self.dispatched.push(command.to_string());
    }
}
