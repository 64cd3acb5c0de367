//! Active play sessions, at most one per player
//!
//! This module handles the bookkeeping side of a dropper run:
//! - The per-player session record (map, level, timer, saved player state)
//! - Registration and removal of sessions
//! - Enumeration for shutdown
//!
//! The registry does not validate maps or touch the player; that is the
//! progression engine's job.

use crate::error::DropperError;
use crate::host::{GameMode, InventorySnapshot, PlayerSnapshot};
use dropper_shared::{format_duration_ms, now_millis, DropperMap, Location, PlayerId};
use log::info;
use std::collections::HashMap;

/// One player's attempt at a map
///
/// A session refers to its map by name and catalog generation rather than
/// holding it, so edits to the map made while it is being played are visible
/// on the next event, while a deleted and recreated map is not mistaken for
/// the one being played.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub player_id: PlayerId,
    pub player_name: String,
    /// Map name as it was when the session started
    pub map_name: String,
    /// Catalog generation of the map when the session started
    pub map_generation: u64,
    /// Level the player is on, starting at 1
    pub current_level: u32,
    /// Epoch milliseconds when the session started
    pub start_time: u64,
    /// Where the player stood before starting
    pub return_location: Location,
    pub saved_game_mode: GameMode,
    pub saved_inventory: InventorySnapshot,
}

impl Session {
    /// Creates a session on level 1 with the timer started now
    pub fn new(snapshot: PlayerSnapshot, map_name: &str, map_generation: u64) -> Self {
        Self {
            player_id: snapshot.id,
            player_name: snapshot.name,
            map_name: map_name.to_string(),
            map_generation,
            current_level: 1,
            start_time: now_millis(),
            return_location: snapshot.location,
            saved_game_mode: snapshot.game_mode,
            saved_inventory: snapshot.inventory,
        }
    }

    /// Catalog key of the map being played
    pub fn map_key(&self) -> String {
        DropperMap::key_for(&self.map_name)
    }

    /// Moves on to the next level and returns its number
    pub fn next_level(&mut self) -> u32 {
        self.current_level += 1;
        self.current_level
    }

    /// Milliseconds since the session started
    pub fn elapsed_ms(&self) -> u64 {
        now_millis().saturating_sub(self.start_time)
    }

    pub fn formatted_time(&self) -> String {
        format_duration_ms(self.elapsed_ms())
    }
}

/// Tracks all active sessions keyed by player
///
/// Not thread-safe; the host calls it from its single logic thread.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<PlayerId, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new session for the snapshotted player
    ///
    /// Fails with `AlreadyActive` if the player is already playing; the
    /// existing session is left untouched.
    pub fn start(
        &mut self,
        snapshot: PlayerSnapshot,
        map: &DropperMap,
        map_generation: u64,
    ) -> Result<&mut Session, DropperError> {
        let player_id = snapshot.id;
        if self.sessions.contains_key(&player_id) {
            return Err(DropperError::AlreadyActive);
        }

        let session = Session::new(snapshot, &map.name, map_generation);
        info!(
            "{} ({}) started a session on {}",
            session.player_name, player_id, map.name
        );
        Ok(self.sessions.entry(player_id).or_insert(session))
    }

    /// Removes and returns the player's session
    ///
    /// The caller restores the player from the returned session if needed.
    pub fn stop(&mut self, player: &PlayerId) -> Option<Session> {
        let session = self.sessions.remove(player)?;
        info!(
            "{} ({}) left their session on {}",
            session.player_name, player, session.map_name
        );
        Some(session)
    }

    pub fn get(&self, player: &PlayerId) -> Option<&Session> {
        self.sessions.get(player)
    }

    pub fn get_mut(&mut self, player: &PlayerId) -> Option<&mut Session> {
        self.sessions.get_mut(player)
    }

    pub fn contains(&self, player: &PlayerId) -> bool {
        self.sessions.contains_key(player)
    }

    /// Players with an active session
    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.sessions.keys().copied().collect()
    }

    /// Players with a session on the named map, in any letter case
    pub fn players_on_map(&self, map_name: &str) -> Vec<PlayerId> {
        let key = DropperMap::key_for(map_name);
        self.sessions
            .values()
            .filter(|session| session.map_key() == key)
            .map(|session| session.player_id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn snapshot(name: &str) -> PlayerSnapshot {
        PlayerSnapshot {
            id: PlayerId::new_v4(),
            name: name.to_string(),
            location: Location::new("lobby", 0.0, 64.0, 0.0),
            game_mode: GameMode::Survival,
            inventory: InventorySnapshot::new(vec![1, 2, 3]),
        }
    }

    fn test_map() -> DropperMap {
        DropperMap::new("Test", "Steve")
    }

    #[test]
    fn test_session_creation() {
        let snap = snapshot("Steve");
        let session = Session::new(snap.clone(), "Test", 1);

        assert_eq!(session.player_id, snap.id);
        assert_eq!(session.current_level, 1);
        assert_eq!(session.return_location, snap.location);
        assert_eq!(session.saved_game_mode, GameMode::Survival);
        assert_eq!(session.saved_inventory, snap.inventory);
        assert_eq!(session.map_key(), "test");
        assert_eq!(session.map_generation, 1);
    }

    #[test]
    fn test_next_level_increments() {
        let mut session = Session::new(snapshot("Steve"), "Test", 1);
        assert_eq!(session.next_level(), 2);
        assert_eq!(session.next_level(), 3);
        assert_eq!(session.current_level, 3);
    }

    #[test]
    fn test_elapsed_time() {
        let mut session = Session::new(snapshot("Steve"), "Test", 1);
        session.start_time -= 61_500;
        assert!(session.elapsed_ms() >= 61_500);
        assert!(session.formatted_time().starts_with("1:01."));

        // A clock stepping backwards never yields a negative time
        session.start_time = now_millis() + Duration::from_secs(60).as_millis() as u64;
        assert_eq!(session.elapsed_ms(), 0);
    }

    #[test]
    fn test_start_session() {
        let mut registry = SessionRegistry::new();
        let snap = snapshot("Steve");

        let session = registry.start(snap.clone(), &test_map(), 1).unwrap();
        assert_eq!(session.current_level, 1);
        assert!(registry.contains(&snap.id));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_second_start_fails_and_keeps_first() {
        let mut registry = SessionRegistry::new();
        let snap = snapshot("Steve");

        registry.start(snap.clone(), &test_map(), 1).unwrap();
        registry.get_mut(&snap.id).unwrap().current_level = 3;
        let before = registry.get(&snap.id).cloned();

        let other = DropperMap::new("Other", "Alex");
        assert!(matches!(
            registry.start(snap.clone(), &other, 2),
            Err(DropperError::AlreadyActive)
        ));
        assert_eq!(registry.get(&snap.id).cloned(), before);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_stop_session() {
        let mut registry = SessionRegistry::new();
        let snap = snapshot("Steve");
        registry.start(snap.clone(), &test_map(), 1).unwrap();

        let stopped = registry.stop(&snap.id).unwrap();
        assert_eq!(stopped.saved_inventory, snap.inventory);
        assert!(registry.is_empty());
        assert!(registry.stop(&snap.id).is_none());
    }

    #[test]
    fn test_restart_after_stop_is_fresh() {
        let mut registry = SessionRegistry::new();
        let snap = snapshot("Steve");
        registry.start(snap.clone(), &test_map(), 1).unwrap().current_level = 4;
        registry.stop(&snap.id);

        let session = registry.start(snap, &test_map(), 1).unwrap();
        assert_eq!(session.current_level, 1);
    }

    #[test]
    fn test_players_on_map() {
        let mut registry = SessionRegistry::new();
        registry.start(snapshot("Steve"), &test_map(), 1).unwrap();
        registry.start(snapshot("Alex"), &test_map(), 1).unwrap();
        registry
            .start(snapshot("Herobrine"), &DropperMap::new("Other", "x"), 2)
            .unwrap();

        assert_eq!(registry.players_on_map("TEST").len(), 2);
        assert_eq!(registry.players_on_map("other").len(), 1);
        assert!(registry.players_on_map("Missing").is_empty());
        assert_eq!(registry.player_ids().len(), 3);
    }
}
