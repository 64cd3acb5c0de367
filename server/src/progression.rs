//! Level progression for active dropper sessions.
//!
//! A player is either idle or playing level `n` of a map. Reaching the end
//! marker of level `n` moves them to level `n + 1`, or completes the map when
//! there is no level `n + 1` (higher levels past a gap are never reached).
//! Falls below the altitude threshold, fatal hits and deaths send the player
//! back to the level's checkpoint, or its start when no checkpoint is set,
//! without touching the level or the timer.
//!
//! The engine borrows the stores for the duration of a dispatch and returns
//! [`Effect`]s instead of acting on the player, so it can run without a host.

use crate::config::DropperConfig;
use crate::error::DropperError;
use crate::events::{Effect, GameEvent, Notice};
use crate::host::{GameMode, PlayerSnapshot};
use crate::map_store::MapStore;
use crate::session_registry::{Session, SessionRegistry};
use crate::stats_store::StatisticsStore;
use dropper_shared::{DropperMap, Location, PlayerId, END_PROXIMITY};
use log::{debug, info, warn};

/// Where a player stands in the progression state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    PlayingLevel(u32),
    /// The map was finished; the session is already torn down.
    Completed,
}

/// Why a session is being torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Voluntary,
    Completed,
    /// Teleported somewhere outside every world of the map.
    LeftMap,
    /// The map was deleted while being played.
    MapRemoved,
    Disconnect,
    Kick,
    Shutdown,
}

impl StopReason {
    /// Departed players are not restored; there is nobody to restore.
    pub fn restores(self) -> bool {
        !matches!(self, StopReason::Disconnect | StopReason::Kick)
    }
}

/// Result of moving a session past the end of its current level.
#[derive(Debug, Clone, PartialEq)]
pub struct Advance {
    pub state: SessionState,
    pub effects: Vec<Effect>,
}

pub struct ProgressionEngine<'a> {
    maps: &'a MapStore,
    stats: &'a mut StatisticsStore,
    sessions: &'a mut SessionRegistry,
    config: &'a DropperConfig,
}

impl<'a> ProgressionEngine<'a> {
    pub fn new(
        maps: &'a MapStore,
        stats: &'a mut StatisticsStore,
        sessions: &'a mut SessionRegistry,
        config: &'a DropperConfig,
    ) -> Self {
        Self {
            maps,
            stats,
            sessions,
            config,
        }
    }

    pub fn state(&self, player: &PlayerId) -> SessionState {
        match self.sessions.get(player) {
            Some(session) => SessionState::PlayingLevel(session.current_level),
            None => SessionState::Idle,
        }
    }

    /// Starts a session on level 1.
    ///
    /// The map must exist, be complete and have a level 1, and the player
    /// must not already be playing. Nothing changes when any check fails.
    pub fn start(
        &mut self,
        snapshot: PlayerSnapshot,
        map_name: &str,
    ) -> Result<Vec<Effect>, DropperError> {
        let maps = self.maps;
        let (map, generation) = maps
            .get(map_name)
            .zip(maps.generation(map_name))
            .ok_or_else(|| DropperError::MapNotFound(map_name.to_string()))?;

        if self.sessions.contains(&snapshot.id) {
            return Err(DropperError::AlreadyActive);
        }

        let first_start = map
            .level(1)
            .and_then(|level| level.start.clone())
            .filter(|_| map.is_playable())
            .ok_or_else(|| DropperError::MapNotPlayable(map.name.clone()))?;

        let player = snapshot.id;
        self.sessions.start(snapshot, map, generation)?;

        let mut effects = Vec::new();
        if self.config.clear_inventory_on_start {
            effects.push(Effect::ClearInventory { player });
        }
        effects.push(Effect::SetGameMode {
            player,
            mode: GameMode::Adventure,
        });
        effects.push(Effect::SetFlight {
            player,
            allowed: self.config.allow_flight_during_session,
        });
        effects.push(Effect::Teleport {
            player,
            to: first_start,
        });

        if self.config.stats_enabled {
            self.stats.record_play(player, &map.name);
        }

        effects.push(Effect::Notify {
            player,
            notice: Notice::GameStarted {
                map: map.name.clone(),
            },
        });
        Ok(effects)
    }

    /// Tears down the player's session, returning `None` if there was none.
    pub fn stop(&mut self, player: &PlayerId, reason: StopReason) -> Option<Vec<Effect>> {
        let session = self.sessions.stop(player)?;
        debug!(
            "Session of {} on {} stopped: {:?}",
            session.player_name, session.map_name, reason
        );

        let mut effects = Vec::new();
        if reason.restores() {
            effects.extend(self.restore_effects(&session));
        }
        if matches!(reason, StopReason::LeftMap | StopReason::MapRemoved) {
            effects.push(Effect::Notify {
                player: *player,
                notice: Notice::GameStopped,
            });
        }
        Some(effects)
    }

    /// Stops every session on the named map, restoring the players.
    pub fn stop_map(&mut self, map_name: &str) -> Vec<Effect> {
        let players = self.sessions.players_on_map(map_name);
        if !players.is_empty() {
            info!("Stopping {} session(s) on {}", players.len(), map_name);
        }
        players
            .iter()
            .filter_map(|player| self.stop(player, StopReason::MapRemoved))
            .flatten()
            .collect()
    }

    /// Stops every session. Used at shutdown.
    pub fn stop_all(&mut self, reason: StopReason) -> Vec<Effect> {
        let players = self.sessions.player_ids();
        info!("Stopping {} active session(s)", players.len());
        players
            .iter()
            .filter_map(|player| self.stop(player, reason))
            .flatten()
            .collect()
    }

    fn restore_effects(&self, session: &Session) -> Vec<Effect> {
        let player = session.player_id;
        let mut effects = Vec::new();
        if self.config.restore_inventory_on_stop {
            effects.push(Effect::RestoreInventory {
                player,
                inventory: session.saved_inventory.clone(),
            });
        }
        effects.push(Effect::SetGameMode {
            player,
            mode: session.saved_game_mode,
        });
        effects.push(Effect::SetFlight {
            player,
            allowed: session.saved_game_mode.allows_flight(),
        });
        effects.push(Effect::Teleport {
            player,
            to: session.return_location.clone(),
        });
        effects
    }

    /// Sends the player to the current level's checkpoint, or its start.
    ///
    /// `None` when the player has no session or the level has neither point.
    pub fn teleport_to_checkpoint(&mut self, player: &PlayerId) -> Option<Vec<Effect>> {
        let maps = self.maps;
        let session = self.sessions.get(player)?;
        let map = session_map(maps, session)?;
        let target = recovery_point(map, session.current_level)?;

        debug!(
            "{} recovered to level {} of {}",
            session.player_name, session.current_level, map.name
        );
        Some(vec![
            Effect::Teleport {
                player: *player,
                to: target,
            },
            Effect::Notify {
                player: *player,
                notice: Notice::TeleportedToCheckpoint,
            },
        ])
    }

    /// Moves the player past their current level.
    ///
    /// Goes to the start of level `n + 1` if the map has one, otherwise
    /// records a completion and ends the session with the player restored.
    pub fn next_level(&mut self, player: &PlayerId) -> Option<Advance> {
        let maps = self.maps;
        let session = self.sessions.get_mut(player)?;
        let map = session_map(maps, session)?;

        let finished = session.current_level;
        let next = session.next_level();

        if map.has_level(next) {
            debug!(
                "{} finished level {} of {}",
                session.player_name, finished, map.name
            );
            let mut effects = Vec::new();
            if let Some(start) = map.level(next).and_then(|level| level.start.clone()) {
                effects.push(Effect::Teleport {
                    player: *player,
                    to: start,
                });
            }
            effects.push(Effect::Notify {
                player: *player,
                notice: Notice::LevelCompleted {
                    level: finished,
                    next,
                },
            });
            return Some(Advance {
                state: SessionState::PlayingLevel(next),
                effects,
            });
        }

        Some(Advance {
            state: SessionState::Completed,
            effects: self.complete(player, map),
        })
    }

    fn complete(&mut self, player: &PlayerId, map: &DropperMap) -> Vec<Effect> {
        let Some(session) = self.sessions.get(player) else {
            return Vec::new();
        };
        let elapsed_ms = session.elapsed_ms();
        let player_name = session.player_name.clone();

        info!("{} completed {} in {}", player_name, map.name, session.formatted_time());

        if self.config.stats_enabled {
            self.stats.record_completion(*player, &map.name, elapsed_ms);
        }

        let mut effects = vec![Effect::Notify {
            player: *player,
            notice: Notice::MapCompleted {
                map: map.name.clone(),
                elapsed_ms,
            },
        }];
        effects.extend(
            self.config
                .rewards_for(&player_name, &map.name)
                .into_iter()
                .map(|command| Effect::DispatchCommand { command }),
        );
        effects.extend(self.stop(player, StopReason::Completed).unwrap_or_default());
        effects
    }

    /// Handles one host event. Events for idle players produce nothing.
    pub fn handle(&mut self, event: GameEvent) -> Vec<Effect> {
        let player = event.player();
        let maps = self.maps;
        let Some(session) = self.sessions.get(&player) else {
            return Vec::new();
        };
        let level = session.current_level;

        let Some(map) = session_map(maps, session) else {
            warn!(
                "Map {} vanished during {}'s session",
                session.map_name, session.player_name
            );
            let reason = match event {
                GameEvent::Disconnect { .. } => StopReason::Disconnect,
                GameEvent::Kick { .. } => StopReason::Kick,
                _ => StopReason::MapRemoved,
            };
            return self.stop(&player, reason).unwrap_or_default();
        };

        match event {
            GameEvent::Move { to, .. } => self.on_move(&player, map, level, &to),
            GameEvent::Damage { amount, health, .. } => {
                self.on_damage(&player, map, level, amount, health)
            }
            GameEvent::Death { .. } => {
                let mut effects = vec![Effect::CancelEvent, Effect::RestoreVitals { player }];
                effects.extend(self.recovery(&player, map, level));
                effects
            }
            GameEvent::Respawn { .. } => match recovery_point(map, level) {
                Some(at) => vec![Effect::SetRespawnPoint { player, at }],
                None => Vec::new(),
            },
            GameEvent::Disconnect { .. } => {
                self.stop(&player, StopReason::Disconnect).unwrap_or_default()
            }
            GameEvent::Kick { .. } => self.stop(&player, StopReason::Kick).unwrap_or_default(),
            GameEvent::Teleport { to, cause, .. } => {
                if cause.is_administrative() || map.contains_world(&to.world) {
                    Vec::new()
                } else {
                    self.stop(&player, StopReason::LeftMap).unwrap_or_default()
                }
            }
        }
    }

    fn on_move(
        &mut self,
        player: &PlayerId,
        map: &DropperMap,
        level: u32,
        to: &Location,
    ) -> Vec<Effect> {
        if to.y < self.config.min_altitude_threshold {
            if self.config.teleport_on_fall {
                return self.recovery(player, map, level);
            }
            return Vec::new();
        }

        let Some(end) = map.level(level).and_then(|l| l.end.as_ref()) else {
            return Vec::new();
        };
        if !to.is_near(end, END_PROXIMITY) {
            return Vec::new();
        }

        self.next_level(player)
            .map(|advance| advance.effects)
            .unwrap_or_default()
    }

    fn on_damage(
        &mut self,
        player: &PlayerId,
        map: &DropperMap,
        level: u32,
        amount: f64,
        health: f64,
    ) -> Vec<Effect> {
        let multiplier = self.config.damage_multiplier;
        if multiplier <= 0.0 {
            return vec![Effect::CancelEvent];
        }

        let scaled = amount * multiplier;
        if scaled >= health {
            let mut effects = vec![
                Effect::CancelEvent,
                Effect::RestoreVitals { player: *player },
            ];
            effects.extend(self.recovery(player, map, level));
            return effects;
        }

        if multiplier != 1.0 {
            vec![Effect::SetDamage { amount: scaled }]
        } else {
            Vec::new()
        }
    }

    fn recovery(&self, player: &PlayerId, map: &DropperMap, level: u32) -> Vec<Effect> {
        match recovery_point(map, level) {
            Some(to) => vec![
                Effect::Teleport {
                    player: *player,
                    to,
                },
                Effect::Notify {
                    player: *player,
                    notice: Notice::TeleportedToCheckpoint,
                },
            ],
            None => {
                debug!("Level {} of {} has no recovery point", level, map.name);
                Vec::new()
            }
        }
    }
}

/// The map a session was started on, if it is still in the catalog.
fn session_map<'m>(maps: &'m MapStore, session: &Session) -> Option<&'m DropperMap> {
    maps.get_at(&session.map_name, session.map_generation)
}

fn recovery_point(map: &DropperMap, level: u32) -> Option<Location> {
    map.level(level)?.recovery_point().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::TeleportCause;
    use crate::host::InventorySnapshot;
    use crate::storage::MemoryStorage;
    use assert_approx_eq::assert_approx_eq;
    use dropper_shared::LevelPoint;

    struct Fixture {
        maps: MapStore,
        stats: StatisticsStore,
        sessions: SessionRegistry,
        config: DropperConfig,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                maps: MapStore::new(MemoryStorage::new()),
                stats: StatisticsStore::new(MemoryStorage::new()),
                sessions: SessionRegistry::new(),
                config: DropperConfig::default(),
            }
        }

        /// A map with the given levels, each starting at y=200 and ending at y=10.
        fn with_map(mut self, name: &str, levels: &[u32]) -> Self {
            self.maps.create(name, "Steve").unwrap();
            for &n in levels {
                self.maps
                    .set_level_point(name, n, LevelPoint::Start, start_of(n))
                    .unwrap();
                self.maps
                    .set_level_point(name, n, LevelPoint::End, end_of(n))
                    .unwrap();
            }
            self
        }

        fn engine(&mut self) -> ProgressionEngine<'_> {
            ProgressionEngine::new(&self.maps, &mut self.stats, &mut self.sessions, &self.config)
        }
    }

    fn start_of(level: u32) -> Location {
        Location::new("world", level as f64 * 100.0, 200.0, 0.0)
    }

    fn end_of(level: u32) -> Location {
        Location::new("world", level as f64 * 100.0, 10.0, 0.0)
    }

    fn snapshot() -> PlayerSnapshot {
        PlayerSnapshot {
            id: PlayerId::new_v4(),
            name: "Steve".to_string(),
            location: Location::new("lobby", 1.0, 64.0, 1.0),
            game_mode: GameMode::Creative,
            inventory: InventorySnapshot::new(vec![7, 7, 7]),
        }
    }

    fn move_to(player: PlayerId, to: Location) -> GameEvent {
        GameEvent::Move { player, to }
    }

    fn teleports(effects: &[Effect]) -> Vec<Location> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Teleport { to, .. } => Some(to.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_start_prepares_player() {
        let mut fx = Fixture::new().with_map("Test", &[1]);
        let snap = snapshot();

        let effects = fx.engine().start(snap.clone(), "test").unwrap();

        assert_eq!(effects[0], Effect::ClearInventory { player: snap.id });
        assert!(effects.contains(&Effect::SetGameMode {
            player: snap.id,
            mode: GameMode::Adventure
        }));
        assert!(effects.contains(&Effect::SetFlight {
            player: snap.id,
            allowed: false
        }));
        assert_eq!(teleports(&effects), vec![start_of(1)]);
        assert_eq!(fx.engine().state(&snap.id), SessionState::PlayingLevel(1));
        assert_eq!(fx.stats.map_stats(&snap.id, "Test").plays, 1);
    }

    #[test]
    fn test_start_respects_config() {
        let mut fx = Fixture::new().with_map("Test", &[1]);
        fx.config.clear_inventory_on_start = false;
        fx.config.allow_flight_during_session = true;
        fx.config.stats_enabled = false;
        let snap = snapshot();

        let effects = fx.engine().start(snap.clone(), "Test").unwrap();

        assert!(!effects.contains(&Effect::ClearInventory { player: snap.id }));
        assert!(effects.contains(&Effect::SetFlight {
            player: snap.id,
            allowed: true
        }));
        assert!(fx.stats.is_empty());
    }

    #[test]
    fn test_start_preconditions() {
        let mut fx = Fixture::new().with_map("Ready", &[1]).with_map("Shifted", &[2]);
        fx.maps.create("Empty", "Steve").unwrap();
        fx.maps
            .set_level_point("Ready", 2, LevelPoint::Start, start_of(2))
            .unwrap();
        fx.maps.create("Partial", "Steve").unwrap();
        fx.maps
            .set_level_point("Partial", 1, LevelPoint::Start, start_of(1))
            .unwrap();
        let snap = snapshot();

        for name in ["Empty", "Partial", "Shifted", "Ready"] {
            assert!(matches!(
                fx.engine().start(snap.clone(), name),
                Err(DropperError::MapNotPlayable(_))
            ));
        }
        assert!(matches!(
            fx.engine().start(snap.clone(), "Missing"),
            Err(DropperError::MapNotFound(_))
        ));
        assert!(fx.sessions.is_empty());
        assert!(fx.stats.is_empty());
    }

    #[test]
    fn test_double_start_fails() {
        let mut fx = Fixture::new().with_map("Test", &[1, 2]).with_map("Other", &[1]);
        let snap = snapshot();

        fx.engine().start(snap.clone(), "Test").unwrap();
        fx.engine().next_level(&snap.id).unwrap();
        let before = fx.sessions.get(&snap.id).cloned();

        assert!(matches!(
            fx.engine().start(snap.clone(), "Other"),
            Err(DropperError::AlreadyActive)
        ));
        assert_eq!(fx.sessions.get(&snap.id).cloned(), before);
        assert_eq!(fx.stats.map_stats(&snap.id, "Other").plays, 0);
    }

    #[test]
    fn test_reaching_end_advances_level() {
        let mut fx = Fixture::new().with_map("Test", &[1, 2, 3]);
        let snap = snapshot();
        fx.engine().start(snap.clone(), "Test").unwrap();

        let effects = fx.engine().handle(move_to(snap.id, end_of(1)));

        assert_eq!(teleports(&effects), vec![start_of(2)]);
        assert!(effects.contains(&Effect::Notify {
            player: snap.id,
            notice: Notice::LevelCompleted { level: 1, next: 2 }
        }));
        assert_eq!(fx.engine().state(&snap.id), SessionState::PlayingLevel(2));
    }

    #[test]
    fn test_moving_elsewhere_does_nothing() {
        let mut fx = Fixture::new().with_map("Test", &[1, 2]);
        let snap = snapshot();
        fx.engine().start(snap.clone(), "Test").unwrap();

        // End of a later level does not count, nor does the right spot in another world
        let mut other_world = end_of(1);
        other_world.world = "world_nether".to_string();
        for to in [end_of(2), other_world, Location::new("world", 100.0, 12.5, 0.0)] {
            assert!(fx.engine().handle(move_to(snap.id, to)).is_empty());
        }
        assert_eq!(fx.engine().state(&snap.id), SessionState::PlayingLevel(1));
    }

    #[test]
    fn test_last_level_completes_map() {
        let mut fx = Fixture::new().with_map("Test", &[1]);
        fx.config.reward_commands_enabled = true;
        fx.config.reward_commands = vec!["give %player% diamond 1".to_string()];
        let snap = snapshot();
        fx.engine().start(snap.clone(), "Test").unwrap();
        fx.sessions.get_mut(&snap.id).unwrap().start_time -= 5_000;

        let effects = fx.engine().handle(move_to(snap.id, end_of(1)));

        assert_eq!(fx.engine().state(&snap.id), SessionState::Idle);
        let stats = fx.stats.map_stats(&snap.id, "Test");
        assert_eq!(stats.completions, 1);
        assert!(stats.best_time >= 5_000);

        assert!(matches!(
            effects[0],
            Effect::Notify {
                notice: Notice::MapCompleted { .. },
                ..
            }
        ));
        assert!(effects.contains(&Effect::DispatchCommand {
            command: "give Steve diamond 1".to_string()
        }));
        assert!(effects.contains(&Effect::RestoreInventory {
            player: snap.id,
            inventory: snap.inventory.clone()
        }));
        assert!(effects.contains(&Effect::SetGameMode {
            player: snap.id,
            mode: GameMode::Creative
        }));
        assert!(effects.contains(&Effect::SetFlight {
            player: snap.id,
            allowed: true
        }));
        assert_eq!(teleports(&effects), vec![snap.location.clone()]);
    }

    #[test]
    fn test_gap_in_levels_completes_map() {
        let mut fx = Fixture::new().with_map("Gaps", &[1, 2, 5]);
        let snap = snapshot();
        fx.engine().start(snap.clone(), "Gaps").unwrap();

        fx.engine().handle(move_to(snap.id, end_of(1)));
        let advance = fx.engine().next_level(&snap.id).unwrap();

        assert_eq!(advance.state, SessionState::Completed);
        assert!(!fx.sessions.contains(&snap.id));
        assert_eq!(fx.stats.map_stats(&snap.id, "Gaps").completions, 1);
    }

    #[test]
    fn test_level_only_increases() {
        let mut fx = Fixture::new().with_map("Test", &[1, 2, 3, 4]);
        let snap = snapshot();
        fx.engine().start(snap.clone(), "Test").unwrap();

        let mut last = 1;
        for _ in 0..3 {
            match fx.engine().next_level(&snap.id).unwrap().state {
                SessionState::PlayingLevel(n) => {
                    assert_eq!(n, last + 1);
                    last = n;
                }
                other => panic!("unexpected state {:?}", other),
            }
        }
        assert_eq!(
            fx.engine().next_level(&snap.id).unwrap().state,
            SessionState::Completed
        );
        assert!(fx.engine().next_level(&snap.id).is_none());
    }

    #[test]
    fn test_fall_recovers_to_start_without_checkpoint() {
        let mut fx = Fixture::new().with_map("Test", &[1, 2]);
        let snap = snapshot();
        fx.engine().start(snap.clone(), "Test").unwrap();
        fx.engine().next_level(&snap.id);
        let before = fx.sessions.get(&snap.id).cloned().unwrap();

        let effects = fx
            .engine()
            .handle(move_to(snap.id, Location::new("world", 0.0, -70.0, 0.0)));

        assert_eq!(teleports(&effects), vec![start_of(2)]);
        let after = fx.sessions.get(&snap.id).unwrap();
        assert_eq!(after.current_level, before.current_level);
        assert_eq!(after.start_time, before.start_time);
    }

    #[test]
    fn test_fall_prefers_checkpoint() {
        let mut fx = Fixture::new().with_map("Test", &[1]);
        let checkpoint = Location::new("world", 100.0, 120.0, 0.0);
        fx.maps.set_checkpoint("Test", 1, checkpoint.clone()).unwrap();
        let snap = snapshot();
        fx.engine().start(snap.clone(), "Test").unwrap();

        let effects = fx
            .engine()
            .handle(move_to(snap.id, Location::new("world", 0.0, -65.0, 0.0)));
        assert_eq!(teleports(&effects), vec![checkpoint]);
    }

    #[test]
    fn test_fall_recovery_can_be_disabled() {
        let mut fx = Fixture::new().with_map("Test", &[1]);
        fx.config.teleport_on_fall = false;
        let snap = snapshot();
        fx.engine().start(snap.clone(), "Test").unwrap();

        let effects = fx
            .engine()
            .handle(move_to(snap.id, Location::new("world", 0.0, -65.0, 0.0)));
        assert!(effects.is_empty());
    }

    #[test]
    fn test_checkpoint_edit_visible_mid_session() {
        let mut fx = Fixture::new().with_map("Test", &[1]);
        let snap = snapshot();
        fx.engine().start(snap.clone(), "Test").unwrap();

        let checkpoint = Location::new("world", 100.0, 90.0, 0.0);
        fx.maps.set_checkpoint("Test", 1, checkpoint.clone()).unwrap();

        let effects = fx.engine().teleport_to_checkpoint(&snap.id).unwrap();
        assert_eq!(teleports(&effects), vec![checkpoint]);
    }

    #[test]
    fn test_damage_multiplier() {
        let mut fx = Fixture::new().with_map("Test", &[1]);
        let snap = snapshot();
        fx.engine().start(snap.clone(), "Test").unwrap();
        let hit = GameEvent::Damage {
            player: snap.id,
            amount: 4.0,
            health: 20.0,
        };

        assert_eq!(fx.engine().handle(hit.clone()), vec![Effect::CancelEvent]);

        fx.config.damage_multiplier = 0.5;
        assert_eq!(
            fx.engine().handle(hit.clone()),
            vec![Effect::SetDamage { amount: 2.0 }]
        );

        fx.config.damage_multiplier = 1.3;
        match &fx.engine().handle(hit.clone())[..] {
            [Effect::SetDamage { amount }] => assert_approx_eq!(*amount, 5.2),
            other => panic!("unexpected effects {:?}", other),
        }

        fx.config.damage_multiplier = 1.0;
        assert!(fx.engine().handle(hit).is_empty());
    }

    #[test]
    fn test_fatal_damage_recovers() {
        let mut fx = Fixture::new().with_map("Test", &[1]);
        fx.config.damage_multiplier = 2.0;
        let snap = snapshot();
        fx.engine().start(snap.clone(), "Test").unwrap();

        let effects = fx.engine().handle(GameEvent::Damage {
            player: snap.id,
            amount: 3.0,
            health: 5.0,
        });

        assert_eq!(effects[0], Effect::CancelEvent);
        assert!(effects.contains(&Effect::RestoreVitals { player: snap.id }));
        assert_eq!(teleports(&effects), vec![start_of(1)]);
        assert_eq!(fx.engine().state(&snap.id), SessionState::PlayingLevel(1));
    }

    #[test]
    fn test_death_and_respawn() {
        let mut fx = Fixture::new().with_map("Test", &[1]);
        let snap = snapshot();
        fx.engine().start(snap.clone(), "Test").unwrap();

        let effects = fx.engine().handle(GameEvent::Death { player: snap.id });
        assert_eq!(effects[0], Effect::CancelEvent);
        assert_eq!(effects[1], Effect::RestoreVitals { player: snap.id });
        assert_eq!(teleports(&effects), vec![start_of(1)]);

        assert_eq!(
            fx.engine().handle(GameEvent::Respawn { player: snap.id }),
            vec![Effect::SetRespawnPoint {
                player: snap.id,
                at: start_of(1)
            }]
        );
    }

    #[test]
    fn test_disconnect_discards_without_restore() {
        let mut fx = Fixture::new().with_map("Test", &[1]);
        let snap = snapshot();

        for event in [
            GameEvent::Disconnect { player: snap.id },
            GameEvent::Kick { player: snap.id },
        ] {
            fx.engine().start(snap.clone(), "Test").unwrap();
            assert!(fx.engine().handle(event).is_empty());
            assert!(!fx.sessions.contains(&snap.id));
        }
    }

    #[test]
    fn test_external_teleport_out_of_map_stops() {
        let mut fx = Fixture::new().with_map("Test", &[1]);
        let snap = snapshot();
        fx.engine().start(snap.clone(), "Test").unwrap();
        let elsewhere = Location::new("lobby", 0.0, 64.0, 0.0);

        let ignored = fx.engine().handle(GameEvent::Teleport {
            player: snap.id,
            to: elsewhere.clone(),
            cause: TeleportCause::Command,
        });
        assert!(ignored.is_empty());

        let inside = fx.engine().handle(GameEvent::Teleport {
            player: snap.id,
            to: Location::new("world", 5000.0, 64.0, 5000.0),
            cause: TeleportCause::EnderPearl,
        });
        assert!(inside.is_empty());
        assert!(fx.sessions.contains(&snap.id));

        let effects = fx.engine().handle(GameEvent::Teleport {
            player: snap.id,
            to: elsewhere,
            cause: TeleportCause::EnderPearl,
        });
        assert!(!fx.sessions.contains(&snap.id));
        assert_eq!(teleports(&effects), vec![snap.location.clone()]);
        assert_eq!(
            effects.last(),
            Some(&Effect::Notify {
                player: snap.id,
                notice: Notice::GameStopped
            })
        );
    }

    #[test]
    fn test_deleted_map_ends_session() {
        let mut fx = Fixture::new().with_map("Test", &[1]);
        let snap = snapshot();
        fx.engine().start(snap.clone(), "Test").unwrap();
        fx.maps.delete("Test");

        let effects = fx
            .engine()
            .handle(move_to(snap.id, Location::new("world", 0.0, 100.0, 0.0)));
        assert!(!fx.sessions.contains(&snap.id));
        assert_eq!(teleports(&effects), vec![snap.location.clone()]);
    }

    #[test]
    fn test_recreated_map_does_not_adopt_session() {
        let mut fx = Fixture::new().with_map("Test", &[1]);
        let snap = snapshot();
        fx.engine().start(snap.clone(), "Test").unwrap();
        fx.maps.delete("Test");
        fx.maps.create("TEST", "Alex").unwrap();

        let effects = fx
            .engine()
            .handle(move_to(snap.id, Location::new("world", 0.0, -100.0, 0.0)));
        assert!(!fx.sessions.contains(&snap.id));
        assert_eq!(teleports(&effects), vec![snap.location.clone()]);
        assert!(effects.contains(&Effect::SetGameMode {
            player: snap.id,
            mode: GameMode::Creative
        }));
        assert!(effects.contains(&Effect::Notify {
            player: snap.id,
            notice: Notice::GameStopped
        }));

        assert!(fx.engine().handle(GameEvent::Death { player: snap.id }).is_empty());
    }

    #[test]
    fn test_stop_map_restores_only_its_players() {
        let mut fx = Fixture::new().with_map("Test", &[1]).with_map("Other", &[1]);
        let first = snapshot();
        let second = snapshot();
        let elsewhere = snapshot();
        fx.engine().start(first.clone(), "Test").unwrap();
        fx.engine().start(second.clone(), "test").unwrap();
        fx.engine().start(elsewhere.clone(), "Other").unwrap();

        let effects = fx.engine().stop_map("TEST");
        assert_eq!(teleports(&effects).len(), 2);
        assert!(!fx.sessions.contains(&first.id));
        assert!(!fx.sessions.contains(&second.id));
        assert!(fx.sessions.contains(&elsewhere.id));
        assert!(fx.engine().stop_map("Missing").is_empty());
    }

    #[test]
    fn test_events_for_idle_players_are_ignored() {
        let mut fx = Fixture::new().with_map("Test", &[1]);
        let id = PlayerId::new_v4();
        assert!(fx.engine().handle(move_to(id, end_of(1))).is_empty());
        assert!(fx.engine().handle(GameEvent::Death { player: id }).is_empty());
        assert!(fx.engine().stop(&id, StopReason::Voluntary).is_none());
        assert!(fx.engine().teleport_to_checkpoint(&id).is_none());
    }

    #[test]
    fn test_stop_all() {
        let mut fx = Fixture::new().with_map("Test", &[1]);
        let first = snapshot();
        let second = snapshot();
        fx.engine().start(first.clone(), "Test").unwrap();
        fx.engine().start(second.clone(), "Test").unwrap();

        let effects = fx.engine().stop_all(StopReason::Shutdown);
        assert!(fx.sessions.is_empty());
        assert_eq!(teleports(&effects).len(), 2);
    }

    #[test]
    fn test_restore_skips_inventory_when_disabled() {
        let mut fx = Fixture::new().with_map("Test", &[1]);
        fx.config.restore_inventory_on_stop = false;
        let snap = snapshot();
        fx.engine().start(snap.clone(), "Test").unwrap();

        let effects = fx.engine().stop(&snap.id, StopReason::Voluntary).unwrap();
        assert!(!effects
            .iter()
            .any(|e| matches!(e, Effect::RestoreInventory { .. })));
        assert_eq!(teleports(&effects), vec![snap.location]);
    }
}
