//! Server runtime coordinating host events, commands and persistence

use crate::commands::{CommandContext, CommandOutcome, CommandSender};
use crate::config::DropperConfig;
use crate::error::ConfigError;
use crate::events::GameEvent;
use crate::host::{apply_effects, EventVerdict, Host};
use crate::map_store::MapStore;
use crate::progression::{ProgressionEngine, StopReason};
use crate::session_registry::SessionRegistry;
use crate::stats_store::StatisticsStore;
use crate::storage::JsonFileStorage;
use dropper_shared::PlayerId;
use log::{debug, error, info, warn};
use std::path::Path;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Work handed to the server from outside the logic task.
pub type HostCall<H> = Box<dyn FnOnce(&mut H) -> Option<GameEvent> + Send>;

/// Messages sent to the main server loop
pub enum Inbound<H> {
    /// An event the host observed
    Event {
        event: GameEvent,
        reply: Option<oneshot::Sender<EventVerdict>>,
    },
    /// Runs against the host on the logic task; a returned event is handled
    /// as if the host had reported it.
    Host {
        call: HostCall<H>,
        reply: Option<oneshot::Sender<EventVerdict>>,
    },
    /// The words after `/dropper`, from a player or from the console
    Command {
        player: Option<PlayerId>,
        args: Vec<String>,
        reply: Option<oneshot::Sender<CommandOutcome>>,
    },
    Shutdown,
}

/// Owns all dropper state plus the host it drives
pub struct DropperServer<H> {
    maps: MapStore,
    stats: StatisticsStore,
    sessions: SessionRegistry,
    config: DropperConfig,
    host: H,
}

impl<H: Host> DropperServer<H> {
    pub fn new(maps: MapStore, stats: StatisticsStore, config: DropperConfig, host: H) -> Self {
        Self {
            maps,
            stats,
            sessions: SessionRegistry::new(),
            config,
            host,
        }
    }

    /// Opens the data directory: config, map records and statistics.
    pub fn open(data_dir: &Path, host: H) -> Result<Self, ConfigError> {
        let config = DropperConfig::load_or_init(data_dir)?;
        let mut server = Self::new(
            MapStore::new(JsonFileStorage::new(data_dir)),
            StatisticsStore::new(JsonFileStorage::new(data_dir)),
            config,
            host,
        );
        server.load();
        Ok(server)
    }

    /// Loads both stores from storage.
    pub fn load(&mut self) {
        let maps = self.maps.load_all();
        let players = self.stats.load_all();
        info!(
            "Dropper ready: {} map(s), statistics for {} player(s)",
            maps, players
        );
    }

    pub fn maps(&self) -> &MapStore {
        &self.maps
    }

    pub fn stats(&self) -> &StatisticsStore {
        &self.stats
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn config(&self) -> &DropperConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut DropperConfig {
        &mut self.config
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Runs one host event through the progression engine and applies the
    /// resulting effects.
    pub fn handle_event(&mut self, event: GameEvent) -> EventVerdict {
        let effects = ProgressionEngine::new(
            &self.maps,
            &mut self.stats,
            &mut self.sessions,
            &self.config,
        )
        .handle(event);

        if effects.is_empty() {
            return EventVerdict::default();
        }
        apply_effects(&mut self.host, effects)
    }

    /// Runs a `/dropper` command. `None` means the console.
    pub fn handle_command<S: AsRef<str>>(
        &mut self,
        player: Option<PlayerId>,
        args: &[S],
    ) -> CommandOutcome {
        let sender = match player {
            None => CommandSender::Console,
            Some(id) => match self.host.player_mut(&id) {
                Some(handle) => CommandSender::Player(handle.snapshot()),
                None => {
                    warn!("Command from unknown player {}", id);
                    CommandSender::Console
                }
            },
        };

        let outcome = CommandContext {
            maps: &mut self.maps,
            stats: &mut self.stats,
            sessions: &mut self.sessions,
            config: &self.config,
        }
        .dispatch(&sender, args);

        apply_effects(&mut self.host, outcome.effects.clone());
        outcome
    }

    /// Writes every map record and the statistics table.
    pub fn save(&mut self) {
        let saved = self.maps.save_all();
        debug!("Saved {} map(s)", saved);
        if let Err(e) = self.stats.save_all() {
            error!("Failed to save statistics: {}", e);
        }
    }

    /// Stops every session with the player restored, then saves.
    pub fn shutdown(&mut self) {
        let effects = ProgressionEngine::new(
            &self.maps,
            &mut self.stats,
            &mut self.sessions,
            &self.config,
        )
        .stop_all(StopReason::Shutdown);
        apply_effects(&mut self.host, effects);
        self.save();
        info!("Dropper shut down");
    }

    fn process(&mut self, message: Inbound<H>) {
        match message {
            Inbound::Event { event, reply } => {
                let verdict = self.handle_event(event);
                respond(reply, verdict);
            }
            Inbound::Host { call, reply } => {
                let verdict = match call(&mut self.host) {
                    Some(event) => self.handle_event(event),
                    None => EventVerdict::default(),
                };
                respond(reply, verdict);
            }
            Inbound::Command {
                player,
                args,
                reply,
            } => {
                let outcome = self.handle_command(player, &args);
                respond(reply, outcome);
            }
            // Handled by the loop
            Inbound::Shutdown => {}
        }
    }

    /// Main server loop
    ///
    /// Events, commands and autosaves are all handled on this task, one at a
    /// time. Returns after `Shutdown` or once every sender is dropped, with
    /// sessions stopped and both stores saved.
    pub async fn run(&mut self, mut inbound: mpsc::UnboundedReceiver<Inbound<H>>) {
        let mut autosave = self.config.autosave_interval().map(|period| {
            let mut timer = interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            timer
        });

        info!("Dropper server started");

        loop {
            tokio::select! {
                message = inbound.recv() => {
                    match message {
                        Some(Inbound::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                        Some(message) => self.process(message),
                    }
                },

                _ = next_tick(&mut autosave) => {
                    debug!("Autosaving ({} active session(s))", self.sessions.len());
                    self.save();
                },
            }
        }

        self.shutdown();
    }
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn respond<T>(reply: Option<oneshot::Sender<T>>, value: T) {
    if let Some(reply) = reply {
        if reply.send(value).is_err() {
            debug!("Reply receiver dropped");
        }
    }
}
