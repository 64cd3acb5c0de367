//! The `/dropper` command surface.
//!
//! Arguments after `/dropper` are parsed with clap into a [`DropperCommand`],
//! executed against the stores and the progression engine, and answered with
//! a [`Feedback`] for the sender plus any effects to apply to the host.

use crate::config::DropperConfig;
use crate::error::DropperError;
use crate::events::Effect;
use crate::host::PlayerSnapshot;
use crate::map_store::MapStore;
use crate::progression::{ProgressionEngine, StopReason};
use crate::session_registry::SessionRegistry;
use crate::stats_store::{MapStatsView, StatisticsStore};
use clap::{Parser, Subcommand, ValueEnum};
use dropper_shared::LevelPoint;
use log::{debug, info};
use std::fmt;

/// Subcommands offered by tab completion, in help order.
pub const SUBCOMMANDS: [&str; 10] = [
    "create",
    "delete",
    "start",
    "stop",
    "setlevel",
    "checkpoint",
    "removelevel",
    "list",
    "stats",
    "tp",
];

/// Subcommands whose first argument is a map name.
const MAP_SUBCOMMANDS: [&str; 7] = [
    "delete",
    "start",
    "setlevel",
    "checkpoint",
    "removelevel",
    "stats",
    "tp",
];

#[derive(Parser, Debug)]
#[command(name = "dropper", about = "Dropper minigame commands")]
#[command(arg_required_else_help = true, disable_version_flag = true)]
struct DropperCli {
    #[command(subcommand)]
    command: DropperCommand,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum DropperCommand {
    /// Create a new map
    Create { map: String },
    /// Delete a map
    Delete { map: String },
    /// Start playing a map
    Start { map: String },
    /// Stop playing
    Stop,
    /// Set a level's start or end at your position
    #[command(name = "setlevel")]
    SetLevel {
        map: String,
        level: u32,
        point: PointArg,
    },
    /// Set a level's checkpoint at your position
    Checkpoint { map: String, level: u32 },
    /// Remove a level from a map
    #[command(name = "removelevel")]
    RemoveLevel { map: String, level: u32 },
    /// List all maps
    List,
    /// View your statistics on a map
    Stats { map: String },
    /// Teleport to a level's start
    Tp { map: String, level: u32 },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointArg {
    Start,
    End,
}

impl From<PointArg> for LevelPoint {
    fn from(point: PointArg) -> Self {
        match point {
            PointArg::Start => LevelPoint::Start,
            PointArg::End => LevelPoint::End,
        }
    }
}

impl DropperCommand {
    /// Parses the words after `/dropper`. The subcommand is case-insensitive.
    pub fn parse<I, S>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut words: Vec<String> = vec!["dropper".to_string()];
        for (i, arg) in args.into_iter().enumerate() {
            let arg = arg.as_ref();
            words.push(if i == 0 {
                arg.to_lowercase()
            } else {
                arg.to_string()
            });
        }
        DropperCli::try_parse_from(words).map(|cli| cli.command)
    }

    /// Commands that act on the sender's own position or session.
    fn player_only(&self) -> bool {
        !matches!(
            self,
            DropperCommand::Create { .. } | DropperCommand::Delete { .. } | DropperCommand::List
        )
    }
}

/// Who issued a command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandSender {
    Console,
    Player(PlayerSnapshot),
}

impl CommandSender {
    pub fn name(&self) -> &str {
        match self {
            CommandSender::Console => "Console",
            CommandSender::Player(player) => &player.name,
        }
    }
}

/// Reply shown to the command sender.
#[derive(Debug, Clone, PartialEq)]
pub enum Feedback {
    /// Help or a usage error rendered by clap.
    Usage(String),
    PlayerOnly,
    MapCreated(String),
    MapAlreadyExists(String),
    InvalidMapName(String),
    MapDeleted(String),
    MapNotFound(String),
    MapNotPlayable(String),
    AlreadyInGame,
    NoActiveGame,
    GameStarted(String),
    GameStopped,
    LevelPointSet {
        map: String,
        level: u32,
        point: LevelPoint,
    },
    CheckpointSet {
        map: String,
        level: u32,
    },
    LevelRemoved {
        map: String,
        level: u32,
    },
    LevelNotFound {
        map: String,
        level: u32,
    },
    InvalidLevel(u32),
    NoStartLocation {
        map: String,
        level: u32,
    },
    Teleported {
        map: String,
        level: u32,
    },
    /// Map names with their level counts.
    MapList(Vec<(String, usize)>),
    Stats {
        map: String,
        stats: MapStatsView,
    },
    Failed(String),
}

impl From<DropperError> for Feedback {
    fn from(error: DropperError) -> Self {
        match error {
            DropperError::MapNotFound(map) => Feedback::MapNotFound(map),
            DropperError::MapAlreadyExists(map) => Feedback::MapAlreadyExists(map),
            DropperError::InvalidMapName(map) => Feedback::InvalidMapName(map),
            DropperError::MapNotPlayable(map) => Feedback::MapNotPlayable(map),
            DropperError::LevelNotFound { map, level } => Feedback::LevelNotFound { map, level },
            DropperError::InvalidLevelNumber(level) => Feedback::InvalidLevel(level),
            DropperError::AlreadyActive => Feedback::AlreadyInGame,
            DropperError::NoActiveSession => Feedback::NoActiveGame,
            other => Feedback::Failed(other.to_string()),
        }
    }
}

impl fmt::Display for Feedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feedback::Usage(text) => write!(f, "{}", text.trim_end()),
            Feedback::PlayerOnly => write!(f, "This command can only be used by players."),
            Feedback::MapCreated(map) => write!(f, "Map {} created.", map),
            Feedback::MapAlreadyExists(map) => write!(f, "A map named {} already exists.", map),
            Feedback::InvalidMapName(map) => write!(f, "{} can't be used as a map name.", map),
            Feedback::MapDeleted(map) => write!(f, "Map {} deleted.", map),
            Feedback::MapNotFound(map) => write!(f, "Map {} not found.", map),
            Feedback::MapNotPlayable(map) => write!(
                f,
                "{} is not ready yet! It needs a complete level 1 and no unfinished levels.",
                map
            ),
            Feedback::AlreadyInGame => write!(f, "You are already playing a dropper map."),
            Feedback::NoActiveGame => write!(f, "You are not playing a dropper map."),
            Feedback::GameStarted(map) => write!(f, "Started playing {}.", map),
            Feedback::GameStopped => write!(f, "Your dropper game has been stopped."),
            Feedback::LevelPointSet { map, level, point } => {
                let point = match point {
                    LevelPoint::Start => "start",
                    LevelPoint::End => "end",
                };
                write!(f, "Set {} location for level {} of {}.", point, level, map)
            }
            Feedback::CheckpointSet { map, level } => {
                write!(f, "Checkpoint set for level {} of {}.", level, map)
            }
            Feedback::LevelRemoved { map, level } => {
                write!(f, "Removed level {} from {}.", level, map)
            }
            Feedback::LevelNotFound { map, level } => {
                write!(f, "Level {} doesn't exist in {}!", level, map)
            }
            Feedback::InvalidLevel(level) => write!(f, "Invalid level number: {}", level),
            Feedback::NoStartLocation { map, level } => {
                write!(f, "Level {} of {} doesn't have a start location!", level, map)
            }
            Feedback::Teleported { map, level } => {
                write!(f, "Teleported to level {} of {}.", level, map)
            }
            Feedback::MapList(maps) if maps.is_empty() => {
                write!(f, "No maps have been created yet.")
            }
            Feedback::MapList(maps) => {
                write!(f, "Dropper maps:")?;
                for (name, levels) in maps {
                    write!(f, "\n - {} ({} levels)", name, levels)?;
                }
                Ok(())
            }
            Feedback::Stats { map, stats } => write!(f, "Statistics for {}: {}", map, stats),
            Feedback::Failed(reason) => write!(f, "Command failed: {}", reason),
        }
    }
}

/// Result of running a command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    pub feedback: Feedback,
    pub effects: Vec<Effect>,
}

impl From<Feedback> for CommandOutcome {
    fn from(feedback: Feedback) -> Self {
        Self {
            feedback,
            effects: Vec::new(),
        }
    }
}

/// Mutable view of the server state a command runs against.
pub struct CommandContext<'a> {
    pub maps: &'a mut MapStore,
    pub stats: &'a mut StatisticsStore,
    pub sessions: &'a mut SessionRegistry,
    pub config: &'a DropperConfig,
}

impl<'a> CommandContext<'a> {
    fn engine(&mut self) -> ProgressionEngine<'_> {
        ProgressionEngine::new(&*self.maps, &mut *self.stats, &mut *self.sessions, self.config)
    }

    /// Parses and runs the words after `/dropper`.
    pub fn dispatch<I, S>(&mut self, sender: &CommandSender, args: I) -> CommandOutcome
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        match DropperCommand::parse(args) {
            Ok(command) => self.execute(sender, command),
            Err(e) => Feedback::Usage(e.render().to_string()).into(),
        }
    }

    pub fn execute(&mut self, sender: &CommandSender, command: DropperCommand) -> CommandOutcome {
        debug!("{} ran {:?}", sender.name(), command);

        let player = match sender {
            CommandSender::Player(player) => Some(player),
            CommandSender::Console if command.player_only() => {
                return Feedback::PlayerOnly.into();
            }
            CommandSender::Console => None,
        };

        match (command, player) {
            (DropperCommand::Create { map }, _) => match self.maps.create(&map, sender.name()) {
                Ok(()) => {
                    info!("{} created map {}", sender.name(), map);
                    Feedback::MapCreated(map).into()
                }
                Err(e) => Feedback::from(e).into(),
            },
            (DropperCommand::Delete { map }, _) => {
                if !self.maps.exists(&map) {
                    return Feedback::MapNotFound(map).into();
                }
                // Players on the map go back to where they started
                let effects = self.engine().stop_map(&map);
                self.maps.delete(&map);
                info!("{} deleted map {}", sender.name(), map);
                CommandOutcome {
                    feedback: Feedback::MapDeleted(map),
                    effects,
                }
            }
            (DropperCommand::List, _) => Feedback::MapList(
                self.maps
                    .list()
                    .into_iter()
                    .map(|map| (map.name.clone(), map.level_count()))
                    .collect(),
            )
            .into(),
            (command, Some(player)) => self.execute_as_player(player, command),
            (_, None) => Feedback::PlayerOnly.into(),
        }
    }

    fn execute_as_player(
        &mut self,
        player: &PlayerSnapshot,
        command: DropperCommand,
    ) -> CommandOutcome {
        match command {
            DropperCommand::Start { map } => {
                let display = self
                    .maps
                    .get(&map)
                    .map(|m| m.name.clone())
                    .unwrap_or_else(|| map.clone());
                match self.engine().start(player.clone(), &map) {
                    Ok(effects) => CommandOutcome {
                        feedback: Feedback::GameStarted(display),
                        effects,
                    },
                    Err(e) => Feedback::from(e).into(),
                }
            }
            DropperCommand::Stop => match self
                .engine()
                .stop(&player.id, StopReason::Voluntary)
                .ok_or(DropperError::NoActiveSession)
            {
                Ok(effects) => CommandOutcome {
                    feedback: Feedback::GameStopped,
                    effects,
                },
                Err(e) => Feedback::from(e).into(),
            },
            DropperCommand::SetLevel { map, level, point } => {
                let point = LevelPoint::from(point);
                match self
                    .maps
                    .set_level_point(&map, level, point, player.location.clone())
                {
                    Ok(()) => Feedback::LevelPointSet { map, level, point }.into(),
                    Err(e) => Feedback::from(e).into(),
                }
            }
            DropperCommand::Checkpoint { map, level } => {
                match self
                    .maps
                    .set_checkpoint(&map, level, player.location.clone())
                {
                    Ok(()) => Feedback::CheckpointSet { map, level }.into(),
                    Err(e) => Feedback::from(e).into(),
                }
            }
            DropperCommand::RemoveLevel { map, level } => {
                match self.maps.remove_level(&map, level) {
                    Ok(_) => Feedback::LevelRemoved { map, level }.into(),
                    Err(e) => Feedback::from(e).into(),
                }
            }
            DropperCommand::Stats { map } => match self.maps.get(&map) {
                Some(found) => Feedback::Stats {
                    map: found.name.clone(),
                    stats: self.stats.map_stats_view(&player.id, &found.name),
                }
                .into(),
                None => Feedback::MapNotFound(map).into(),
            },
            DropperCommand::Tp { map, level } => {
                let Some(found) = self.maps.get(&map) else {
                    return Feedback::MapNotFound(map).into();
                };
                match found.level(level).and_then(|l| l.start.clone()) {
                    Some(to) => CommandOutcome {
                        feedback: Feedback::Teleported {
                            map: found.name.clone(),
                            level,
                        },
                        effects: vec![Effect::Teleport {
                            player: player.id,
                            to,
                        }],
                    },
                    None => Feedback::NoStartLocation { map, level }.into(),
                }
            }
            DropperCommand::Create { .. }
            | DropperCommand::Delete { .. }
            | DropperCommand::List => Feedback::Failed("not a player command".to_string()).into(),
        }
    }
}

/// Tab completion for the words typed after `/dropper`.
///
/// The last word is the one being completed and may be empty.
pub fn complete(args: &[&str], maps: &MapStore) -> Vec<String> {
    match args {
        [word] => starting_with(&SUBCOMMANDS, word),
        [subcommand, word] if takes_map(subcommand) => {
            let prefix = word.to_lowercase();
            maps.list()
                .into_iter()
                .filter(|map| map.key().starts_with(&prefix))
                .map(|map| map.name.clone())
                .collect()
        }
        [subcommand, _, _, word] if subcommand.eq_ignore_ascii_case("setlevel") => {
            starting_with(&["start", "end"], word)
        }
        _ => Vec::new(),
    }
}

fn takes_map(subcommand: &str) -> bool {
    MAP_SUBCOMMANDS
        .iter()
        .any(|s| s.eq_ignore_ascii_case(subcommand))
}

fn starting_with(candidates: &[&str], word: &str) -> Vec<String> {
    let prefix = word.to_lowercase();
    candidates
        .iter()
        .filter(|s| s.starts_with(&prefix))
        .map(|s| s.to_string())
        .collect()
}
