use clap::Parser;
use dropper_server::events::{GameEvent, TeleportCause};
use dropper_server::host::EventVerdict;
use dropper_server::server::{DropperServer, HostCall, Inbound};
use dropper_server::sim_host::SimHost;
use dropper_shared::{Location, PlayerId};
use log::{error, info};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding config.json, maps/ and statistics.json
    #[arg(short = 'd', long, default_value = "data")]
    data_dir: PathBuf,

    /// Seconds between autosaves, overriding the config file (0 disables)
    #[arg(short = 'a', long)]
    autosave_interval: Option<u64>,
}

/// One line typed into the console driver.
#[derive(Debug, Clone, PartialEq)]
enum ConsoleLine {
    Join { name: String, at: Location },
    Quit { name: String },
    Move { name: String, x: f64, y: f64, z: f64 },
    Warp { name: String, to: Location },
    Damage { name: String, amount: f64 },
    Die { name: String },
    Respawn { name: String },
    /// `/dropper ...`, optionally prefixed by the player issuing it
    Command { name: Option<String>, args: Vec<String> },
    Exit,
}

const USAGE: &str = "\
join <name> [world x y z] | quit <name> | move <name> <x> <y> <z>
warp <name> <world> <x> <y> <z> [yaw pitch] | damage <name> <amount> | die <name>
respawn <name> | [name] /dropper <args...> | exit";

fn number(word: &str) -> Result<f64, String> {
    word.parse::<f64>()
        .map_err(|_| format!("not a number: {}", word))
}

fn parse_line(line: &str) -> Result<ConsoleLine, String> {
    let words: Vec<&str> = line.split_whitespace().collect();

    match words.as_slice() {
        ["/dropper", args @ ..] => Ok(ConsoleLine::Command {
            name: None,
            args: args.iter().map(|s| s.to_string()).collect(),
        }),
        [name, "/dropper", args @ ..] => Ok(ConsoleLine::Command {
            name: Some(name.to_string()),
            args: args.iter().map(|s| s.to_string()).collect(),
        }),
        ["join", name] => Ok(ConsoleLine::Join {
            name: name.to_string(),
            at: Location::new("lobby", 0.0, 64.0, 0.0),
        }),
        ["join", name, world, x, y, z] => Ok(ConsoleLine::Join {
            name: name.to_string(),
            at: Location::new(*world, number(x)?, number(y)?, number(z)?),
        }),
        ["quit", name] => Ok(ConsoleLine::Quit {
            name: name.to_string(),
        }),
        ["move", name, x, y, z] => Ok(ConsoleLine::Move {
            name: name.to_string(),
            x: number(x)?,
            y: number(y)?,
            z: number(z)?,
        }),
        ["warp", name, world, x, y, z] => Ok(ConsoleLine::Warp {
            name: name.to_string(),
            to: Location::new(*world, number(x)?, number(y)?, number(z)?),
        }),
        ["warp", name, world, x, y, z, yaw, pitch] => Ok(ConsoleLine::Warp {
            name: name.to_string(),
            to: Location::new(*world, number(x)?, number(y)?, number(z)?)
                .with_rotation(number(yaw)? as f32, number(pitch)? as f32),
        }),
        ["damage", name, amount] => Ok(ConsoleLine::Damage {
            name: name.to_string(),
            amount: number(amount)?,
        }),
        ["die", name] => Ok(ConsoleLine::Die {
            name: name.to_string(),
        }),
        ["respawn", name] => Ok(ConsoleLine::Respawn {
            name: name.to_string(),
        }),
        ["exit"] | ["stop"] => Ok(ConsoleLine::Exit),
        _ => Err(USAGE.to_string()),
    }
}

/// Translates console lines into inbound messages for the server loop.
struct ConsoleDriver {
    tx: mpsc::UnboundedSender<Inbound<SimHost>>,
    players: HashMap<String, PlayerId>,
}

impl ConsoleDriver {
    fn new(tx: mpsc::UnboundedSender<Inbound<SimHost>>) -> Self {
        Self {
            tx,
            players: HashMap::new(),
        }
    }

    fn id_of(&self, name: &str) -> Result<PlayerId, String> {
        self.players
            .get(&name.to_lowercase())
            .copied()
            .ok_or_else(|| format!("{} is not online", name))
    }

    /// Runs a host call on the server loop and waits for its verdict.
    async fn call(&self, call: HostCall<SimHost>) -> Result<EventVerdict, String> {
        let (reply, verdict) = oneshot::channel();
        self.tx
            .send(Inbound::Host {
                call,
                reply: Some(reply),
            })
            .map_err(|_| "server loop has stopped".to_string())?;
        verdict
            .await
            .map_err(|_| "server loop has stopped".to_string())
    }

    async fn handle(&mut self, line: ConsoleLine) -> Result<(), String> {
        match line {
            ConsoleLine::Join { name, at } => {
                let id = PlayerId::new_v4();
                self.players.insert(name.to_lowercase(), id);
                self.call(Box::new(move |host: &mut SimHost| {
                    host.join_as(id, &name, at);
                    None
                }))
                .await?;
            }
            ConsoleLine::Quit { name } => {
                let id = self.id_of(&name)?;
                self.players.remove(&name.to_lowercase());
                self.call(Box::new(move |host: &mut SimHost| {
                    host.leave(&id);
                    Some(GameEvent::Disconnect { player: id })
                }))
                .await?;
            }
            ConsoleLine::Move { name, x, y, z } => {
                let id = self.id_of(&name)?;
                self.call(Box::new(move |host: &mut SimHost| {
                    let player = host.sim_player_mut(&id)?;
                    let mut to = player.location.clone();
                    to.x = x;
                    to.y = y;
                    to.z = z;
                    player.location = to.clone();
                    Some(GameEvent::Move { player: id, to })
                }))
                .await?;
            }
            ConsoleLine::Warp { name, to } => {
                let id = self.id_of(&name)?;
                self.call(Box::new(move |host: &mut SimHost| {
                    host.sim_player_mut(&id)?.location = to.clone();
                    Some(GameEvent::Teleport {
                        player: id,
                        to,
                        cause: TeleportCause::Portal,
                    })
                }))
                .await?;
            }
            ConsoleLine::Damage { name, amount } => {
                let id = self.id_of(&name)?;
                let verdict = self
                    .call(Box::new(move |host: &mut SimHost| {
                        let health = host.sim_player_mut(&id)?.health;
                        Some(GameEvent::Damage {
                            player: id,
                            amount,
                            health,
                        })
                    }))
                    .await?;
                if verdict.cancelled {
                    println!("Damage to {} was cancelled", name);
                    return Ok(());
                }

                let dealt = verdict.damage.unwrap_or(amount);
                self.call(Box::new(move |host: &mut SimHost| {
                    let player = host.sim_player_mut(&id)?;
                    player.health = (player.health - dealt).max(0.0);
                    (player.health <= 0.0).then_some(GameEvent::Death { player: id })
                }))
                .await?;
                println!("{} took {:.1} damage", name, dealt);
            }
            ConsoleLine::Die { name } => {
                let id = self.id_of(&name)?;
                let verdict = self
                    .call(Box::new(move |_: &mut SimHost| {
                        Some(GameEvent::Death { player: id })
                    }))
                    .await?;
                if !verdict.cancelled {
                    println!("{} died", name);
                }
            }
            ConsoleLine::Respawn { name } => {
                let id = self.id_of(&name)?;
                self.call(Box::new(move |_: &mut SimHost| {
                    Some(GameEvent::Respawn { player: id })
                }))
                .await?;
                self.call(Box::new(move |host: &mut SimHost| {
                    let player = host.sim_player_mut(&id)?;
                    if let Some(at) = player.respawn_location.clone() {
                        player.location = at;
                    }
                    None
                }))
                .await?;
            }
            ConsoleLine::Command { name, args } => {
                let player = match name {
                    Some(name) => Some(self.id_of(&name)?),
                    None => None,
                };
                let (reply, outcome) = oneshot::channel();
                self.tx
                    .send(Inbound::Command {
                        player,
                        args,
                        reply: Some(reply),
                    })
                    .map_err(|_| "server loop has stopped".to_string())?;
                let outcome = outcome
                    .await
                    .map_err(|_| "server loop has stopped".to_string())?;
                println!("{}", outcome.feedback);
            }
            ConsoleLine::Exit => {
                let _ = self.tx.send(Inbound::Shutdown);
            }
        }
        Ok(())
    }
}

/// Reads console lines until `exit`, end of input or Ctrl+C.
async fn drive_console(tx: mpsc::UnboundedSender<Inbound<SimHost>>) {
    let mut driver = ConsoleDriver::new(tx);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down gracefully...");
                break;
            }
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("Failed to read console input: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match parse_line(&line) {
            Ok(ConsoleLine::Exit) => break,
            Ok(parsed) => {
                if let Err(e) = driver.handle(parsed).await {
                    println!("{}", e);
                }
            }
            Err(usage) => println!("{}", usage),
        }
    }

    let _ = driver.tx.send(Inbound::Shutdown);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut server = DropperServer::open(&args.data_dir, SimHost::new())?;
    if let Some(seconds) = args.autosave_interval {
        server.config_mut().autosave_interval_seconds = seconds;
    }
    info!("Data directory: {}", args.data_dir.display());
    info!("Type commands below; `exit` saves and quits");

    let (tx, rx) = mpsc::unbounded_channel();
    let server_handle = tokio::spawn(async move {
        server.run(rx).await;
    });

    drive_console(tx).await;

    if let Err(e) = server_handle.await {
        error!("Server task panicked: {}", e);
    }

    Ok(())
}
