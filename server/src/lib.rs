//! # Dropper Server Library
//!
//! This library provides the server-side core of the dropper minigame: players
//! fall through a sequence of numbered levels, each with a start marker, an
//! end marker and an optional checkpoint, racing the clock from the first
//! level to the last.
//!
//! ## Core Responsibilities
//!
//! ### Map Catalog
//! Maps are created and edited through commands and persisted one record per
//! map. Names are case-insensitive and every edit is written through to
//! storage immediately.
//!
//! ### Level Progression
//! Each player plays at most one map at a time. Reaching the end marker moves
//! them to the next level; falling out of bounds, taking a fatal hit or dying
//! sends them back to the level's checkpoint. Finishing the last level
//! records a completion and restores the player.
//!
//! ### Statistics
//! Plays, completions and best times are tracked per player and map and saved
//! as one table.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Event Loop
//! All state lives on one logic task. Host events, commands and autosaves are
//! processed one at a time, so no state is shared between threads.
//!
//! ### Effects Instead of Callbacks
//! The progression engine never touches a player. It answers each event with
//! a list of effects that are then applied to the host, which keeps the
//! engine testable without a running game server.
//!
//! ## Module Organization
//!
//! - `map_store` / `stats_store`: in-memory catalogs backed by `storage`
//! - `session_registry`: active sessions and the player state they saved
//! - `progression`: the level state machine
//! - `events` / `host`: the boundary to the host game server
//! - `commands`: the `/dropper` command surface
//! - `server`: the runtime loop tying it together
//! - `sim_host`: an in-process host used by the binary and the tests
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use dropper_server::server::{DropperServer, Inbound};
//! use dropper_server::sim_host::SimHost;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = DropperServer::open(Path::new("data"), SimHost::new())?;
//!     let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
//!
//!     // Feed host events and commands through `tx`, then stop the loop.
//!     tx.send(Inbound::Shutdown)?;
//!     server.run(rx).await;
//!     Ok(())
//! }
//! ```

pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod host;
pub mod map_store;
pub mod progression;
pub mod server;
pub mod session_registry;
pub mod sim_host;
pub mod stats_store;
pub mod storage;
