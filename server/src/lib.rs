//! # Bomberman Match Server Library
//!
//! This library provides the authoritative server for a turn-based,
//! grid-based multiplayer Bomberman match. Players connect over plain TCP
//! and send one line-oriented command per round; spectators connect on a
//! second port and receive every match event as a JSON line.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Match State
//! The server owns the only copy of the map, the players and the bombs. All
//! rule decisions (movement, bomb placement, explosions, paralysis, scoring)
//! are made here; clients only ever see the results.
//!
//! ### Player Lifecycle
//! Handles the complete lifecycle of a player connection:
//! - Handshake with a unique ID and display name
//! - Capacity and match-phase checks before admission
//! - Command intake, echoed back line by line
//! - Disconnect reporting and cleanup
//!
//! ### Spectator Broadcasting
//! Every state change is rendered into a `shared::MatchEvent` and written
//! to all attached spectators in the order it happened.
//!
//! ## Architecture Design
//!
//! ### Single Serialized Engine
//! One task owns the `session::MatchSession` and drains a bounded command
//! queue. Joins, inputs, leaves, the start timer and the round clock all
//! arrive on that queue, so no lock guards the match state and commands are
//! applied strictly in arrival order.
//!
//! ### Match Lifecycle
//! A session moves through Waiting, Starting (a grace delay once enough
//! players are connected), Running and Ended. If players leave during the
//! grace delay the session falls back to Waiting. A session plays a fixed
//! number of games back to back, each on a freshly generated map.
//!
//! ### Line-Based TCP Protocol
//! Player connections speak UTF-8 lines. Each connection has a reader task
//! feeding the command queue and a writer task draining the player's
//! outbox, so a slow socket never stalls the engine.
//!
//! ## Module Organization
//!
//! ### Grid Module (`grid`)
//! The map: walls, pickups, per-cell occupants, blast rays and spawn points.
//!
//! ### Registry Module (`registry`)
//! Connected players with identity, position, paralysis, score and the
//! handle used to send them lines.
//!
//! ### Bomb Module (`bomb`)
//! Fuses counted in rounds, detonation along the four axes and chain
//! reactions between bombs.
//!
//! ### Session Module (`session`)
//! The match state machine and its command vocabulary.
//!
//! ### Gateway and Spectator Modules (`gateway`, `spectators`)
//! Accept loops, per-connection tasks and the spectator fan-out.
//!
//! ### Server Module (`server`)
//! Binds both listeners and spawns every long-running task.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::{MatchConfig, ServerConfig};
//! use server::server::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let match_config = MatchConfig {
//!         required_players: 2,
//!         max_players: 4,
//!         ..MatchConfig::default()
//!     };
//!
//!     // Binds players on 5000 and spectators on 5001
//!     let server = Server::bind(ServerConfig::default(), match_config).await?;
//!
//!     // Runs the match engine, the round clock and both accept loops
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod bomb;
pub mod config;
pub mod error;
pub mod gateway;
pub mod grid;
pub mod registry;
pub mod server;
pub mod session;
pub mod spectators;
pub mod utils;
