//! # Tile World Server Library
//!
//! Authoritative side of the tile world. It serves the declarative assets
//! clients render from, remembers where every player stands, and keeps the
//! canonical entity list of each map in sync across connected clients.
//!
//! ## Core Responsibilities
//!
//! ### Resource Service
//! One request per connection: asset JSON, tile and sprite images, and the
//! login record of a player. New players are placed on the start map.
//!
//! ### Map Sessions
//! A client holds one persistent connection per map it stands on. Joining
//! spawns the player's entity and answers with its id followed by a
//! snapshot of the map. From then on the server relays:
//! - entity updates sent by the owning client
//! - creations and removals as players come and go
//! - wanderer movement
//! - a fresh player record when the player walks onto a map exit
//!
//! ## Architecture Design
//!
//! ### Single Owner Event Loop
//! One task owns the entity state of all maps. Connection tasks only turn
//! socket frames into [`network::ServerMessage`]s and queued packets back
//! into frames, so world state needs no locking.
//!
//! ### TCP Framing
//! Both services use the length-prefixed bincode frames from `shared`.
//! Session traffic is ordered and reliable, which the client's map sync
//! relies on.
//!
//! ## Module Organization
//!
//! ### Assets (`assets`)
//! Reads the asset directory, validates maps and answers collision-free
//! placement questions.
//!
//! ### Players (`players`, `session`, `client_manager`)
//! Player records shared with the resource service, one
//! [`session::PlayerSession`] per connection, and the registry that fans
//! pushes out to a map.
//!
//! ### World (`game`)
//! Per-map entity tables, spawning, exits and wandering NPCs.
//!
//! ### Services (`network`, `resources`)
//! The map server loop and the request/response service.

pub mod assets;
pub mod client_manager;
pub mod error;
pub mod game;
pub mod network;
pub mod players;
pub mod resources;
pub mod session;

pub use error::ServerError;
