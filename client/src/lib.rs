//! # Tile World Client Library
//!
//! Client side of a small multiplayer tile world: log in, load the map the
//! player stands on, mirror the entities the map server reports, move the
//! local avatar with the keyboard and draw everything in a window.
//!
//! ## Architecture Overview
//!
//! The window and the world run on different threads. macroquad owns the
//! main thread and its event loop; the world runs on a current-thread tokio
//! runtime next to it. Two watch channels connect them:
//!
//! - frames: the world draws into a [`graphics::FrameRecorder`], which
//!   publishes finished frames that [`rendering::MacroquadCanvas`] replays
//! - keys: [`input::InputManager`] samples the keyboard on the window thread
//!   and the world reads it through [`input::SharedInput`]
//!
//! ### Data flow
//! Everything the world knows comes through a [`data_source::DataSource`]:
//! assets, images and the login player state over request/response, and the
//! live map through one persistent session. The production implementation is
//! [`network::NetworkDataSource`]. Assets are memoized in a
//! [`cache::AssetCache`].
//!
//! ### The world
//! [`world::WorldManager`] walks the session lifecycle (login, map load, map
//! sync) and then runs the frame loop: apply pushes as they arrive, and at
//! most once per frame interval tick every entity, push the local player's
//! state if it changed, and draw.
//!
//! ## Module Organization
//!
//! ### Entities (`entity`, `behaviors`)
//! - Entity ids, types and string-keyed state
//! - Optional capabilities: initialize, tick, draw, export state
//! - Behaviors looked up by name from declarative entity assets
//!
//! ### Map (`map`)
//! The loaded map asset plus its tiles; answers collision queries.
//!
//! ### Rendering (`graphics`, `rendering`, `images`)
//! - Drawing surface trait and the frame recorder
//! - Camera following the player, terrain culling, loading messages
//! - Image decoding off the window thread
//!
//! ### Boot (`app`, `config`, `error`)
//! Command line configuration, the error type, and the start-up sequence.

pub mod app;
pub mod behaviors;
pub mod cache;
pub mod config;
pub mod data_source;
pub mod entity;
pub mod error;
pub mod graphics;
pub mod images;
pub mod input;
pub mod map;
pub mod network;
pub mod rendering;
pub mod world;

pub use config::ClientConfig;
pub use error::ClientError;
