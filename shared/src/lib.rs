//! Types shared by the tile-world client and server: the asset and player
//! data model, the wire protocol with its framing, and the tile collision
//! detector both sides agree on.

pub mod collision;
pub mod model;
pub mod protocol;

pub use collision::{detect_collision, Collision, TileLayout};
pub use model::{
    state_f32, Asset, AssetType, Dimensions, EntityAsset, EntityId, EntityState, EntityStub,
    LocationInfo, MapAsset, MapExit, PlayerInfo, PlayerState, PropPlacement, StateValue,
    TileAsset, TilePoint,
};
pub use protocol::{
    EntityStateUpdate, InitialMapState, ResourceRequest, ResourceResponse, ResourceRoute,
    SessionPacket,
};

/// Edge length of a map tile in pixels.
pub const TILE_SIZE: f32 = 32.0;

/// Entity type the local player's own entity is instantiated with, in place
/// of whatever type the server reported for it.
pub const PLAYER_CONTROLLED_ENTITY_TYPE: &str = "playerControlledEntity";

/// Entity type the server reports for every player avatar.
pub const PLAYER_ENTITY_TYPE: &str = "player";

/// Well-known entity state keys.
pub mod state_keys {
    pub const X: &str = "X";
    pub const Y: &str = "Y";
    pub const NAME: &str = "Name";
    pub const FACING: &str = "Facing";
}
