//! Asset, player and entity records exchanged between client and server.
//!
//! JSON forms use PascalCase field names (`LocationInfo.LocationId`,
//! `MapData`, `TileAssets`, ...), which is how asset files are authored on
//! disk and how resource responses are encoded.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub type EntityId = u32;

/// Named fields copied onto an entity. Ordered so that encoded updates are
/// stable between runs.
pub type EntityState = BTreeMap<String, StateValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    Map,
    Tile,
    Entity,
}

impl AssetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Map => "map",
            AssetType::Tile => "tile",
            AssetType::Entity => "entity",
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "map" => Ok(AssetType::Map),
            "tile" => Ok(AssetType::Tile),
            "entity" => Ok(AssetType::Entity),
            other => Err(format!("unknown asset type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StateValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl StateValue {
    /// Numeric view of the value; integers widen to floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StateValue::Float(v) => Some(*v),
            StateValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            StateValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            StateValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<f64> for StateValue {
    fn from(v: f64) -> Self {
        StateValue::Float(v)
    }
}

impl From<i64> for StateValue {
    fn from(v: i64) -> Self {
        StateValue::Int(v)
    }
}

impl From<bool> for StateValue {
    fn from(v: bool) -> Self {
        StateValue::Bool(v)
    }
}

impl From<&str> for StateValue {
    fn from(v: &str) -> Self {
        StateValue::Text(v.to_string())
    }
}

impl From<String> for StateValue {
    fn from(v: String) -> Self {
        StateValue::Text(v)
    }
}

/// Reads a numeric field, falling back to `default` when absent or not a number.
pub fn state_f32(state: &EntityState, key: &str, default: f32) -> f32 {
    state
        .get(key)
        .and_then(StateValue::as_f64)
        .map(|v| v as f32)
        .unwrap_or(default)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TilePoint {
    pub x: u32,
    pub y: u32,
}

/// A tile that moves a player standing on it to another map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MapExit {
    pub at: TilePoint,
    pub target_map: String,
    pub target: TilePoint,
}

/// A static entity the server places on a map when it starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PropPlacement {
    pub entity_type: String,
    pub at: TilePoint,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MapAsset {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub dimensions: Dimensions,
    /// Tile indices addressed as `map_data[y][x]`.
    pub map_data: Vec<Vec<usize>>,
    /// Tile asset ids; `map_data` values index into this list.
    pub tile_assets: Vec<String>,
    #[serde(default)]
    pub spawn: TilePoint,
    #[serde(default)]
    pub exits: Vec<MapExit>,
    #[serde(default)]
    pub props: Vec<PropPlacement>,
}

impl MapAsset {
    pub fn tile_index(&self, x: usize, y: usize) -> Option<usize> {
        self.map_data.get(y).and_then(|row| row.get(x)).copied()
    }

    pub fn exit_at(&self, x: u32, y: u32) -> Option<&MapExit> {
        self.exits.iter().find(|exit| exit.at.x == x && exit.at.y == y)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TileAsset {
    pub id: String,
    pub image_uri: String,
    #[serde(default)]
    pub solid: bool,
}

fn default_entity_extent() -> f32 {
    24.0
}

/// Declarative entity behaviour descriptor. `behavior` names a factory the
/// client resolves from its registry; nothing here is executable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EntityAsset {
    pub id: String,
    pub behavior: String,
    #[serde(default)]
    pub sprite: Option<String>,
    #[serde(default = "default_entity_extent")]
    pub width: f32,
    #[serde(default = "default_entity_extent")]
    pub height: f32,
    #[serde(default)]
    pub speed: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Asset {
    Map(MapAsset),
    Tile(TileAsset),
    Entity(EntityAsset),
}

impl Asset {
    /// Parses a resource body of the given asset type.
    pub fn from_json(asset_type: AssetType, body: &[u8]) -> Result<Self, serde_json::Error> {
        Ok(match asset_type {
            AssetType::Map => Asset::Map(serde_json::from_slice(body)?),
            AssetType::Tile => Asset::Tile(serde_json::from_slice(body)?),
            AssetType::Entity => Asset::Entity(serde_json::from_slice(body)?),
        })
    }

    pub fn asset_type(&self) -> AssetType {
        match self {
            Asset::Map(_) => AssetType::Map,
            Asset::Tile(_) => AssetType::Tile,
            Asset::Entity(_) => AssetType::Entity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LocationInfo {
    pub location_id: String,
    #[serde(default)]
    pub tile: TilePoint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PlayerInfo {
    pub token: String,
    #[serde(default)]
    pub name: String,
}

/// Server-authoritative player record. Replaced wholesale on every push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PlayerState {
    pub location_info: LocationInfo,
    pub player_info: PlayerInfo,
    #[serde(default)]
    pub player_entity_id: Option<EntityId>,
}

impl PlayerState {
    pub fn new(token: &str, location_id: &str, tile: TilePoint) -> Self {
        Self {
            location_info: LocationInfo {
                location_id: location_id.to_string(),
                tile,
            },
            player_info: PlayerInfo {
                token: token.to_string(),
                name: token.to_string(),
            },
            player_entity_id: None,
        }
    }
}

/// A bare server-reported entity prior to client-side instantiation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EntityStub {
    pub entity_id: EntityId,
    pub entity_type: String,
    pub entity_state: EntityState,
}
