//! Asset directory access.
//!
//! Layout under the root:
//!
//! ```text
//! map/{id}.json     tile/{id}.json     entity/{id}.json     images/{file}
//! ```
//!
//! Maps and tiles are parsed once at start-up because the server needs them
//! for spawning, exits and wanderer movement. Resource requests are answered
//! from disk so edits show up without a restart.

use crate::error::ServerError;
use log::{debug, info, warn};
use shared::{AssetType, EntityAsset, MapAsset, TileAsset, TILE_SIZE};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Footprint used when the player entity asset does not define one.
const DEFAULT_FOOTPRINT: (f32, f32) = (24.0, 24.0);

#[derive(Debug)]
pub struct AssetStore {
    root: PathBuf,
    maps: HashMap<String, Arc<MapAsset>>,
    tiles: HashMap<String, TileAsset>,
    player_footprint: (f32, f32),
}

impl AssetStore {
    pub fn load(root: impl Into<PathBuf>) -> Result<Self, ServerError> {
        let root = root.into();

        let maps: HashMap<String, Arc<MapAsset>> = read_all::<MapAsset>(&root.join("map"))?
            .into_iter()
            .map(|map| (map.id.clone(), Arc::new(map)))
            .collect();
        let tiles: HashMap<String, TileAsset> = read_all::<TileAsset>(&root.join("tile"))?
            .into_iter()
            .map(|tile| (tile.id.clone(), tile))
            .collect();

        for map in maps.values() {
            validate_map(&root, map, &tiles)?;
        }

        let player_path = root.join("entity").join(format!("{}.json", shared::PLAYER_ENTITY_TYPE));
        let player_footprint = match std::fs::read(&player_path) {
            Ok(bytes) => {
                let asset: EntityAsset = serde_json::from_slice(&bytes).map_err(|source| {
                    ServerError::Decode {
                        path: player_path.clone(),
                        source,
                    }
                })?;
                (asset.width, asset.height)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("No player entity asset, using default footprint");
                DEFAULT_FOOTPRINT
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            "Loaded {} maps and {} tiles from {}",
            maps.len(),
            tiles.len(),
            root.display()
        );

        Ok(Self {
            root,
            maps,
            tiles,
            player_footprint,
        })
    }

    pub fn map(&self, map_id: &str) -> Option<Arc<MapAsset>> {
        self.maps.get(map_id).cloned()
    }

    pub fn map_ids(&self) -> impl Iterator<Item = &str> {
        self.maps.keys().map(String::as_str)
    }

    pub fn player_footprint(&self) -> (f32, f32) {
        self.player_footprint
    }

    /// True when `(x, y)` is inside the map and its tile is not solid.
    pub fn is_walkable(&self, map: &MapAsset, x: u32, y: u32) -> bool {
        map.tile_index(x as usize, y as usize)
            .and_then(|index| map.tile_assets.get(index))
            .and_then(|tile_id| self.tiles.get(tile_id))
            .is_some_and(|tile| !tile.solid)
    }

    /// Tile containing the center of a player standing at pixel `(x, y)`.
    pub fn player_tile(&self, x: f32, y: f32) -> (u32, u32) {
        let (width, height) = self.player_footprint;
        let tile_x = ((x + width / 2.0) / TILE_SIZE).floor().max(0.0);
        let tile_y = ((y + height / 2.0) / TILE_SIZE).floor().max(0.0);
        (tile_x as u32, tile_y as u32)
    }

    /// Raw JSON of an asset, or `None` if there is no such asset.
    pub async fn read_asset(&self, asset_type: AssetType, asset_id: &str) -> Result<Option<Vec<u8>>, ServerError> {
        let path = self
            .root
            .join(asset_type.as_str())
            .join(format!("{}.json", asset_id));
        read_optional(&path).await
    }

    pub async fn read_image(&self, file: &str) -> Result<Option<Vec<u8>>, ServerError> {
        read_optional(&self.root.join("images").join(file)).await
    }
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, ServerError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            debug!("Serving {}", path.display());
            Ok(Some(bytes))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn read_all<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>, ServerError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!("Asset directory {} is missing", dir.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    let mut assets = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        let bytes = std::fs::read(&path)?;
        let asset = serde_json::from_slice(&bytes).map_err(|source| ServerError::Decode {
            path: path.clone(),
            source,
        })?;
        assets.push(asset);
    }
    Ok(assets)
}

fn validate_map(root: &Path, map: &MapAsset, tiles: &HashMap<String, TileAsset>) -> Result<(), ServerError> {
    let path = root.join("map").join(format!("{}.json", map.id));
    let fail = |reason: String| ServerError::Asset {
        path: path.clone(),
        reason,
    };

    if map.map_data.len() != map.dimensions.height as usize
        || map
            .map_data
            .iter()
            .any(|row| row.len() != map.dimensions.width as usize)
    {
        return Err(fail("MapData does not match Dimensions".to_string()));
    }
    if let Some(index) = map.map_data.iter().flatten().find(|&&index| index >= map.tile_assets.len()) {
        return Err(fail(format!("tile index {} has no entry in TileAssets", index)));
    }
    if let Some(missing) = map.tile_assets.iter().find(|id| !tiles.contains_key(*id)) {
        return Err(fail(format!("unknown tile asset '{}'", missing)));
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_support::ScratchAssets;
    use super::*;

    #[test]
    fn test_load_parses_maps_and_tiles() {
        let scratch = ScratchAssets::new().with_town_and_forest();
        let store = AssetStore::load(scratch.path()).unwrap();

        let town = store.map("town").unwrap();
        assert_eq!(town.exits.len(), 1);
        assert!(store.map("forest").is_some());
        assert!(store.map("castle").is_none());
        assert_eq!(store.player_footprint(), (16.0, 16.0));

        assert!(store.is_walkable(&town, 0, 0));
        assert!(!store.is_walkable(&town, 1, 1));
        assert!(!store.is_walkable(&town, 3, 0));
    }

    #[test]
    fn test_player_tile_uses_footprint_center() {
        let scratch = ScratchAssets::new().with_town_and_forest();
        let store = AssetStore::load(scratch.path()).unwrap();

        assert_eq!(store.player_tile(0.0, 0.0), (0, 0));
        assert_eq!(store.player_tile(20.0, 60.0), (0, 2));
        assert_eq!(store.player_tile(24.0, 0.0), (1, 0));
    }

    #[test]
    fn test_map_with_unknown_tile_is_rejected() {
        let scratch = ScratchAssets::new();
        scratch.write(
            "map/broken.json",
            r#"{"Id":"broken","Dimensions":{"Width":1,"Height":1},
                "MapData":[[0]],"TileAssets":["lava"]}"#,
        );
        let result = AssetStore::load(scratch.path());
        assert!(matches!(result, Err(ServerError::Asset { .. })));
    }

    #[test]
    fn test_bad_json_is_a_decode_error() {
        let scratch = ScratchAssets::new();
        scratch.write("tile/oops.json", "{");
        let result = AssetStore::load(scratch.path());
        assert!(matches!(result, Err(ServerError::Decode { .. })));
    }

    #[tokio::test]
    async fn test_reads_raw_files() {
        let scratch = ScratchAssets::new().with_town_and_forest();
        let store = AssetStore::load(scratch.path()).unwrap();

        let body = store.read_asset(AssetType::Tile, "grass").await.unwrap().unwrap();
        assert!(String::from_utf8(body).unwrap().contains("grass.png"));
        assert!(store.read_asset(AssetType::Map, "castle").await.unwrap().is_none());
        assert_eq!(
            store.read_image("grass.png").await.unwrap(),
            Some(b"not really a png".to_vec())
        );
    }
}
