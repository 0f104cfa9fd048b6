use crate::cache::LoadedTile;
use shared::{Dimensions, MapAsset, TileLayout, TILE_SIZE};
use std::sync::Arc;

/// The current map with its tiles, index-aligned with `tile_assets`.
#[derive(Debug, Clone)]
pub struct Map {
    asset: Arc<MapAsset>,
    tiles: Vec<LoadedTile>,
}

impl Map {
    pub fn new(asset: Arc<MapAsset>, tiles: Vec<LoadedTile>) -> Self {
        Self { asset, tiles }
    }

    pub fn id(&self) -> &str {
        &self.asset.id
    }

    pub fn asset(&self) -> &MapAsset {
        &self.asset
    }

    pub fn tiles(&self) -> &[LoadedTile] {
        &self.tiles
    }

    /// Tile drawn at tile coordinates `(x, y)`.
    pub fn tile_at(&self, x: usize, y: usize) -> Option<&LoadedTile> {
        self.asset
            .tile_index(x, y)
            .and_then(|index| self.tiles.get(index))
    }

    /// Map size in pixels.
    pub fn pixel_size(&self) -> (f32, f32) {
        (
            self.asset.dimensions.width as f32 * TILE_SIZE,
            self.asset.dimensions.height as f32 * TILE_SIZE,
        )
    }
}

impl TileLayout for Map {
    fn dimensions(&self) -> Dimensions {
        self.asset.dimensions
    }

    fn tile_index(&self, x: usize, y: usize) -> Option<usize> {
        self.asset.tile_index(x, y)
    }

    fn is_solid(&self, tile_index: usize) -> bool {
        self.tiles
            .get(tile_index)
            .map_or(false, |tile| tile.asset.solid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::ImageHandle;
    use shared::{detect_collision, Collision, TileAsset, TilePoint};

    fn checkerboard() -> Map {
        let asset = MapAsset {
            id: "town".to_string(),
            name: "Town".to_string(),
            dimensions: Dimensions { width: 2, height: 2 },
            map_data: vec![vec![0, 1], vec![1, 0]],
            tile_assets: vec!["grass".to_string(), "wall".to_string()],
            spawn: TilePoint::default(),
            exits: Vec::new(),
            props: Vec::new(),
        };
        let tiles = ["grass", "wall"]
            .iter()
            .map(|id| LoadedTile {
                asset: Arc::new(TileAsset {
                    id: id.to_string(),
                    image_uri: format!("/images/{}.png", id),
                    solid: *id == "wall",
                }),
                image: ImageHandle::new(id, 1, 1, vec![0; 4]),
            })
            .collect();
        Map::new(Arc::new(asset), tiles)
    }

    #[test]
    fn test_tile_lookup() {
        let map = checkerboard();
        assert_eq!(map.tile_at(1, 0).unwrap().asset.id, "wall");
        assert_eq!(map.tile_at(1, 1).unwrap().asset.id, "grass");
        assert!(map.tile_at(2, 0).is_none());
        assert_eq!(map.pixel_size(), (64.0, 64.0));
    }

    #[test]
    fn test_map_answers_collision_queries() {
        let map = checkerboard();
        assert_eq!(
            detect_collision(33.0, 1.0, 10.0, 10.0, &map),
            Some(Collision::Terrain { x: 32.0, y: 0.0 })
        );
        assert_eq!(detect_collision(60.0, 0.0, 10.0, 10.0, &map), Some(Collision::Boundary));
    }
}
