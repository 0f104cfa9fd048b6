//! Rectangle-against-tile-grid collision detection.

use crate::model::Dimensions;
use crate::TILE_SIZE;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Collision {
    /// The rectangle leaves the map.
    Boundary,
    /// The rectangle overlaps a solid tile whose top-left pixel is `(x, y)`.
    Terrain { x: f32, y: f32 },
}

/// Read access to a tile grid, enough to answer collision queries.
pub trait TileLayout {
    fn dimensions(&self) -> Dimensions;

    /// Index of the tile asset at tile coordinates `(x, y)`.
    fn tile_index(&self, x: usize, y: usize) -> Option<usize>;

    fn is_solid(&self, tile_index: usize) -> bool;
}

/// Reports whether the rectangle `(x, y, width, height)` (pixels) hits the
/// map edge or a solid tile.
///
/// The boundary check runs first. Terrain is scanned x-major, y-minor over the
/// tiles that can overlap the rectangle (one extra tile of margin on the
/// lower bound); the first solid overlapping tile in that order is reported,
/// which is not necessarily the closest. Touching edges count as overlap.
pub fn detect_collision(
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    map: &impl TileLayout,
) -> Option<Collision> {
    let dimensions = map.dimensions();
    let map_width = dimensions.width as f32 * TILE_SIZE;
    let map_height = dimensions.height as f32 * TILE_SIZE;

    if x < 0.0 || x + width > map_width || y < 0.0 || y + height > map_height {
        return Some(Collision::Boundary);
    }

    let start_x = (((x - TILE_SIZE) / TILE_SIZE).floor() as i64).max(0);
    let start_y = (((y - TILE_SIZE) / TILE_SIZE).floor() as i64).max(0);
    let end_x = (((x + width) / TILE_SIZE).ceil() as i64).min(dimensions.width as i64 - 1);
    let end_y = (((y + height) / TILE_SIZE).ceil() as i64).min(dimensions.height as i64 - 1);

    for tile_x in start_x..=end_x {
        for tile_y in start_y..=end_y {
            let left = tile_x as f32 * TILE_SIZE;
            let top = tile_y as f32 * TILE_SIZE;

            let overlaps_x = left + TILE_SIZE >= x && left <= x + width;
            let overlaps_y = top + TILE_SIZE >= y && top <= y + height;
            if !(overlaps_x && overlaps_y) {
                continue;
            }

            let solid = map
                .tile_index(tile_x as usize, tile_y as usize)
                .is_some_and(|index| map.is_solid(index));
            if solid {
                return Some(Collision::Terrain { x: left, y: top });
            }
        }
    }

    None
}
