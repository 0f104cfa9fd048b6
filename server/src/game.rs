use crate::assets::AssetStore;
use log::{debug, info, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use shared::{
    state_f32, state_keys, EntityId, EntityState, EntityStateUpdate, EntityStub, InitialMapState,
    MapAsset, MapExit, PropPlacement, StateValue, TilePoint, PLAYER_ENTITY_TYPE, TILE_SIZE,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

pub const WANDERER_ENTITY_TYPE: &str = "wanderer";

/// Ticks a wanderer waits between steps.
const WANDER_PAUSE_TICKS: std::ops::Range<u32> = 10..40;

const STEPS: [(i64, i64); 4] = [(0, -1), (0, 1), (-1, 0), (1, 0)];

/// Entities living on one map.
#[derive(Debug)]
pub struct MapWorld {
    pub map: Arc<MapAsset>,
    entities: BTreeMap<EntityId, EntityStub>,
    /// Wanderer id -> ticks left before its next step.
    wanderers: HashMap<EntityId, u32>,
}

impl MapWorld {
    fn new(map: Arc<MapAsset>) -> Self {
        Self {
            map,
            entities: BTreeMap::new(),
            wanderers: HashMap::new(),
        }
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityStub> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Authoritative entity state for every loaded map.
#[derive(Debug)]
pub struct GameState {
    pub tick: u64,
    assets: Arc<AssetStore>,
    maps: HashMap<String, MapWorld>,
    next_entity_id: EntityId,
}

impl GameState {
    pub fn new(assets: Arc<AssetStore>) -> Self {
        let maps = assets
            .map_ids()
            .filter_map(|id| assets.map(id))
            .map(|map| (map.id.clone(), MapWorld::new(map)))
            .collect();

        let mut game = Self {
            tick: 0,
            assets,
            maps,
            next_entity_id: 1,
        };
        game.place_props();
        game
    }

    /// Spawns the static entities listed in each map's `Props`.
    fn place_props(&mut self) {
        let placements: Vec<(String, PropPlacement)> = self
            .maps
            .values()
            .flat_map(|world| {
                world
                    .map
                    .props
                    .iter()
                    .map(move |prop| (world.map.id.clone(), prop.clone()))
            })
            .collect();

        for (map_id, prop) in placements {
            let Some(world) = self.maps.get(&map_id) else {
                continue;
            };
            if world.map.tile_index(prop.at.x as usize, prop.at.y as usize).is_none() {
                warn!(
                    "Prop {} at ({}, {}) lies outside {}",
                    prop.entity_type, prop.at.x, prop.at.y, map_id
                );
                continue;
            }

            let id = self.allocate_id();
            let stub = EntityStub {
                entity_id: id,
                entity_type: prop.entity_type,
                entity_state: position_state(prop.at, (TILE_SIZE, TILE_SIZE)),
            };
            if let Some(world) = self.maps.get_mut(&map_id) {
                world.entities.insert(id, stub);
            }
        }
    }

    pub fn world(&self, map_id: &str) -> Option<&MapWorld> {
        self.maps.get(map_id)
    }

    pub fn entity(&self, map_id: &str, entity_id: EntityId) -> Option<&EntityStub> {
        self.maps.get(map_id)?.entities.get(&entity_id)
    }

    fn allocate_id(&mut self) -> EntityId {
        let id = self.next_entity_id;
        self.next_entity_id += 1;
        id
    }

    /// Places `count` wanderers on random walkable tiles of every map.
    pub fn populate_wanderers(&mut self, count: usize, rng: &mut impl Rng) {
        let map_ids: Vec<String> = self.maps.keys().cloned().collect();
        for map_id in map_ids {
            let Some(world) = self.maps.get(&map_id) else {
                continue;
            };
            let map = Arc::clone(&world.map);
            let mut open: Vec<TilePoint> = walkable_tiles(&self.assets, &map)
                .filter(|tile| *tile != map.spawn)
                .collect();
            open.shuffle(rng);

            for tile in open.into_iter().take(count) {
                let id = self.allocate_id();
                let stub = EntityStub {
                    entity_id: id,
                    entity_type: WANDERER_ENTITY_TYPE.to_string(),
                    entity_state: position_state(tile, (TILE_SIZE, TILE_SIZE)),
                };
                if let Some(world) = self.maps.get_mut(&map_id) {
                    world.entities.insert(id, stub);
                    world.wanderers.insert(id, rng.gen_range(WANDER_PAUSE_TICKS));
                }
            }
            debug!("Placed wanderers on {}", map_id);
        }
    }

    /// Creates the player entity for `name` on `map_id`. A tile that is not
    /// walkable falls back to the map's spawn tile.
    pub fn spawn_player(&mut self, map_id: &str, name: &str, tile: TilePoint) -> Option<EntityStub> {
        let map = Arc::clone(&self.maps.get(map_id)?.map);
        let tile = if self.assets.is_walkable(&map, tile.x, tile.y) {
            tile
        } else {
            warn!(
                "Tile ({}, {}) on {} is blocked, spawning {} at the map spawn",
                tile.x, tile.y, map_id, name
            );
            map.spawn
        };

        let id = self.allocate_id();
        let mut entity_state = position_state(tile, self.assets.player_footprint());
        entity_state.insert(state_keys::NAME.to_string(), StateValue::from(name));

        let stub = EntityStub {
            entity_id: id,
            entity_type: PLAYER_ENTITY_TYPE.to_string(),
            entity_state,
        };
        self.maps.get_mut(map_id)?.entities.insert(id, stub.clone());
        info!("Spawned {} as entity {} on {}", name, id, map_id);
        Some(stub)
    }

    /// Merges `state` into the entity's state. Keys not mentioned keep
    /// their value.
    pub fn apply_update(&mut self, map_id: &str, entity_id: EntityId, state: &EntityState) -> Option<&EntityStub> {
        let stub = self.maps.get_mut(map_id)?.entities.get_mut(&entity_id)?;
        for (key, value) in state {
            stub.entity_state.insert(key.clone(), value.clone());
        }
        Some(stub)
    }

    pub fn remove_entity(&mut self, map_id: &str, entity_id: EntityId) -> Option<EntityStub> {
        let world = self.maps.get_mut(map_id)?;
        world.wanderers.remove(&entity_id);
        world.entities.remove(&entity_id)
    }

    /// Every entity on the map, in id order.
    pub fn snapshot(&self, map_id: &str) -> Option<InitialMapState> {
        let world = self.maps.get(map_id)?;
        Some(InitialMapState {
            entities: world.entities.values().cloned().collect(),
        })
    }

    /// Tile under the player entity's center.
    pub fn player_tile(&self, map_id: &str, entity_id: EntityId) -> Option<TilePoint> {
        let stub = self.entity(map_id, entity_id)?;
        let x = state_f32(&stub.entity_state, state_keys::X, 0.0);
        let y = state_f32(&stub.entity_state, state_keys::Y, 0.0);
        let (tile_x, tile_y) = self.assets.player_tile(x, y);
        Some(TilePoint { x: tile_x, y: tile_y })
    }

    /// The exit the player entity is standing on, if any.
    pub fn exit_under(&self, map_id: &str, entity_id: EntityId) -> Option<MapExit> {
        let tile = self.player_tile(map_id, entity_id)?;
        let exit = self.maps.get(map_id)?.map.exit_at(tile.x, tile.y)?;
        if !self.maps.contains_key(&exit.target_map) {
            warn!("Exit on {} leads to unknown map {}", map_id, exit.target_map);
            return None;
        }
        Some(exit.clone())
    }

    /// Advances every wanderer by one tick. Wanderers whose pause ran out
    /// try one step in a random direction; blocked steps are skipped.
    pub fn step_wanderers(&mut self, rng: &mut impl Rng) -> Vec<(String, EntityStateUpdate)> {
        let mut moved = Vec::new();

        for (map_id, world) in self.maps.iter_mut() {
            for (&entity_id, pause) in world.wanderers.iter_mut() {
                if *pause > 0 {
                    *pause -= 1;
                    continue;
                }
                *pause = rng.gen_range(WANDER_PAUSE_TICKS);

                let Some(stub) = world.entities.get_mut(&entity_id) else {
                    continue;
                };
                let x = state_f32(&stub.entity_state, state_keys::X, 0.0);
                let y = state_f32(&stub.entity_state, state_keys::Y, 0.0);
                let (dx, dy) = STEPS[rng.gen_range(0..STEPS.len())];
                let target_x = (x / TILE_SIZE).round() as i64 + dx;
                let target_y = (y / TILE_SIZE).round() as i64 + dy;
                if target_x < 0 || target_y < 0 {
                    continue;
                }
                let target = TilePoint {
                    x: target_x as u32,
                    y: target_y as u32,
                };
                if !self.assets.is_walkable(&world.map, target.x, target.y) {
                    continue;
                }

                let state = position_state(target, (TILE_SIZE, TILE_SIZE));
                stub.entity_state.extend(state.clone());
                moved.push((map_id.clone(), EntityStateUpdate { entity_id, state }));
            }
        }

        self.tick += 1;
        moved
    }
}

/// `X`/`Y` state placing an entity of `footprint` centered on `tile`.
fn position_state(tile: TilePoint, footprint: (f32, f32)) -> EntityState {
    let (width, height) = footprint;
    let x = tile.x as f32 * TILE_SIZE + (TILE_SIZE - width) / 2.0;
    let y = tile.y as f32 * TILE_SIZE + (TILE_SIZE - height) / 2.0;

    let mut state = EntityState::new();
    state.insert(state_keys::X.to_string(), StateValue::from(x as f64));
    state.insert(state_keys::Y.to_string(), StateValue::from(y as f64));
    state
}

fn walkable_tiles<'a>(assets: &'a AssetStore, map: &'a MapAsset) -> impl Iterator<Item = TilePoint> + 'a {
    (0..map.dimensions.height).flat_map(move |y| {
        (0..map.dimensions.width)
            .filter(move |&x| assets.is_walkable(map, x, y))
            .map(move |x| TilePoint { x, y })
    })
}
