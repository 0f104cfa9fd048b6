//! Player records shared by the resource service and the map server.
//!
//! Records live in memory only and are lost on restart.

use log::info;
use shared::{PlayerState, TilePoint};
use std::collections::HashMap;

#[derive(Debug)]
pub struct PlayerDirectory {
    players: HashMap<String, PlayerState>,
    start_map: String,
    start_tile: TilePoint,
}

impl PlayerDirectory {
    pub fn new(start_map: impl Into<String>, start_tile: TilePoint) -> Self {
        Self {
            players: HashMap::new(),
            start_map: start_map.into(),
            start_tile,
        }
    }

    /// Returns the player's record, creating one on the start map for a
    /// token seen for the first time.
    pub fn login(&mut self, token: &str) -> PlayerState {
        if let Some(state) = self.players.get(token) {
            return state.clone();
        }

        info!("New player {} starts on {}", token, self.start_map);
        let state = PlayerState::new(token, &self.start_map, self.start_tile);
        self.players.insert(token.to_string(), state.clone());
        state
    }

    pub fn get(&self, token: &str) -> Option<&PlayerState> {
        self.players.get(token)
    }

    /// Places the player on `map_id` at `tile`, creating the record if
    /// needed. Clears the entity id, which belongs to the old placement.
    pub fn relocate(&mut self, token: &str, map_id: &str, tile: TilePoint) -> PlayerState {
        let state = self
            .players
            .entry(token.to_string())
            .or_insert_with(|| PlayerState::new(token, map_id, tile));
        state.location_info.location_id = map_id.to_string();
        state.location_info.tile = tile;
        state.player_entity_id = None;
        state.clone()
    }

    /// Records the tile a player was last seen on, without touching the map.
    pub fn remember_tile(&mut self, token: &str, tile: TilePoint) {
        if let Some(state) = self.players.get_mut(token) {
            state.location_info.tile = tile;
        }
    }

    pub fn set_entity(&mut self, token: &str, entity_id: Option<u32>) {
        if let Some(state) = self.players.get_mut(token) {
            state.player_entity_id = entity_id;
        }
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_login_starts_on_start_map() {
        let mut directory = PlayerDirectory::new("town", TilePoint { x: 2, y: 3 });
        let state = directory.login("alice");

        assert_eq!(state.location_info.location_id, "town");
        assert_eq!(state.location_info.tile, TilePoint { x: 2, y: 3 });
        assert_eq!(state.player_info.name, "alice");
        assert_eq!(state.player_entity_id, None);
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn test_login_returns_existing_record() {
        let mut directory = PlayerDirectory::new("town", TilePoint::default());
        directory.login("alice");
        directory.relocate("alice", "forest", TilePoint { x: 1, y: 1 });

        let state = directory.login("alice");
        assert_eq!(state.location_info.location_id, "forest");
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn test_relocate_clears_entity() {
        let mut directory = PlayerDirectory::new("town", TilePoint::default());
        directory.login("alice");
        directory.set_entity("alice", Some(4));
        assert_eq!(directory.get("alice").unwrap().player_entity_id, Some(4));

        let state = directory.relocate("alice", "forest", TilePoint { x: 5, y: 6 });
        assert_eq!(state.player_entity_id, None);
        assert_eq!(state.location_info.tile, TilePoint { x: 5, y: 6 });
    }

    #[test]
    fn test_remember_tile_keeps_map() {
        let mut directory = PlayerDirectory::new("town", TilePoint::default());
        directory.login("alice");
        directory.remember_tile("alice", TilePoint { x: 7, y: 1 });
        directory.remember_tile("nobody", TilePoint { x: 7, y: 1 });

        let state = directory.get("alice").unwrap();
        assert_eq!(state.location_info.location_id, "town");
        assert_eq!(state.location_info.tile, TilePoint { x: 7, y: 1 });
        assert!(directory.get("nobody").is_none());
    }
}
