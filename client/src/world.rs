//! The client world: player state, the current map, the live entities, and
//! the loop that keeps them in step with the map server.
//!
//! # Lifecycle
//!
//! ```text
//! Unauthenticated -> AwaitingPlayerState -> MapLoading -> MapSyncing -> Active
//!                                               ^                         |
//!                                               +---- PlayerState push ---+
//! ```
//!
//! A player state naming a different location loads that map (asset plus all
//! tiles, in order) and then resynchronizes: a new map session is opened, the
//! server's `MapState` snapshot replaces every local entity, and pushes that
//! arrived before the snapshot are replayed after it.
//!
//! # Entity bookkeeping
//!
//! Entities live in `MapState::entities`; `lookup` maps each id to its index.
//! Every id in the list has exactly one lookup entry pointing at it, and
//! removal shifts the indices behind it down by one.

use crate::cache::AssetCache;
use crate::data_source::{DataSource, SessionEvent, SessionEvents};
use crate::entity::{BehaviorContext, BehaviorRegistry, Entity, TickContext};
use crate::error::ClientError;
use crate::graphics::FrameSink;
use crate::input::{InputSource, KeyStates};
use crate::map::Map;
use crate::rendering::WorldRenderer;
use log::{debug, error, info, warn};
use shared::{
    detect_collision, Collision, EntityId, EntityState, EntityStub, InitialMapState, PlayerState,
    PLAYER_CONTROLLED_ENTITY_TYPE,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::{sleep, timeout, Instant};

/// Lookup from entity id to its index in `MapState::entities`.
pub type EntityLookupTable = HashMap<EntityId, usize>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Unauthenticated,
    AwaitingPlayerState,
    MapLoading,
    MapSyncing,
    Active,
}

#[derive(Debug, Default)]
pub struct MapState {
    pub entities: Vec<Entity>,
}

/// Accepts a tick only when at least `min_interval` passed since the last one.
#[derive(Debug, Clone)]
pub struct FrameLimiter {
    last_frame: Instant,
    min_interval: Duration,
}

impl FrameLimiter {
    pub fn new(min_interval: Duration, now: Instant) -> Self {
        Self {
            last_frame: now,
            min_interval,
        }
    }

    /// Returns the time since the last accepted tick, or `None` if it is too
    /// early for another one.
    pub fn try_begin(&mut self, now: Instant) -> Option<Duration> {
        let delta = now.saturating_duration_since(self.last_frame);
        if delta < self.min_interval {
            return None;
        }
        self.last_frame = now;
        Some(delta)
    }

    pub fn frames_per_second(delta: Duration) -> u32 {
        let millis = delta.as_secs_f64() * 1000.0;
        if millis <= 0.0 {
            return 0;
        }
        (1000.0 / millis).floor() as u32
    }
}

pub struct WorldManager<D: DataSource> {
    source: Arc<D>,
    cache: AssetCache<D>,
    registry: BehaviorRegistry,
    sync_timeout: Duration,
    frame_interval: Duration,

    phase: SessionPhase,
    state: Option<PlayerState>,
    map: Option<Map>,
    map_state: MapState,
    lookup: EntityLookupTable,

    events: Option<SessionEvents>,
    // Pushes that arrived before the snapshot they apply on top of.
    deferred: VecDeque<SessionEvent>,
    queued_state: Option<PlayerState>,
}

impl<D: DataSource> WorldManager<D> {
    pub fn new(
        source: Arc<D>,
        cache: AssetCache<D>,
        registry: BehaviorRegistry,
        sync_timeout: Duration,
        frame_interval: Duration,
    ) -> Self {
        Self {
            source,
            cache,
            registry,
            sync_timeout,
            frame_interval,
            phase: SessionPhase::Unauthenticated,
            state: None,
            map: None,
            map_state: MapState::default(),
            lookup: EntityLookupTable::new(),
            events: None,
            deferred: VecDeque::new(),
            queued_state: None,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn player_state(&self) -> Option<&PlayerState> {
        self.state.as_ref()
    }

    pub fn player_entity_id(&self) -> Option<EntityId> {
        self.state.as_ref().and_then(|state| state.player_entity_id)
    }

    pub fn current_map(&self) -> Option<&Map> {
        self.map.as_ref()
    }

    pub fn map_state(&self) -> &MapState {
        &self.map_state
    }

    pub fn entity(&self, entity_id: EntityId) -> Option<&Entity> {
        self.lookup
            .get(&entity_id)
            .and_then(|&index| self.map_state.entities.get(index))
    }

    pub fn cache(&self) -> &AssetCache<D> {
        &self.cache
    }

    fn set_phase(&mut self, phase: SessionPhase) {
        if self.phase != phase {
            debug!("Session phase {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
        }
    }

    /// Logs in with `token` and brings the world up to `Active`.
    pub async fn initialize(&mut self, token: &str) -> Result<(), ClientError> {
        info!("Initializing world...");
        self.set_phase(SessionPhase::AwaitingPlayerState);

        let state = self.source.fetch_player_state(token).await?;
        info!("Got player state.");

        self.handle_player_state_change(state).await?;
        info!("World manager initialized!");
        Ok(())
    }

    /// Adopts `new_state`, loading and syncing a new map if the location
    /// changed. Returns whether any map change happened.
    pub async fn handle_player_state_change(&mut self, new_state: PlayerState) -> Result<bool, ClientError> {
        let mut next = Some(new_state);
        let mut changed = false;

        // A sync can surface a further PlayerState push; it is applied here
        // rather than from inside the sync.
        while let Some(state) = next.take() {
            changed |= self.apply_player_state(state).await?;
            next = self.queued_state.take();
        }

        self.set_phase(SessionPhase::Active);
        Ok(changed)
    }

    async fn apply_player_state(&mut self, mut new_state: PlayerState) -> Result<bool, ClientError> {
        let changed = self.handle_map_update(&new_state).await?;

        if !changed && new_state.player_entity_id.is_none() {
            new_state.player_entity_id = self.player_entity_id();
        }
        self.state = Some(new_state);
        info!("Player state updated.");

        if changed {
            info!("Player moved to a new region, syncing map state.");
            if let Err(e) = self.sync_map_state().await {
                self.drop_map_state();
                return Err(e);
            }
        }
        Ok(changed)
    }

    /// Forgets every entity of the previous map after a failed sync. The new
    /// map and location stay installed; the player has no entity on it yet.
    fn drop_map_state(&mut self) {
        warn!("Map sync failed, dropping {} stale entities", self.map_state.entities.len());
        self.map_state = MapState::default();
        self.lookup.clear();
        self.events = None;
        self.deferred.clear();
        self.source.close_map_session();
        if let Some(state) = self.state.as_mut() {
            state.player_entity_id = None;
        }
    }

    /// Loads the map named by `new_state` if it differs from the current one.
    /// Returns whether a load happened.
    pub async fn handle_map_update(&mut self, new_state: &PlayerState) -> Result<bool, ClientError> {
        let location = &new_state.location_info.location_id;
        let unchanged = self
            .state
            .as_ref()
            .is_some_and(|old| old.location_info.location_id == *location);
        if unchanged && self.map.is_some() {
            return Ok(false);
        }

        self.set_phase(SessionPhase::MapLoading);
        let asset = self.cache.get_map(location).await?;
        info!("Loaded map {} via cache.", asset.id);
        info!("Need {} tile assets...", asset.tile_assets.len());

        let tiles = self.cache.get_multiple_tiles(&asset.tile_assets).await?;
        info!("Tile assets loaded.");

        self.map = Some(Map::new(asset, tiles));
        Ok(true)
    }

    /// Opens a session for the current location and replaces every local
    /// entity with the server's snapshot.
    pub async fn sync_map_state(&mut self) -> Result<(), ClientError> {
        self.set_phase(SessionPhase::MapSyncing);
        let (map_id, token) = match &self.state {
            Some(state) => (
                state.location_info.location_id.clone(),
                state.player_info.token.clone(),
            ),
            None => return Err(ClientError::MapNotLoaded),
        };

        self.events = None;
        self.deferred.clear();
        let mut events = self.source.open_map_session(&map_id, &token).await?;
        let initial = self.await_initial_state(&mut events).await?;
        self.events = Some(events);
        info!("Initial map state received!");

        self.load_snapshot(initial).await;

        while let Some(event) = self.deferred.pop_front() {
            self.apply_incremental(event).await;
        }
        Ok(())
    }

    async fn await_initial_state(&mut self, events: &mut SessionEvents) -> Result<InitialMapState, ClientError> {
        let limit = self.sync_timeout;
        let wait = async {
            loop {
                match events.recv().await {
                    Some(SessionEvent::MapState(initial)) => return Ok(initial),
                    Some(SessionEvent::PlayerEntityId(id)) => self.set_player_entity_id(id),
                    Some(SessionEvent::Closed { reason: Some(reason) }) => {
                        return Err(ClientError::Rejected(reason))
                    }
                    Some(SessionEvent::Lost { reason }) => return Err(ClientError::SessionLost(reason)),
                    Some(SessionEvent::Closed { reason: None }) | None => {
                        return Err(ClientError::SessionClosed)
                    }
                    Some(other) => self.deferred.push_back(other),
                }
            }
        };

        timeout(limit, wait).await.map_err(|_| ClientError::Timeout {
            what: "initial map state".to_string(),
            after: limit,
        })?
    }

    async fn load_snapshot(&mut self, initial: InitialMapState) {
        self.map_state = MapState::default();
        self.lookup.clear();

        let player_id = self.player_entity_id();
        let mut remaining = initial.entities.len();
        for mut stub in initial.entities {
            if Some(stub.entity_id) == player_id {
                stub.entity_type = PLAYER_CONTROLLED_ENTITY_TYPE.to_string();
            }
            let entity_id = stub.entity_id;
            if let Err(e) = self.initialize_entity(stub).await {
                warn!("Skipping entity {}: {}", entity_id, e);
            }

            remaining -= 1;
            if remaining > 0 {
                debug!("{} entities remain requiring initialization.", remaining);
            }
        }
    }

    fn set_player_entity_id(&mut self, entity_id: EntityId) {
        match self.state.as_mut() {
            Some(state) => {
                info!("Player entity is {}", entity_id);
                state.player_entity_id = Some(entity_id);
            }
            None => warn!("Player entity id {} arrived without a player state", entity_id),
        }
    }

    /// Builds an entity from its stub and inserts it. An id that is already
    /// present is replaced in place.
    pub async fn initialize_entity(&mut self, stub: EntityStub) -> Result<EntityId, ClientError> {
        let asset = self.cache.get_entity(&stub.entity_type).await?;
        let sprite = match &asset.sprite {
            Some(uri) => Some(self.cache.load_image(uri).await?),
            None => None,
        };
        let behavior = self.registry.build(&BehaviorContext { asset, sprite })?;

        let mut entity = Entity::new(stub.entity_id, stub.entity_type, behavior);
        entity.apply_state(&stub.entity_state);
        entity.initialize();

        let entity_id = entity.id();
        match self.lookup.get(&entity_id) {
            Some(&index) => {
                warn!("Entity {} initialized twice, replacing it", entity_id);
                self.map_state.entities[index] = entity;
            }
            None => {
                self.lookup.insert(entity_id, self.map_state.entities.len());
                self.map_state.entities.push(entity);
            }
        }
        Ok(entity_id)
    }

    /// Checks a rectangle against the installed map.
    pub fn detect_collision(&self, x: f32, y: f32, width: f32, height: f32) -> Result<Option<Collision>, ClientError> {
        let map = self.map.as_ref().ok_or(ClientError::MapNotLoaded)?;
        Ok(detect_collision(x, y, width, height, map))
    }

    /// Merges `delta` into the entity's state. Unknown ids are ignored.
    pub fn locate_and_update(&mut self, entity_id: EntityId, delta: &EntityState) -> bool {
        match self.lookup.get(&entity_id) {
            Some(&index) => {
                self.map_state.entities[index].apply_state(delta);
                true
            }
            None => {
                debug!("Dropping update for unknown entity {}", entity_id);
                false
            }
        }
    }

    /// Removes the entity. Unknown ids are ignored.
    pub fn destroy_entity(&mut self, entity_id: EntityId) -> bool {
        let Some(index) = self.lookup.remove(&entity_id) else {
            return false;
        };
        self.map_state.entities.remove(index);
        for slot in self.lookup.values_mut() {
            if *slot > index {
                *slot -= 1;
            }
        }
        true
    }

    /// Applies one session push.
    pub async fn handle_event(&mut self, event: SessionEvent) -> Result<(), ClientError> {
        match event {
            SessionEvent::PlayerState(state) => {
                info!("Player state push received");
                self.handle_player_state_change(state).await?;
            }
            SessionEvent::Closed { reason } => {
                self.events = None;
                return Err(match reason {
                    Some(reason) => ClientError::Rejected(reason),
                    None => ClientError::SessionClosed,
                });
            }
            SessionEvent::Lost { reason } => {
                self.events = None;
                return Err(ClientError::SessionLost(reason));
            }
            other => self.apply_incremental(other).await,
        }
        Ok(())
    }

    async fn apply_incremental(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::EntityUpdated(update) => {
                self.locate_and_update(update.entity_id, &update.state);
            }
            SessionEvent::EntityCreated(stub) => {
                info!("Server created entity {}", stub.entity_id);
                let entity_id = stub.entity_id;
                if let Err(e) = self.initialize_entity(stub).await {
                    warn!("Could not create entity {}: {}", entity_id, e);
                }
            }
            SessionEvent::EntityDestroyed(entity_id) => {
                info!("Server destroyed entity {}", entity_id);
                self.destroy_entity(entity_id);
            }
            SessionEvent::PlayerEntityId(entity_id) => self.set_player_entity_id(entity_id),
            SessionEvent::PlayerState(state) => self.queued_state = Some(state),
            SessionEvent::MapState(_) => warn!("Ignoring unexpected map state snapshot"),
            SessionEvent::Closed { .. } | SessionEvent::Lost { .. } => {}
        }
    }

    /// Runs every tickable entity once. Returns the ids that asked for a push.
    pub fn process_entities(&mut self, keys: &KeyStates, delta: Duration) -> Vec<EntityId> {
        let Some(map) = self.map.as_ref() else {
            return Vec::new();
        };

        let mut pushes = Vec::new();
        for entity in &mut self.map_state.entities {
            let mut ctx = TickContext::new(keys, map);
            if entity.process(&mut ctx, delta) && ctx.push_requested() {
                pushes.push(entity.id());
            }
        }
        pushes
    }

    pub fn push_entity_states(&self, entity_ids: &[EntityId]) {
        for entity_id in entity_ids {
            let Some(update) = self.entity(*entity_id).and_then(Entity::client_state) else {
                continue;
            };
            if let Err(e) = self.source.push_entity_state(update) {
                warn!("Failed to push state for entity {}: {}", entity_id, e);
            }
        }
    }

    fn render<G: FrameSink>(&self, graphics: &mut G, renderer: &mut WorldRenderer, delta: Duration) {
        let Some(map) = self.map.as_ref() else {
            return;
        };
        renderer.draw_world(graphics, map, &self.map_state.entities, self.player_entity_id());
        renderer.draw_fps(graphics, FrameLimiter::frames_per_second(delta));
        graphics.present();
    }

    /// Applies session pushes as they arrive and, at most once per frame
    /// interval, ticks and draws. Returns when the frame sink closes; fails
    /// when the session does.
    pub async fn run_world<G, I>(
        &mut self,
        graphics: &mut G,
        input: &I,
        renderer: &mut WorldRenderer,
    ) -> Result<(), ClientError>
    where
        G: FrameSink,
        I: InputSource,
    {
        info!("Entered game loop.");
        let mut limiter = FrameLimiter::new(self.frame_interval, Instant::now());

        while graphics.is_open() {
            loop {
                let received = match self.events.as_mut() {
                    Some(events) => events.try_recv(),
                    None => Err(TryRecvError::Disconnected),
                };
                match received {
                    Ok(event) => self.handle_event(event).await?,
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        error!("Map session lost");
                        return Err(ClientError::SessionClosed);
                    }
                }
            }

            match limiter.try_begin(Instant::now()) {
                Some(delta) => {
                    let keys = input.poll_keys();
                    let pushes = self.process_entities(&keys, delta);
                    self.push_entity_states(&pushes);
                    self.render(graphics, renderer, delta);
                }
                None => sleep(Duration::from_millis(1)).await,
            }
        }

        info!("Frame sink closed, leaving game loop.");
        self.source.close_map_session();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::mock::{MockDataSource, StubDecoder};
    use crate::graphics::{CanvasSize, DrawCommand, FrameRecorder};
    use crate::input::Key;
    use assert_approx_eq::assert_approx_eq;
    use shared::{
        Asset, AssetType, Dimensions, EntityAsset, EntityStateUpdate, MapAsset, StateValue,
        TileAsset, TilePoint,
    };

    fn map_asset(id: &str, tiles: &[&str]) -> Asset {
        Asset::Map(MapAsset {
            id: id.to_string(),
            name: id.to_string(),
            dimensions: Dimensions {
                width: 10,
                height: 10,
            },
            map_data: vec![vec![0; 10]; 10],
            tile_assets: tiles.iter().map(|t| t.to_string()).collect(),
            spawn: TilePoint::default(),
            exits: Vec::new(),
            props: Vec::new(),
        })
    }

    fn tile_asset(id: &str) -> Asset {
        Asset::Tile(TileAsset {
            id: id.to_string(),
            image_uri: format!("/images/{}.png", id),
            solid: false,
        })
    }

    fn entity_asset(id: &str, behavior: &str) -> Asset {
        Asset::Entity(EntityAsset {
            id: id.to_string(),
            behavior: behavior.to_string(),
            sprite: None,
            width: 10.0,
            height: 10.0,
            speed: 100.0,
        })
    }

    fn stub(entity_id: EntityId, entity_type: &str, x: f64) -> EntityStub {
        let mut entity_state = EntityState::new();
        entity_state.insert("X".to_string(), StateValue::Float(x));
        entity_state.insert("Y".to_string(), StateValue::Float(10.0));
        entity_state.insert("Name".to_string(), StateValue::from(format!("e{}", entity_id)));
        EntityStub {
            entity_id,
            entity_type: entity_type.to_string(),
            entity_state,
        }
    }

    fn snapshot(entities: Vec<EntityStub>) -> SessionEvent {
        SessionEvent::MapState(InitialMapState { entities })
    }

    fn base_source() -> MockDataSource {
        MockDataSource::new()
            .with_asset(map_asset("town", &["grass", "cobble"]))
            .with_asset(map_asset("forest", &["moss"]))
            .with_asset(tile_asset("grass"))
            .with_asset(tile_asset("cobble"))
            .with_asset(tile_asset("moss"))
            .with_asset(entity_asset("player", "player"))
            .with_asset(entity_asset(PLAYER_CONTROLLED_ENTITY_TYPE, "player_controlled"))
            .with_asset(entity_asset("rock", "prop"))
            .with_player("alice", PlayerState::new("alice", "town", TilePoint::default()))
    }

    fn world(source: MockDataSource) -> (Arc<MockDataSource>, WorldManager<MockDataSource>) {
        let source = Arc::new(source);
        let cache = AssetCache::with_decoder(Arc::clone(&source), Arc::new(StubDecoder));
        let world = WorldManager::new(
            Arc::clone(&source),
            cache,
            BehaviorRegistry::with_builtins(),
            Duration::from_millis(200),
            Duration::from_millis(1),
        );
        (source, world)
    }

    fn town_script() -> Vec<SessionEvent> {
        vec![
            SessionEvent::PlayerEntityId(1),
            snapshot(vec![stub(1, "player", 10.0), stub(2, "player", 50.0)]),
        ]
    }

    fn assert_lookup_consistent(world: &WorldManager<MockDataSource>) {
        assert_eq!(world.lookup.len(), world.map_state.entities.len());
        for (index, entity) in world.map_state.entities.iter().enumerate() {
            assert_eq!(world.lookup.get(&entity.id()), Some(&index));
        }
    }

    #[test]
    fn test_frame_limiter_skips_early_ticks() {
        let start = Instant::now();
        let mut limiter = FrameLimiter::new(Duration::from_millis(16), start);

        assert_eq!(limiter.try_begin(start + Duration::from_millis(10)), None);
        assert_eq!(
            limiter.try_begin(start + Duration::from_millis(20)),
            Some(Duration::from_millis(20))
        );
        assert_eq!(limiter.try_begin(start + Duration::from_millis(30)), None);
    }

    #[test]
    fn test_frames_per_second_floors() {
        assert_eq!(FrameLimiter::frames_per_second(Duration::from_millis(16)), 62);
        assert_eq!(FrameLimiter::frames_per_second(Duration::from_millis(20)), 50);
        assert_eq!(FrameLimiter::frames_per_second(Duration::ZERO), 0);
    }

    #[tokio::test]
    async fn test_initialize_reaches_active_with_controlled_player() {
        let (source, mut world) = world(base_source().with_session_script("town", town_script()));
        assert_eq!(world.phase(), SessionPhase::Unauthenticated);

        world.initialize("alice").await.unwrap();

        assert_eq!(world.phase(), SessionPhase::Active);
        assert_eq!(world.current_map().unwrap().id(), "town");
        assert_eq!(world.player_entity_id(), Some(1));
        assert_eq!(
            world.entity(1).unwrap().entity_type(),
            PLAYER_CONTROLLED_ENTITY_TYPE
        );
        assert_eq!(world.entity(2).unwrap().entity_type(), "player");
        assert_eq!(source.opened_sessions(), vec![("town".to_string(), "alice".to_string())]);
        assert_lookup_consistent(&world);
    }

    #[tokio::test]
    async fn test_map_tiles_follow_asset_order() {
        let source = base_source()
            .with_delay("grass", Duration::from_millis(20))
            .with_session_script("town", town_script());
        let (_source, mut world) = world(source);

        world.initialize("alice").await.unwrap();

        let ids: Vec<&str> = world
            .current_map()
            .unwrap()
            .tiles()
            .iter()
            .map(|tile| tile.asset.id.as_str())
            .collect();
        assert_eq!(ids, vec!["grass", "cobble"]);
    }

    #[tokio::test]
    async fn test_unknown_login_fails() {
        let (_source, mut world) = world(base_source());
        let result = world.initialize("mallory").await;
        assert!(matches!(result, Err(ClientError::NotFound { .. })));
        assert_eq!(world.phase(), SessionPhase::AwaitingPlayerState);
    }

    #[tokio::test]
    async fn test_missing_snapshot_times_out() {
        let script = vec![SessionEvent::PlayerEntityId(1)];
        let (_source, mut world) = world(base_source().with_session_script("town", script));

        let result = world.initialize("alice").await;
        assert!(matches!(result, Err(ClientError::Timeout { .. })));
        assert_eq!(world.phase(), SessionPhase::MapSyncing);
    }

    #[tokio::test]
    async fn test_pushes_before_snapshot_are_replayed_after_it() {
        let mut moved = EntityState::new();
        moved.insert("X".to_string(), StateValue::Float(99.0));
        let script = vec![
            SessionEvent::PlayerEntityId(1),
            SessionEvent::EntityUpdated(EntityStateUpdate {
                entity_id: 2,
                state: moved,
            }),
            SessionEvent::EntityCreated(stub(3, "rock", 70.0)),
            snapshot(vec![stub(1, "player", 10.0), stub(2, "player", 50.0)]),
        ];
        let (_source, mut world) = world(base_source().with_session_script("town", script));

        world.initialize("alice").await.unwrap();

        assert_eq!(world.entity(2).unwrap().position(), (99.0, 10.0));
        assert_eq!(world.entity(3).unwrap().entity_type(), "rock");
        assert_eq!(world.map_state().entities.len(), 3);
        assert_lookup_consistent(&world);
    }

    #[tokio::test]
    async fn test_entity_with_unknown_type_is_skipped() {
        let script = vec![
            SessionEvent::PlayerEntityId(1),
            snapshot(vec![stub(1, "player", 10.0), stub(2, "dragon", 0.0)]),
        ];
        let (_source, mut world) = world(base_source().with_session_script("town", script));

        world.initialize("alice").await.unwrap();
        assert!(world.entity(2).is_none());
        assert_eq!(world.map_state().entities.len(), 1);
    }

    #[tokio::test]
    async fn test_destroy_keeps_lookup_consistent() {
        let script = vec![
            SessionEvent::PlayerEntityId(1),
            snapshot(vec![
                stub(1, "player", 10.0),
                stub(2, "player", 20.0),
                stub(3, "rock", 30.0),
                stub(4, "rock", 40.0),
            ]),
        ];
        let (_source, mut world) = world(base_source().with_session_script("town", script));
        world.initialize("alice").await.unwrap();

        assert!(world.destroy_entity(2));
        assert!(!world.destroy_entity(2));
        assert!(!world.destroy_entity(77));

        assert!(world.entity(2).is_none());
        assert_eq!(world.entity(4).unwrap().position().0, 40.0);
        assert_lookup_consistent(&world);
    }

    #[tokio::test]
    async fn test_update_for_unknown_entity_is_dropped() {
        let (_source, mut world) = world(base_source().with_session_script("town", town_script()));
        world.initialize("alice").await.unwrap();

        let mut delta = EntityState::new();
        delta.insert("X".to_string(), StateValue::Float(5.0));
        assert!(!world.locate_and_update(42, &delta));
        assert!(world.locate_and_update(2, &delta));
        assert_eq!(world.entity(2).unwrap().position(), (5.0, 10.0));
        assert_eq!(world.map_state().entities.len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_initialize_replaces_entity() {
        let (_source, mut world) = world(base_source().with_session_script("town", town_script()));
        world.initialize("alice").await.unwrap();

        world.initialize_entity(stub(2, "rock", 80.0)).await.unwrap();

        assert_eq!(world.map_state().entities.len(), 2);
        assert_eq!(world.entity(2).unwrap().entity_type(), "rock");
        assert_eq!(world.entity(2).unwrap().position().0, 80.0);
        assert_lookup_consistent(&world);
    }

    #[tokio::test]
    async fn test_player_state_push_moves_to_new_map() {
        let forest_script = vec![
            SessionEvent::PlayerEntityId(9),
            snapshot(vec![stub(9, "player", 5.0)]),
        ];
        let source = base_source()
            .with_session_script("town", town_script())
            .with_session_script("forest", forest_script);
        let (source, mut world) = world(source);
        world.initialize("alice").await.unwrap();

        let moved = PlayerState::new("alice", "forest", TilePoint { x: 1, y: 1 });
        world
            .handle_event(SessionEvent::PlayerState(moved))
            .await
            .unwrap();

        assert_eq!(world.phase(), SessionPhase::Active);
        assert_eq!(world.current_map().unwrap().id(), "forest");
        assert_eq!(world.player_entity_id(), Some(9));
        assert_eq!(world.map_state().entities.len(), 1);
        assert_eq!(
            world.entity(9).unwrap().entity_type(),
            PLAYER_CONTROLLED_ENTITY_TYPE
        );
        assert!(world.entity(2).is_none());
        assert_eq!(source.opened_sessions().len(), 2);
        assert_eq!(source.close_count(), 1);
        assert_eq!(source.fetch_count(AssetType::Map, "forest"), 1);
    }

    #[tokio::test]
    async fn test_failed_map_change_drops_old_entities() {
        let forest_script = vec![SessionEvent::Closed {
            reason: Some("map full".to_string()),
        }];
        let source = base_source()
            .with_session_script("town", town_script())
            .with_session_script("forest", forest_script);
        let (source, mut world) = world(source);
        world.initialize("alice").await.unwrap();

        let moved = PlayerState::new("alice", "forest", TilePoint { x: 1, y: 1 });
        let result = world.handle_player_state_change(moved).await;

        assert!(matches!(result, Err(ClientError::Rejected(reason)) if reason == "map full"));
        assert_eq!(world.current_map().unwrap().id(), "forest");
        assert_eq!(world.player_state().unwrap().location_info.location_id, "forest");
        assert!(world.map_state().entities.is_empty());
        assert!(world.entity(1).is_none());
        assert_eq!(world.player_entity_id(), None);
        assert_lookup_consistent(&world);
        assert_eq!(source.close_count(), 2);
    }

    #[tokio::test]
    async fn test_lost_connection_is_not_a_rejection() {
        let (source, mut world) = world(base_source().with_session_script("town", town_script()));
        world.initialize("alice").await.unwrap();

        let result = world
            .handle_event(SessionEvent::Lost {
                reason: "connection reset".to_string(),
            })
            .await;
        assert!(matches!(result, Err(ClientError::SessionLost(_))));
        assert_eq!(source.opened_sessions().len(), 1);
    }

    #[tokio::test]
    async fn test_detect_collision_needs_a_map() {
        let (_source, mut world) = world(base_source().with_session_script("town", town_script()));
        assert!(matches!(
            world.detect_collision(5.0, 5.0, 10.0, 10.0),
            Err(ClientError::MapNotLoaded)
        ));

        world.initialize("alice").await.unwrap();
        assert_eq!(world.detect_collision(5.0, 5.0, 10.0, 10.0).unwrap(), None);
        assert_eq!(
            world.detect_collision(-1.0, 5.0, 10.0, 10.0).unwrap(),
            Some(Collision::Boundary)
        );
        assert_eq!(
            world.detect_collision(315.0, 5.0, 10.0, 10.0).unwrap(),
            Some(Collision::Boundary)
        );
    }

    #[tokio::test]
    async fn test_same_map_push_keeps_session_and_player() {
        let (source, mut world) = world(base_source().with_session_script("town", town_script()));
        world.initialize("alice").await.unwrap();

        let same = PlayerState::new("alice", "town", TilePoint { x: 3, y: 3 });
        let changed = world.handle_player_state_change(same).await.unwrap();

        assert!(!changed);
        assert_eq!(world.player_entity_id(), Some(1));
        assert_eq!(world.player_state().unwrap().location_info.tile.x, 3);
        assert_eq!(source.opened_sessions().len(), 1);
        assert_eq!(source.fetch_count(AssetType::Map, "town"), 1);
    }

    #[tokio::test]
    async fn test_process_entities_pushes_moved_player() {
        let (source, mut world) = world(base_source().with_session_script("town", town_script()));
        world.initialize("alice").await.unwrap();

        let keys = KeyStates::default().press(Key::Right);
        let pushes = world.process_entities(&keys, Duration::from_millis(100));
        assert_eq!(pushes, vec![1]);

        world.push_entity_states(&pushes);
        let pushed = source.pushed();
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].entity_id, 1);
        let x = pushed[0].state.get("X").and_then(StateValue::as_f64).unwrap();
        assert_approx_eq!(x, 20.0, 1e-4);
        assert!(pushed[0].state.get("Name").is_none());
        assert_eq!(world.entity(1).unwrap().state().get("Name"), Some(&StateValue::from("e1")));
    }

    #[tokio::test]
    async fn test_run_world_applies_pushes_and_stops_on_close() {
        let (source, mut world) = world(base_source().with_session_script("town", town_script()));
        world.initialize("alice").await.unwrap();

        let sender = source.session_sender();
        sender.send(SessionEvent::EntityDestroyed(2)).unwrap();
        sender.send(SessionEvent::Closed { reason: None }).unwrap();

        let (mut recorder, _frames) = FrameRecorder::new(CanvasSize {
            width: 320,
            height: 320,
        });
        let mut renderer = WorldRenderer::new();
        let result = world
            .run_world(&mut recorder, &KeyStates::default(), &mut renderer)
            .await;

        assert!(matches!(result, Err(ClientError::SessionClosed)));
        assert!(world.entity(2).is_none());
    }

    #[tokio::test]
    async fn test_run_world_draws_until_sink_closes() {
        let (_source, mut world) = world(base_source().with_session_script("town", town_script()));
        world.initialize("alice").await.unwrap();

        let (mut recorder, mut frames) = FrameRecorder::new(CanvasSize {
            width: 320,
            height: 320,
        });
        let watcher = tokio::spawn(async move {
            frames.changed().await.unwrap();
            let frame = frames.borrow().clone();
            drop(frames);
            frame
        });

        let mut renderer = WorldRenderer::new();
        world
            .run_world(&mut recorder, &KeyStates::default(), &mut renderer)
            .await
            .unwrap();

        let frame = watcher.await.unwrap();
        assert_eq!(frame.commands[0], DrawCommand::Clear);
        assert!(frame
            .commands
            .iter()
            .any(|command| matches!(command, DrawCommand::Text { text, .. } if text.ends_with("fps"))));
    }
}
