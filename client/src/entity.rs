//! Entities and their optional capabilities.
//!
//! An [`Entity`] is an id, a type name, a string-keyed state map and a
//! [`Behavior`]. The behavior opts into capabilities by returning `Some`
//! from the matching accessor; the world only calls what is offered:
//!
//! - [`Initializable`]: runs once, right after the server state is applied
//! - [`Tickable`]: simulated every accepted frame
//! - [`Renderable`]: drawn every accepted frame
//! - [`StateExportable`]: produces the state pushed back to the server
//!
//! Behaviors are built from declarative entity assets by name through a
//! [`BehaviorRegistry`].

use crate::error::ClientError;
use crate::graphics::Graphics;
use crate::images::ImageHandle;
use crate::input::KeyStates;
use crate::map::Map;
use shared::{
    detect_collision, state_f32, state_keys, Collision, EntityAsset, EntityId, EntityState,
    EntityStateUpdate,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Canvas-space position an entity's world position maps to this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenPosition {
    pub x: f32,
    pub y: f32,
}

/// What a tick can see and ask for.
pub struct TickContext<'a> {
    keys: &'a KeyStates,
    map: &'a Map,
    push_requested: bool,
}

impl<'a> TickContext<'a> {
    pub fn new(keys: &'a KeyStates, map: &'a Map) -> Self {
        Self {
            keys,
            map,
            push_requested: false,
        }
    }

    pub fn keys(&self) -> &KeyStates {
        self.keys
    }

    pub fn map(&self) -> &Map {
        self.map
    }

    pub fn detect_collision(&self, x: f32, y: f32, width: f32, height: f32) -> Option<Collision> {
        detect_collision(x, y, width, height, self.map)
    }

    /// Asks the world to push this entity's exported state after the tick.
    pub fn request_state_push(&mut self) {
        self.push_requested = true;
    }

    pub fn push_requested(&self) -> bool {
        self.push_requested
    }
}

pub trait Initializable {
    fn initialize(&mut self, state: &mut EntityState);
}

pub trait Tickable {
    fn process(&mut self, state: &mut EntityState, ctx: &mut TickContext<'_>, delta: Duration);
}

pub trait Renderable {
    fn draw(&self, state: &EntityState, graphics: &mut dyn Graphics, screen: ScreenPosition);
}

pub trait StateExportable {
    fn client_state(&self, state: &EntityState) -> EntityState;
}

pub trait Behavior {
    fn as_initializable(&mut self) -> Option<&mut dyn Initializable> {
        None
    }

    fn as_tickable(&mut self) -> Option<&mut dyn Tickable> {
        None
    }

    fn as_renderable(&self) -> Option<&dyn Renderable> {
        None
    }

    fn as_state_exportable(&self) -> Option<&dyn StateExportable> {
        None
    }
}

pub struct Entity {
    id: EntityId,
    entity_type: String,
    state: EntityState,
    behavior: Box<dyn Behavior>,
}

impl Entity {
    pub fn new(id: EntityId, entity_type: impl Into<String>, behavior: Box<dyn Behavior>) -> Self {
        Self {
            id,
            entity_type: entity_type.into(),
            state: EntityState::new(),
            behavior,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn state(&self) -> &EntityState {
        &self.state
    }

    /// Merges `delta` into the state, key by key.
    pub fn apply_state(&mut self, delta: &EntityState) {
        for (key, value) in delta {
            self.state.insert(key.clone(), value.clone());
        }
    }

    pub fn position(&self) -> (f32, f32) {
        (
            state_f32(&self.state, state_keys::X, 0.0),
            state_f32(&self.state, state_keys::Y, 0.0),
        )
    }

    /// Returns false when the behavior has no initialization step.
    pub fn initialize(&mut self) -> bool {
        match self.behavior.as_initializable() {
            Some(init) => {
                init.initialize(&mut self.state);
                true
            }
            None => false,
        }
    }

    pub fn process(&mut self, ctx: &mut TickContext<'_>, delta: Duration) -> bool {
        match self.behavior.as_tickable() {
            Some(tickable) => {
                tickable.process(&mut self.state, ctx, delta);
                true
            }
            None => false,
        }
    }

    pub fn draw(&self, graphics: &mut dyn Graphics, screen: ScreenPosition) -> bool {
        match self.behavior.as_renderable() {
            Some(renderable) => {
                renderable.draw(&self.state, graphics, screen);
                true
            }
            None => false,
        }
    }

    pub fn client_state(&self) -> Option<EntityStateUpdate> {
        self.behavior
            .as_state_exportable()
            .map(|exportable| EntityStateUpdate {
                entity_id: self.id,
                state: exportable.client_state(&self.state),
            })
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("entity_type", &self.entity_type)
            .field("state", &self.state)
            .finish()
    }
}

/// Inputs a behavior factory builds from.
#[derive(Debug, Clone)]
pub struct BehaviorContext {
    pub asset: Arc<EntityAsset>,
    pub sprite: Option<ImageHandle>,
}

pub type BehaviorFactory = fn(&BehaviorContext) -> Box<dyn Behavior>;

#[derive(Default)]
pub struct BehaviorRegistry {
    factories: HashMap<String, BehaviorFactory>,
}

impl BehaviorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every behavior in `crate::behaviors`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::behaviors::register_builtins(&mut registry);
        registry
    }

    /// Registers `factory` under `name`, replacing any previous one.
    pub fn register(&mut self, name: &str, factory: BehaviorFactory) {
        self.factories.insert(name.to_string(), factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn build(&self, ctx: &BehaviorContext) -> Result<Box<dyn Behavior>, ClientError> {
        let factory = self
            .factories
            .get(&ctx.asset.behavior)
            .ok_or_else(|| ClientError::UnknownBehavior(ctx.asset.behavior.clone()))?;
        Ok(factory(ctx))
    }
}
