//! Built-in entity behaviors, selected by an entity asset's `Behavior` name:
//!
//! - `player`: another player's avatar, drawn with a name label
//! - `player_controlled`: the local avatar, moved by the keyboard
//! - `wanderer`: a server-driven NPC, drawn with smoothed movement
//! - `prop`: a static sprite

use crate::entity::{
    Behavior, BehaviorContext, BehaviorRegistry, Initializable, Renderable, ScreenPosition,
    StateExportable, TickContext, Tickable,
};
use crate::graphics::{Graphics, ImagePlacement, TextStyle};
use crate::images::ImageHandle;
use macroquad::color::{BLACK, WHITE};
use macroquad::math::Rect;
use shared::{state_f32, state_keys, EntityState, StateValue};
use std::time::Duration;

/// Pixels per second when the asset does not set a speed.
pub const DEFAULT_SPEED: f32 = 120.0;

const NAME_FONT_SIZE: f32 = 14.0;
const WANDERER_SMOOTHING: f32 = 10.0;

pub fn register_builtins(registry: &mut BehaviorRegistry) {
    registry.register("player", |ctx| Box::new(Avatar::new(ctx)));
    registry.register("player_controlled", |ctx| Box::new(PlayerControlled::new(ctx)));
    registry.register("wanderer", |ctx| Box::new(Wanderer::new(ctx)));
    registry.register("prop", |ctx| Box::new(Prop::new(ctx)));
}

/// Avatar sprite sheets hold one frame per facing, left to right in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facing {
    Down,
    Left,
    Right,
    Up,
}

impl Facing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Facing::Down => "Down",
            Facing::Left => "Left",
            Facing::Right => "Right",
            Facing::Up => "Up",
        }
    }

    pub fn from_state(state: &EntityState) -> Self {
        match state.get(state_keys::FACING).and_then(StateValue::as_str) {
            Some("Left") => Facing::Left,
            Some("Right") => Facing::Right,
            Some("Up") => Facing::Up,
            _ => Facing::Down,
        }
    }

    /// Horizontal movement wins on diagonals.
    pub fn from_direction(dx: f32, dy: f32) -> Self {
        if dx < 0.0 {
            Facing::Left
        } else if dx > 0.0 {
            Facing::Right
        } else if dy < 0.0 {
            Facing::Up
        } else {
            Facing::Down
        }
    }

    fn frame(&self) -> usize {
        *self as usize
    }
}

/// Sprite and footprint shared by every avatar-like behavior.
#[derive(Debug, Clone)]
pub struct Avatar {
    sprite: Option<ImageHandle>,
    width: f32,
    height: f32,
}

impl Avatar {
    pub fn new(ctx: &BehaviorContext) -> Self {
        Self {
            sprite: ctx.sprite.clone(),
            width: ctx.asset.width,
            height: ctx.asset.height,
        }
    }

    fn draw_at(&self, state: &EntityState, graphics: &mut dyn Graphics, screen: ScreenPosition) {
        if let Some(sprite) = &self.sprite {
            let frame_width = sprite.width() as f32 / 4.0;
            let source = Rect::new(
                Facing::from_state(state).frame() as f32 * frame_width,
                0.0,
                frame_width,
                sprite.height() as f32,
            );
            graphics.draw_image(
                sprite,
                screen.x,
                screen.y,
                ImagePlacement::Clipped {
                    source,
                    width: self.width,
                    height: self.height,
                },
            );
        }

        if let Some(name) = state.get(state_keys::NAME).and_then(StateValue::as_str) {
            let style = TextStyle::new(NAME_FONT_SIZE, WHITE).with_stroke(BLACK, 2.0);
            let metrics = graphics.measure_text(name, style.font_size);
            graphics.draw_text(
                name,
                screen.x + (self.width - metrics.width) / 2.0,
                screen.y - 4.0,
                &style,
            );
        }
    }
}

impl Behavior for Avatar {
    fn as_renderable(&self) -> Option<&dyn Renderable> {
        Some(self)
    }
}

impl Renderable for Avatar {
    fn draw(&self, state: &EntityState, graphics: &mut dyn Graphics, screen: ScreenPosition) {
        self.draw_at(state, graphics, screen);
    }
}

/// The local player. Moves with the keys, slides along walls one axis at a
/// time, and asks for a push whenever position or facing changed.
#[derive(Debug, Clone)]
pub struct PlayerControlled {
    avatar: Avatar,
    speed: f32,
    facing: Facing,
}

impl PlayerControlled {
    pub fn new(ctx: &BehaviorContext) -> Self {
        let speed = if ctx.asset.speed > 0.0 {
            ctx.asset.speed
        } else {
            DEFAULT_SPEED
        };
        Self {
            avatar: Avatar::new(ctx),
            speed,
            facing: Facing::Down,
        }
    }
}

impl Behavior for PlayerControlled {
    fn as_initializable(&mut self) -> Option<&mut dyn Initializable> {
        Some(self)
    }

    fn as_tickable(&mut self) -> Option<&mut dyn Tickable> {
        Some(self)
    }

    fn as_renderable(&self) -> Option<&dyn Renderable> {
        Some(self)
    }

    fn as_state_exportable(&self) -> Option<&dyn StateExportable> {
        Some(self)
    }
}

impl Initializable for PlayerControlled {
    fn initialize(&mut self, state: &mut EntityState) {
        self.facing = Facing::from_state(state);
        state.insert(
            state_keys::FACING.to_string(),
            StateValue::from(self.facing.as_str()),
        );
    }
}

impl Tickable for PlayerControlled {
    fn process(&mut self, state: &mut EntityState, ctx: &mut TickContext<'_>, delta: Duration) {
        let (dx, dy) = ctx.keys().direction();
        if dx == 0.0 && dy == 0.0 {
            return;
        }

        let step = self.speed * delta.as_secs_f32();
        let mut x = state_f32(state, state_keys::X, 0.0);
        let mut y = state_f32(state, state_keys::Y, 0.0);
        let (width, height) = (self.avatar.width, self.avatar.height);
        let mut moved = false;

        if dx != 0.0 {
            let next_x = x + dx * step;
            if ctx.detect_collision(next_x, y, width, height).is_none() {
                x = next_x;
                moved = true;
            }
        }
        if dy != 0.0 {
            let next_y = y + dy * step;
            if ctx.detect_collision(x, next_y, width, height).is_none() {
                y = next_y;
                moved = true;
            }
        }

        let facing = Facing::from_direction(dx, dy);
        let turned = facing != self.facing;

        if moved {
            state.insert(state_keys::X.to_string(), StateValue::from(x as f64));
            state.insert(state_keys::Y.to_string(), StateValue::from(y as f64));
        }
        if turned {
            self.facing = facing;
            state.insert(
                state_keys::FACING.to_string(),
                StateValue::from(facing.as_str()),
            );
        }
        if moved || turned {
            ctx.request_state_push();
        }
    }
}

impl Renderable for PlayerControlled {
    fn draw(&self, state: &EntityState, graphics: &mut dyn Graphics, screen: ScreenPosition) {
        self.avatar.draw_at(state, graphics, screen);
    }
}

impl StateExportable for PlayerControlled {
    fn client_state(&self, state: &EntityState) -> EntityState {
        [state_keys::X, state_keys::Y, state_keys::FACING]
            .into_iter()
            .filter_map(|key| state.get(key).map(|value| (key.to_string(), value.clone())))
            .collect()
    }
}

/// NPC moved by the server; eases its drawn position toward the last reported one.
#[derive(Debug, Clone)]
pub struct Wanderer {
    avatar: Avatar,
    target: (f32, f32),
    shown: Option<(f32, f32)>,
}

impl Wanderer {
    pub fn new(ctx: &BehaviorContext) -> Self {
        Self {
            avatar: Avatar::new(ctx),
            target: (0.0, 0.0),
            shown: None,
        }
    }

    /// Where the wanderer is drawn, in world pixels.
    pub fn shown_position(&self) -> Option<(f32, f32)> {
        self.shown
    }
}

impl Behavior for Wanderer {
    fn as_tickable(&mut self) -> Option<&mut dyn Tickable> {
        Some(self)
    }

    fn as_renderable(&self) -> Option<&dyn Renderable> {
        Some(self)
    }
}

impl Tickable for Wanderer {
    fn process(&mut self, state: &mut EntityState, _ctx: &mut TickContext<'_>, delta: Duration) {
        self.target = (
            state_f32(state, state_keys::X, 0.0),
            state_f32(state, state_keys::Y, 0.0),
        );
        let shown = self.shown.get_or_insert(self.target);
        let t = (delta.as_secs_f32() * WANDERER_SMOOTHING).min(1.0);
        shown.0 += (self.target.0 - shown.0) * t;
        shown.1 += (self.target.1 - shown.1) * t;
    }
}

impl Renderable for Wanderer {
    fn draw(&self, state: &EntityState, graphics: &mut dyn Graphics, screen: ScreenPosition) {
        let (offset_x, offset_y) = match self.shown {
            Some(shown) => (shown.0 - self.target.0, shown.1 - self.target.1),
            None => (0.0, 0.0),
        };
        let screen = ScreenPosition {
            x: screen.x + offset_x,
            y: screen.y + offset_y,
        };
        self.avatar.draw_at(state, graphics, screen);
    }
}

#[derive(Debug, Clone)]
pub struct Prop {
    sprite: Option<ImageHandle>,
    width: f32,
    height: f32,
}

impl Prop {
    pub fn new(ctx: &BehaviorContext) -> Self {
        Self {
            sprite: ctx.sprite.clone(),
            width: ctx.asset.width,
            height: ctx.asset.height,
        }
    }
}

impl Behavior for Prop {
    fn as_renderable(&self) -> Option<&dyn Renderable> {
        Some(self)
    }
}

impl Renderable for Prop {
    fn draw(&self, _state: &EntityState, graphics: &mut dyn Graphics, screen: ScreenPosition) {
        if let Some(sprite) = &self.sprite {
            graphics.draw_image(
                sprite,
                screen.x,
                screen.y,
                ImagePlacement::Scaled {
                    width: self.width,
                    height: self.height,
                },
            );
        }
    }
}
