//! Keyboard sampling on the window thread, published to the world thread

use macroquad::prelude::{is_key_down, KeyCode};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Up,
    Down,
    Left,
    Right,
}

/// Snapshot of the movement keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyStates {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

impl KeyStates {
    pub fn is_down(&self, key: Key) -> bool {
        match key {
            Key::Up => self.up,
            Key::Down => self.down,
            Key::Left => self.left,
            Key::Right => self.right,
        }
    }

    pub fn press(mut self, key: Key) -> Self {
        match key {
            Key::Up => self.up = true,
            Key::Down => self.down = true,
            Key::Left => self.left = true,
            Key::Right => self.right = true,
        }
        self
    }

    /// Movement direction as `(-1|0|1, -1|0|1)`; opposite keys cancel.
    pub fn direction(&self) -> (f32, f32) {
        let dx = (self.right as i8 - self.left as i8) as f32;
        let dy = (self.down as i8 - self.up as i8) as f32;
        (dx, dy)
    }

    pub fn any(&self) -> bool {
        self.up || self.down || self.left || self.right
    }
}

/// Where entities read the current key states from.
pub trait InputSource {
    fn poll_keys(&self) -> KeyStates;
}

/// World-thread view of the keys sampled by an [`InputManager`].
#[derive(Debug, Clone)]
pub struct SharedInput {
    keys: watch::Receiver<KeyStates>,
}

impl InputSource for SharedInput {
    fn poll_keys(&self) -> KeyStates {
        *self.keys.borrow()
    }
}

/// A fixed key snapshot, for headless runs.
impl InputSource for KeyStates {
    fn poll_keys(&self) -> KeyStates {
        *self
    }
}

/// Samples the keyboard each window frame and publishes changes.
pub struct InputManager {
    keys: watch::Sender<KeyStates>,
    current: KeyStates,
}

impl InputManager {
    /// Samples WASD and the arrow keys. Must run on the window thread.
    pub fn update(&mut self) {
        let sampled = KeyStates {
            up: is_key_down(KeyCode::W) || is_key_down(KeyCode::Up),
            down: is_key_down(KeyCode::S) || is_key_down(KeyCode::Down),
            left: is_key_down(KeyCode::A) || is_key_down(KeyCode::Left),
            right: is_key_down(KeyCode::D) || is_key_down(KeyCode::Right),
        };
        self.publish(sampled);
    }

    /// Returns true when the published state changed.
    pub fn publish(&mut self, keys: KeyStates) -> bool {
        if keys == self.current {
            return false;
        }
        self.current = keys;
        self.keys.send_replace(keys);
        true
    }

    pub fn current(&self) -> KeyStates {
        self.current
    }
}

/// Creates a connected sampler/reader pair.
pub fn channel() -> (InputManager, SharedInput) {
    let (tx, rx) = watch::channel(KeyStates::default());
    (
        InputManager {
            keys: tx,
            current: KeyStates::default(),
        },
        SharedInput { keys: rx },
    )
}
