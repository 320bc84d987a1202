//! Held-keys table shared by every program the host runs.
//!
//! The host owns the only mutable handle and updates it from window events;
//! programs see it read-only through their frame context. Mouse buttons are
//! reported through the same table (`"mouse left"` etc.) so scripts need a
//! single lookup.

use std::collections::HashSet;

pub const MOUSE_LEFT: &str = "mouse left";
pub const MOUSE_RIGHT: &str = "mouse right";
pub const MOUSE_MIDDLE: &str = "mouse middle";

#[derive(Clone, Debug, Default)]
pub struct InputState {
    held: HashSet<String>,
    mouse: (f32, f32),
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_down(&mut self, key: impl Into<String>) {
        self.held.insert(key.into());
    }

    pub fn key_up(&mut self, key: &str) {
        self.held.remove(key);
    }

    pub fn is_key_pressed(&self, key: &str) -> bool {
        self.held.contains(key)
    }

    /// Drops every held key, e.g. when the window loses focus and key-up
    /// events would otherwise never arrive.
    pub fn clear(&mut self) {
        self.held.clear();
    }

    pub fn set_mouse_position(&mut self, x: f32, y: f32) {
        self.mouse = (x, y);
    }

    pub fn mouse_position(&self) -> (f32, f32) {
        self.mouse
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_up_removes_entry() {
        let mut input = InputState::new();
        input.key_down("space");
        assert!(input.is_key_pressed("space"));

        input.key_up("space");
        assert!(!input.is_key_pressed("space"));
        assert!(input.held.is_empty());
    }

    #[test]
    fn unknown_keys_read_as_released() {
        let input = InputState::new();
        assert!(!input.is_key_pressed("q"));
    }

    #[test]
    fn clear_releases_everything_but_keeps_mouse() {
        let mut input = InputState::new();
        input.key_down("a");
        input.key_down(MOUSE_LEFT);
        input.set_mouse_position(12.0, 34.0);

        input.clear();

        assert!(!input.is_key_pressed("a"));
        assert!(!input.is_key_pressed(MOUSE_LEFT));
        assert_eq!(input.mouse_position(), (12.0, 34.0));
    }
}
