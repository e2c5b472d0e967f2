//! Polled keyboard and pointer state.
//!
//! The app feeds window and device events in as they arrive; fixed update
//! ticks read the state back. Pointer motion accumulates until a tick takes
//! it with [`InputState::take_pointer_delta`], so no motion is lost or
//! counted twice when several ticks run between redraws.

use std::collections::HashSet;

use glam::{Vec2, Vec3};

pub use winit::keyboard::KeyCode;

/// Mouse button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Other,
}

impl From<winit::event::MouseButton> for MouseButton {
    fn from(button: winit::event::MouseButton) -> Self {
        match button {
            winit::event::MouseButton::Left => MouseButton::Left,
            winit::event::MouseButton::Right => MouseButton::Right,
            winit::event::MouseButton::Middle => MouseButton::Middle,
            _ => MouseButton::Other,
        }
    }
}

/// Tracks the current state of keyboard and mouse input.
#[derive(Debug, Default)]
pub struct InputState {
    pressed_keys: HashSet<KeyCode>,
    /// Keys pressed since the last [`begin_frame`](Self::begin_frame)
    just_pressed_keys: HashSet<KeyCode>,
    pressed_buttons: HashSet<MouseButton>,
    /// Raw pointer motion not yet taken by a fixed tick
    pointer_delta: Vec2,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears per-frame edge state.
    pub fn begin_frame(&mut self) {
        self.just_pressed_keys.clear();
    }

    pub fn on_key_pressed(&mut self, key: KeyCode) {
        if self.pressed_keys.insert(key) {
            self.just_pressed_keys.insert(key);
        }
    }

    pub fn on_key_released(&mut self, key: KeyCode) {
        self.pressed_keys.remove(&key);
    }

    pub fn on_mouse_pressed(&mut self, button: MouseButton) {
        self.pressed_buttons.insert(button);
    }

    pub fn on_mouse_released(&mut self, button: MouseButton) {
        self.pressed_buttons.remove(&button);
    }

    /// Accumulates relative pointer motion in pixels.
    pub fn on_pointer_motion(&mut self, dx: f32, dy: f32) {
        self.pointer_delta += Vec2::new(dx, dy);
    }

    /// Drops all held state, e.g. when the window loses focus.
    pub fn clear(&mut self) {
        self.pressed_keys.clear();
        self.just_pressed_keys.clear();
        self.pressed_buttons.clear();
        self.pointer_delta = Vec2::ZERO;
    }

    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    pub fn is_key_just_pressed(&self, key: KeyCode) -> bool {
        self.just_pressed_keys.contains(&key)
    }

    pub fn is_mouse_pressed(&self, button: MouseButton) -> bool {
        self.pressed_buttons.contains(&button)
    }

    /// Returns the accumulated pointer motion and resets it.
    pub fn take_pointer_delta(&mut self) -> Vec2 {
        std::mem::take(&mut self.pointer_delta)
    }

    /// Unit movement direction in camera terms, or zero.
    ///
    /// `x` is D/A, `y` is Space/Shift and `z` is W/S. When both keys of a
    /// pair are held, D, Space and W win.
    pub fn movement_intent(&self) -> Vec3 {
        let axis = |positive: KeyCode, negative: &[KeyCode]| {
            if self.is_key_pressed(positive) {
                1.0
            } else if negative.iter().any(|&k| self.is_key_pressed(k)) {
                -1.0
            } else {
                0.0
            }
        };
        let movement = Vec3::new(
            axis(KeyCode::KeyD, &[KeyCode::KeyA]),
            axis(KeyCode::Space, &[KeyCode::ShiftLeft, KeyCode::ShiftRight]),
            axis(KeyCode::KeyW, &[KeyCode::KeyS]),
        );
        movement.normalize_or_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_keys_no_movement() {
        assert_eq!(InputState::new().movement_intent(), Vec3::ZERO);
    }

    #[test]
    fn test_single_axis_movement() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::KeyW);
        assert_eq!(input.movement_intent(), Vec3::Z);
        input.on_key_released(KeyCode::KeyW);
        input.on_key_pressed(KeyCode::KeyA);
        assert_eq!(input.movement_intent(), Vec3::NEG_X);
        input.on_key_pressed(KeyCode::ShiftLeft);
        input.on_key_released(KeyCode::KeyA);
        assert_eq!(input.movement_intent(), Vec3::NEG_Y);
    }

    #[test]
    fn test_diagonal_is_normalized() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::KeyW);
        input.on_key_pressed(KeyCode::KeyD);
        let movement = input.movement_intent();
        assert!((movement.length() - 1.0).abs() < 1e-6);
        assert!((movement.x - movement.z).abs() < 1e-6);
    }

    #[test]
    fn test_conflicting_keys_prefer_positive() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::KeyS);
        input.on_key_pressed(KeyCode::KeyW);
        assert_eq!(input.movement_intent(), Vec3::Z);
    }

    #[test]
    fn test_pointer_delta_accumulates_until_taken() {
        let mut input = InputState::new();
        input.on_pointer_motion(3.0, -1.0);
        input.on_pointer_motion(2.0, 4.0);
        assert_eq!(input.take_pointer_delta(), Vec2::new(5.0, 3.0));
        assert_eq!(input.take_pointer_delta(), Vec2::ZERO);
    }

    #[test]
    fn test_just_pressed_clears_each_frame() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::Escape);
        assert!(input.is_key_just_pressed(KeyCode::Escape));
        input.begin_frame();
        assert!(!input.is_key_just_pressed(KeyCode::Escape));
        assert!(input.is_key_pressed(KeyCode::Escape));
        // held key repeating does not count as a new press
        input.on_key_pressed(KeyCode::Escape);
        assert!(!input.is_key_just_pressed(KeyCode::Escape));
    }

    #[test]
    fn test_clear_drops_everything() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::KeyW);
        input.on_mouse_pressed(MouseButton::Right);
        input.on_pointer_motion(1.0, 1.0);
        input.clear();
        assert_eq!(input.movement_intent(), Vec3::ZERO);
        assert!(!input.is_mouse_pressed(MouseButton::Right));
        assert_eq!(input.take_pointer_delta(), Vec2::ZERO);
    }
}
