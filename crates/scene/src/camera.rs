//! First-person fly camera.
//!
//! [`PlayerCamera`] is driven once per fixed tick by a movement intent and a
//! pointer delta. Yaw turns around world up; pitch is clamped just short of
//! straight up or down. Movement is relative to the view: `x` strafes along
//! the horizontal right vector, `y` moves along world up and `z` moves along
//! the view direction.

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};

/// Pitch limit in degrees.
const MAX_PITCH_DEGREES: f32 = 89.9;

/// A yaw/pitch camera with a velocity integrated per fixed tick.
#[derive(Clone, Debug)]
pub struct PlayerCamera {
    pub position: Vec3,
    pub velocity: Vec3,
    /// Radians, positive turns right.
    pub yaw: f32,
    /// Radians, positive looks down.
    pub pitch: f32,
    /// World units per second.
    pub speed: f32,
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for PlayerCamera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 6.0, 5.0),
            velocity: Vec3::ZERO,
            yaw: 0.0,
            pitch: 0.0,
            speed: 1.0,
            fov_y: 90.0_f32.to_radians(),
            near: 0.1,
            far: 5000.0,
        }
    }
}

impl PlayerCamera {
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    /// Rotation from camera space to world space: yaw, then pitch.
    pub fn rotation_matrix(&self) -> Mat4 {
        Mat4::from_axis_angle(Vec3::NEG_Y, self.yaw) * Mat4::from_axis_angle(Vec3::NEG_X, self.pitch)
    }

    /// The view direction.
    pub fn forward(&self) -> Vec3 {
        (self.rotation_matrix() * Vec4::new(0.0, 0.0, -1.0, 0.0)).truncate()
    }

    /// Camera right with its component along `up` removed.
    pub fn right(&self, up: Vec3) -> Vec3 {
        let right = (self.rotation_matrix() * Vec4::X).truncate();
        right - right.project_onto(up)
    }

    /// Applies one fixed tick of input.
    ///
    /// `pointer_delta` is in pixels and is scaled by `viewport_height`, so a
    /// full-height drag turns by one radian.
    pub fn apply_input(&mut self, movement: Vec3, pointer_delta: Vec2, viewport_height: f32, dt: f32) {
        let height = viewport_height.max(1.0);
        self.yaw += pointer_delta.x / height;
        let limit = MAX_PITCH_DEGREES.to_radians();
        self.pitch = (self.pitch + pointer_delta.y / height).clamp(-limit, limit);

        let axes = Mat3::from_cols(self.right(Vec3::Y), Vec3::Y, self.forward());
        self.velocity = self.speed * (axes * movement);
        self.update(dt);
    }

    /// Integrates the current velocity over `dt` seconds.
    pub fn update(&mut self, dt: f32) {
        self.position += self.velocity * dt;
    }

    pub fn view_matrix(&self) -> Mat4 {
        (Mat4::from_translation(self.position) * self.rotation_matrix()).inverse()
    }

    /// Perspective projection with Y flipped for Vulkan clip space.
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        let mut proj = Mat4::perspective_rh(self.fov_y, aspect, self.near, self.far);
        proj.y_axis.y *= -1.0;
        proj
    }

    pub fn view_projection_matrix(&self, aspect: f32) -> Mat4 {
        self.projection_matrix(aspect) * self.view_matrix()
    }
}
