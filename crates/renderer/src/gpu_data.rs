//! Data layouts shared with the shaders.
//!
//! Every struct here is `#[repr(C)]` and [`Pod`] so it can be written into a
//! [`WriteBuffer`](engine_rhi::write_buffer::WriteBuffer) as raw bytes. Field
//! order and sizes follow std140/std430 rules without implicit padding.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

use engine_scene::PlayerCamera;

/// Frames per radian of the background and ambient animation.
const ANIMATION_PERIOD: f32 = 120.0;

/// Camera matrices, set 0 binding 0.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuCameraData {
    pub view: Mat4,
    pub proj: Mat4,
    pub viewproj: Mat4,
}

impl GpuCameraData {
    pub fn from_camera(camera: &PlayerCamera, aspect: f32) -> Self {
        let view = camera.view_matrix();
        let proj = camera.projection_matrix(aspect);
        Self {
            view,
            proj,
            viewproj: proj * view,
        }
    }
}

/// Scene lighting parameters, set 0 binding 1.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuSceneData {
    pub fog_color: Vec4,
    /// x = min, y = max, zw unused
    pub fog_distances: Vec4,
    pub ambient_color: Vec4,
    /// w = sun power
    pub sunlight_direction: Vec4,
    pub sunlight_color: Vec4,
}

impl GpuSceneData {
    /// Scene parameters for `frame_number`, with the ambient color cycling
    /// between red and blue.
    pub fn animated(frame_number: u64) -> Self {
        let f = animation_phase(frame_number);
        Self {
            ambient_color: Vec4::new(f.sin(), 0.0, f.cos(), 1.0),
            ..Self::default()
        }
    }
}

/// Per-object data, one element of the set 1 storage buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuObjectData {
    pub model: Mat4,
    pub color: Vec4,
}

/// Indirect draw parameters with the layout of `VkDrawIndirectCommand`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct GpuDrawCommand {
    pub vertex_count: u32,
    pub instance_count: u32,
    pub first_vertex: u32,
    pub first_instance: u32,
}

impl GpuDrawCommand {
    /// Draws all of a mesh once, reading object data at `object_index`.
    pub fn for_object(vertex_count: u32, object_index: u32) -> Self {
        Self {
            vertex_count,
            instance_count: 1,
            first_vertex: 0,
            first_instance: object_index,
        }
    }
}

/// Background color for `frame_number`: a blue pulse.
pub fn clear_color(frame_number: u64) -> [f32; 4] {
    let flash = animation_phase(frame_number).sin().abs();
    [0.0, 0.0, flash, 1.0]
}

fn animation_phase(frame_number: u64) -> f32 {
    frame_number as f32 / ANIMATION_PERIOD
}
