//! The demo scene: a monkey, a field of colored triangles and a textured map.
//!
//! The scene is described by name only. The renderer resolves mesh and
//! material names to GPU resources and skips descriptions it cannot resolve.

use glam::{Mat4, Vec3, Vec4};
use tracing::debug;

use crate::rng::Rng;

pub const MONKEY_MESH: &str = "monkey";
pub const TRIANGLE_MESH: &str = "triangle";
pub const EMPIRE_MESH: &str = "empire";

pub const DEFAULT_MATERIAL: &str = "defaultmesh";
pub const TEXTURED_MATERIAL: &str = "texturedmesh";

/// Half the side length of the triangle grid.
pub const GRID_HALF_EXTENT: i32 = 20;

/// One object to draw, referring to its mesh and material by name.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectDesc {
    pub mesh: &'static str,
    pub material: &'static str,
    pub transform: Mat4,
    pub color: Vec4,
}

/// Ordered object descriptions for the demo.
#[derive(Clone, Debug, Default)]
pub struct DemoScene {
    pub objects: Vec<ObjectDesc>,
}

impl DemoScene {
    /// Builds the scene, drawing triangle colors from `rng`.
    pub fn build(rng: &mut Rng) -> Self {
        let side = (2 * GRID_HALF_EXTENT + 1) as usize;
        let mut objects = Vec::with_capacity(side * side + 2);

        objects.push(ObjectDesc {
            mesh: MONKEY_MESH,
            material: DEFAULT_MATERIAL,
            transform: Mat4::IDENTITY,
            color: Vec4::ONE,
        });

        let scale = Mat4::from_scale(Vec3::splat(0.2));
        for x in -GRID_HALF_EXTENT..=GRID_HALF_EXTENT {
            for y in -GRID_HALF_EXTENT..=GRID_HALF_EXTENT {
                let translation = Mat4::from_translation(Vec3::new(x as f32, 0.0, y as f32));
                objects.push(ObjectDesc {
                    mesh: TRIANGLE_MESH,
                    material: DEFAULT_MATERIAL,
                    transform: translation * scale,
                    color: rng.next_color(),
                });
            }
        }

        objects.push(ObjectDesc {
            mesh: EMPIRE_MESH,
            material: TEXTURED_MATERIAL,
            transform: Mat4::from_translation(Vec3::new(5.0, -10.0, 0.0)),
            color: Vec4::ONE,
        });

        debug!("Demo scene built with {} objects", objects.len());
        Self { objects }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
