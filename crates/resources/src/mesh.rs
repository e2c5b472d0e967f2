//! Mesh data loaded from Wavefront OBJ files.
//!
//! Every mesh is flattened into a non-indexed triangle list of [`Vertex`]
//! values, ready to be copied into a vertex buffer as-is.

use std::path::Path;

use engine_rhi::vertex::Vertex;
use glam::{Vec2, Vec3};
use tracing::{debug, warn};

use crate::error::{ResourceError, ResourceResult};

/// CPU-side vertices of one mesh.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
}

impl MeshData {
    /// Loads and triangulates an OBJ file, concatenating all of its shapes.
    ///
    /// Vertex colors are set to the normal. Texture V is flipped for Vulkan.
    /// Missing normals or texture coordinates read as zero. Materials
    /// referenced by the file are ignored.
    ///
    /// # Errors
    ///
    /// [`ResourceError::FileNotFound`] if `path` does not exist,
    /// [`ResourceError::ObjLoad`] if it cannot be parsed and
    /// [`ResourceError::NoMeshes`] if it holds no triangles.
    pub fn load_obj(path: &Path) -> ResourceResult<Self> {
        if !path.exists() {
            return Err(ResourceError::FileNotFound(path.to_path_buf()));
        }

        let options = tobj::LoadOptions {
            single_index: true,
            triangulate: true,
            ..Default::default()
        };
        let (models, materials) =
            tobj::load_obj(path, &options).map_err(|source| ResourceError::ObjLoad {
                path: path.to_path_buf(),
                source,
            })?;
        if let Err(e) = materials {
            debug!("Ignoring materials of {:?}: {}", path, e);
        }

        let mut vertices = Vec::new();
        for model in &models {
            let mesh = &model.mesh;
            if mesh.normals.is_empty() {
                warn!("Shape '{}' in {:?} has no normals", model.name, path);
            }
            vertices.extend(mesh.indices.iter().map(|&index| {
                let i = index as usize;
                let position = vec3_at(&mesh.positions, i);
                let normal = vec3_at(&mesh.normals, i);
                let uv = mesh
                    .texcoords
                    .get(2 * i..2 * i + 2)
                    .map_or(Vec2::ZERO, |t| Vec2::new(t[0], 1.0 - t[1]));
                Vertex::new(position, normal, normal, uv)
            }));
        }

        if vertices.is_empty() {
            return Err(ResourceError::NoMeshes(path.to_path_buf()));
        }

        debug!(
            "Loaded {:?}: {} shape(s), {} vertices",
            path,
            models.len(),
            vertices.len()
        );
        Ok(Self { vertices })
    }

    /// A single triangle with red, green and blue corners.
    pub fn triangle() -> Self {
        let normal = Vec3::ZERO;
        Self {
            vertices: vec![
                Vertex::new(Vec3::new(1.0, 1.0, 0.0), normal, Vec3::X, Vec2::ZERO),
                Vertex::new(Vec3::new(-1.0, 1.0, 0.0), normal, Vec3::Y, Vec2::ZERO),
                Vertex::new(Vec3::new(0.0, -1.0, 0.0), normal, Vec3::Z, Vec2::ZERO),
            ],
        }
    }

    #[inline]
    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    /// The vertices as raw bytes for upload.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }
}

fn vec3_at(data: &[f32], i: usize) -> Vec3 {
    data.get(3 * i..3 * i + 3)
        .map_or(Vec3::ZERO, Vec3::from_slice)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triangle() {
        let mesh = MeshData::triangle();
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.vertices[0].color, Vec3::X);
        assert_eq!(mesh.vertices[2].position, Vec3::new(0.0, -1.0, 0.0));
        assert_eq!(mesh.as_bytes().len(), 3 * Vertex::size());
    }

    #[test]
    fn test_vec3_at_out_of_range_is_zero() {
        let data = [1.0, 2.0, 3.0];
        assert_eq!(vec3_at(&data, 0), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(vec3_at(&data, 1), Vec3::ZERO);
        assert_eq!(vec3_at(&[], 0), Vec3::ZERO);
    }

    #[test]
    fn test_missing_file() {
        let err = MeshData::load_obj(Path::new("definitely/not/here.obj")).unwrap_err();
        assert!(matches!(err, ResourceError::FileNotFound(_)));
    }
}
