//! Meshes and materials addressed by handle.
//!
//! The arena is the single owner of every mesh and material record. Render
//! objects and draw batches refer to them through [`MeshHandle`] and
//! [`MaterialHandle`]; two objects share a mesh exactly when their handles
//! are equal. The GPU memory behind a record belongs to the engine's
//! deletion stack, so records are plain handles and never free anything.

use std::collections::HashMap;

use ash::vk;
use glam::{Mat4, Vec4};
use tracing::debug;

use engine_scene::ObjectDesc;

use crate::error::{RendererError, RendererResult};

/// Index of a mesh in a [`ResourceArena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshHandle(u32);

/// Index of a material in a [`ResourceArena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialHandle(u32);

/// A GPU-resident, non-indexed vertex buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GpuMesh {
    pub vertex_buffer: vk::Buffer,
    pub vertex_count: u32,
}

/// A pipeline plus the resources bound with it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Material {
    pub pipeline: vk::Pipeline,
    pub pipeline_layout: vk::PipelineLayout,
    /// Bound at set 2 when present
    pub texture_set: Option<vk::DescriptorSet>,
}

/// One entry of the render list.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderObject {
    pub mesh: MeshHandle,
    pub material: MaterialHandle,
    pub transform: Mat4,
    pub color: Vec4,
}

/// Owns meshes and materials and resolves names to handles.
#[derive(Debug, Default)]
pub struct ResourceArena {
    meshes: Vec<GpuMesh>,
    materials: Vec<Material>,
    mesh_names: HashMap<String, MeshHandle>,
    material_names: HashMap<String, MaterialHandle>,
}

impl ResourceArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `mesh` under `name`.
    ///
    /// Registering a name twice replaces the record and keeps the handle, so
    /// objects already pointing at it see the new mesh.
    pub fn add_mesh(&mut self, name: &str, mesh: GpuMesh) -> MeshHandle {
        if let Some(&handle) = self.mesh_names.get(name) {
            debug!("Replacing mesh '{}'", name);
            self.meshes[handle.0 as usize] = mesh;
            return handle;
        }
        let handle = MeshHandle(self.meshes.len() as u32);
        self.meshes.push(mesh);
        self.mesh_names.insert(name.to_owned(), handle);
        debug!("Mesh '{}' registered ({} vertices)", name, mesh.vertex_count);
        handle
    }

    /// Registers `material` under `name`, replacing any earlier one.
    pub fn add_material(&mut self, name: &str, material: Material) -> MaterialHandle {
        if let Some(&handle) = self.material_names.get(name) {
            debug!("Replacing material '{}'", name);
            self.materials[handle.0 as usize] = material;
            return handle;
        }
        let handle = MaterialHandle(self.materials.len() as u32);
        self.materials.push(material);
        self.material_names.insert(name.to_owned(), handle);
        debug!("Material '{}' registered", name);
        handle
    }

    pub fn mesh_handle(&self, name: &str) -> Option<MeshHandle> {
        self.mesh_names.get(name).copied()
    }

    pub fn material_handle(&self, name: &str) -> Option<MaterialHandle> {
        self.material_names.get(name).copied()
    }

    pub fn mesh(&self, handle: MeshHandle) -> Option<&GpuMesh> {
        self.meshes.get(handle.0 as usize)
    }

    pub fn material(&self, handle: MaterialHandle) -> Option<&Material> {
        self.materials.get(handle.0 as usize)
    }

    #[inline]
    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    #[inline]
    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    /// Turns a named description into a render object.
    pub fn resolve(&self, desc: &ObjectDesc) -> RendererResult<RenderObject> {
        let mesh = self
            .mesh_handle(desc.mesh)
            .ok_or_else(|| RendererError::UnknownMesh(desc.mesh.to_owned()))?;
        let material = self
            .material_handle(desc.material)
            .ok_or_else(|| RendererError::UnknownMaterial(desc.material.to_owned()))?;
        Ok(RenderObject {
            mesh,
            material,
            transform: desc.transform,
            color: desc.color,
        })
    }
}
