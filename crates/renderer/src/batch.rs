//! Indirect draw batching.
//!
//! [`compact_draws`] walks the render list once and merges runs of adjacent
//! objects with the same mesh and material. It never reorders: a list that
//! alternates between two meshes produces one batch per object. Callers
//! wanting fewer batches sort the list first.

use crate::arena::{MaterialHandle, MeshHandle, RenderObject};

/// A contiguous run of render-list entries drawn by one indirect call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndirectBatch {
    pub mesh: MeshHandle,
    pub material: MaterialHandle,
    /// Index of the first object, and of its draw command
    pub first: u32,
    pub count: u32,
}

/// Groups adjacent objects sharing mesh and material into batches.
pub fn compact_draws(objects: &[RenderObject]) -> Vec<IndirectBatch> {
    let mut batches: Vec<IndirectBatch> = Vec::new();

    for (index, object) in objects.iter().enumerate() {
        match batches.last_mut() {
            Some(last) if last.mesh == object.mesh && last.material == object.material => {
                last.count += 1;
            }
            _ => batches.push(IndirectBatch {
                mesh: object.mesh,
                material: object.material,
                first: index as u32,
                count: 1,
            }),
        }
    }

    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::{GpuMesh, Material, ResourceArena};
    use ash::vk::{self, Handle};
    use glam::{Mat4, Vec4};

    struct Fixture {
        a: (MeshHandle, MaterialHandle),
        b: (MeshHandle, MaterialHandle),
        /// mesh a with a second material
        c: (MeshHandle, MaterialHandle),
    }

    fn fixture() -> Fixture {
        let mut arena = ResourceArena::new();
        let mesh_a = arena.add_mesh(
            "a",
            GpuMesh {
                vertex_buffer: vk::Buffer::from_raw(1),
                vertex_count: 3,
            },
        );
        let mesh_b = arena.add_mesh(
            "b",
            GpuMesh {
                vertex_buffer: vk::Buffer::from_raw(2),
                vertex_count: 3,
            },
        );
        let lit = arena.add_material(
            "lit",
            Material {
                pipeline: vk::Pipeline::from_raw(1),
                pipeline_layout: vk::PipelineLayout::from_raw(1),
                texture_set: None,
            },
        );
        let textured = arena.add_material(
            "textured",
            Material {
                pipeline: vk::Pipeline::from_raw(2),
                pipeline_layout: vk::PipelineLayout::from_raw(2),
                texture_set: Some(vk::DescriptorSet::from_raw(5)),
            },
        );
        Fixture {
            a: (mesh_a, lit),
            b: (mesh_b, lit),
            c: (mesh_a, textured),
        }
    }

    fn object((mesh, material): (MeshHandle, MaterialHandle)) -> RenderObject {
        RenderObject {
            mesh,
            material,
            transform: Mat4::IDENTITY,
            color: Vec4::ONE,
        }
    }

    fn summary(batches: &[IndirectBatch]) -> Vec<(MeshHandle, u32, u32)> {
        batches.iter().map(|b| (b.mesh, b.first, b.count)).collect()
    }

    #[test]
    fn test_merges_only_adjacent_runs() {
        let f = fixture();
        let list = [object(f.a), object(f.a), object(f.b), object(f.a)];
        let batches = compact_draws(&list);
        assert_eq!(
            summary(&batches),
            vec![(f.a.0, 0, 2), (f.b.0, 2, 1), (f.a.0, 3, 1)]
        );
    }

    #[test]
    fn test_empty_list_has_no_batches() {
        assert!(compact_draws(&[]).is_empty());
    }

    #[test]
    fn test_single_object_is_one_batch() {
        let f = fixture();
        let batches = compact_draws(&[object(f.b)]);
        assert_eq!(summary(&batches), vec![(f.b.0, 0, 1)]);
    }

    #[test]
    fn test_material_change_splits_a_run() {
        let f = fixture();
        let list = [object(f.a), object(f.c), object(f.c)];
        let batches = compact_draws(&list);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].mesh, batches[1].mesh);
        assert_eq!(batches[1].material, f.c.1);
        assert_eq!((batches[1].first, batches[1].count), (1, 2));
    }

    #[test]
    fn test_batches_cover_the_list_in_order() {
        let f = fixture();
        let list: Vec<RenderObject> = (0..10)
            .map(|i| if i % 3 == 0 { object(f.b) } else { object(f.a) })
            .collect();
        let batches = compact_draws(&list);
        let mut next = 0;
        for batch in &batches {
            assert_eq!(batch.first, next);
            next += batch.count;
        }
        assert_eq!(next as usize, list.len());
    }
}
