//! Integration tests for turning the demo scene into indirect draws.

use ash::vk;
use engine_renderer::arena::{GpuMesh, Material};
use engine_renderer::gpu_data::GpuDrawCommand;
use engine_renderer::{RendererError, ResourceArena, compact_draws};
use engine_scene::demo::{
    DEFAULT_MATERIAL, EMPIRE_MESH, GRID_HALF_EXTENT, MONKEY_MESH, TEXTURED_MATERIAL, TRIANGLE_MESH,
};
use engine_scene::{DemoScene, Rng};

fn mesh(vertex_count: u32) -> GpuMesh {
    GpuMesh {
        vertex_buffer: vk::Buffer::null(),
        vertex_count,
    }
}

fn material() -> Material {
    Material {
        pipeline: vk::Pipeline::null(),
        pipeline_layout: vk::PipelineLayout::null(),
        texture_set: None,
    }
}

fn full_arena() -> ResourceArena {
    let mut arena = ResourceArena::new();
    arena.add_mesh(TRIANGLE_MESH, mesh(3));
    arena.add_mesh(MONKEY_MESH, mesh(2904));
    arena.add_mesh(EMPIRE_MESH, mesh(60_000));
    arena.add_material(DEFAULT_MATERIAL, material());
    arena.add_material(TEXTURED_MATERIAL, material());
    arena
}

#[test]
fn test_demo_scene_compacts_to_three_batches() {
    let arena = full_arena();
    let scene = DemoScene::build(&mut Rng::new(0x5EED));
    let objects: Vec<_> = scene
        .objects
        .iter()
        .map(|desc| arena.resolve(desc).unwrap())
        .collect();

    let side = (2 * GRID_HALF_EXTENT + 1) as u32;
    let batches = compact_draws(&objects);

    assert_eq!(batches.len(), 3);
    assert_eq!((batches[0].first, batches[0].count), (0, 1));
    assert_eq!((batches[1].first, batches[1].count), (1, side * side));
    assert_eq!(batches[2].first, 1 + side * side);
    assert_eq!(batches[2].count, 1);
    assert_eq!(
        batches[2].material,
        arena.material_handle(TEXTURED_MATERIAL).unwrap()
    );
}

#[test]
fn test_missing_texture_drops_only_the_map() {
    let mut arena = ResourceArena::new();
    arena.add_mesh(TRIANGLE_MESH, mesh(3));
    arena.add_mesh(MONKEY_MESH, mesh(2904));
    arena.add_mesh(EMPIRE_MESH, mesh(60_000));
    arena.add_material(DEFAULT_MATERIAL, material());

    let scene = DemoScene::build(&mut Rng::new(1));
    let mut skipped = Vec::new();
    let objects: Vec<_> = scene
        .objects
        .iter()
        .filter_map(|desc| match arena.resolve(desc) {
            Ok(object) => Some(object),
            Err(e) => {
                skipped.push(e);
                None
            }
        })
        .collect();

    assert_eq!(objects.len(), scene.len() - 1);
    assert!(matches!(
        skipped.as_slice(),
        [RendererError::UnknownMaterial(name)] if name == TEXTURED_MATERIAL
    ));
    assert_eq!(compact_draws(&objects).len(), 2);
}

#[test]
fn test_indirect_offsets_address_each_batch() {
    let arena = full_arena();
    let scene = DemoScene::build(&mut Rng::new(7));
    let objects: Vec<_> = scene
        .objects
        .iter()
        .map(|desc| arena.resolve(desc).unwrap())
        .collect();

    let commands: Vec<GpuDrawCommand> = objects
        .iter()
        .enumerate()
        .map(|(i, object)| {
            GpuDrawCommand::for_object(arena.mesh(object.mesh).unwrap().vertex_count, i as u32)
        })
        .collect();

    for batch in compact_draws(&objects) {
        let first = &commands[batch.first as usize];
        let vertex_count = arena.mesh(batch.mesh).unwrap().vertex_count;
        assert_eq!(first.first_instance, batch.first);
        assert_eq!(first.vertex_count, vertex_count);
        assert_eq!(first.instance_count, 1);
    }
}
