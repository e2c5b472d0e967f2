//! The engine driver.
//!
//! [`Engine`] owns every Vulkan object and runs one frame per [`Engine::draw`]
//! call. Initialization builds, in order: instance, surface, device, render
//! targets, upload context, per-frame resources, meshes and textures,
//! materials, and finally the demo scene.
//!
//! # Resource Destruction Order
//!
//! Long-lived objects are registered with the main deletion stack as they are
//! created; swapchain-dependent ones live in [`RenderTargets`]. On drop the
//! engine waits for every in-flight frame, then destroys descriptor pools and
//! cached layouts, the render targets and the main stack. The surface, device
//! and instance follow through field drop order.

use std::mem::size_of;
use std::sync::Arc;

use ash::vk;
use bytemuck::Pod;
use tracing::{debug, error, info, warn};

use engine_core::EngineConfig;
use engine_platform::{Surface, Window};
use engine_resources::{MeshData, TextureData};
use engine_rhi::RhiError;
use engine_rhi::buffer::BufferUsage;
use engine_rhi::command::CommandBuffer;
use engine_rhi::deletion::DeletionStack;
use engine_rhi::descriptor::{
    DescriptorAllocator, DescriptorLayoutCache, DescriptorSetBuilder, image_info,
};
use engine_rhi::device::Device;
use engine_rhi::image::create_sampler;
use engine_rhi::instance::Instance;
use engine_rhi::physical_device::select_physical_device;
use engine_rhi::pipeline::{CompareOp, GraphicsPipelineBuilder};
use engine_rhi::render_pass::clear_values;
use engine_rhi::shader::{ShaderBinding, ShaderEffect, ShaderModule, ShaderStage};
use engine_rhi::swapchain::{Acquire, Present};
use engine_rhi::sync::{create_fence, create_semaphore};
use engine_rhi::upload::UploadContext;
use engine_rhi::vertex::Vertex;
use engine_rhi::write_buffer::WriteBuffer;
use engine_scene::demo::{
    DEFAULT_MATERIAL, EMPIRE_MESH, MONKEY_MESH, TEXTURED_MATERIAL, TRIANGLE_MESH,
};
use engine_scene::{DemoScene, PlayerCamera, Rng};

use crate::arena::{GpuMesh, Material, RenderObject, ResourceArena};
use crate::batch::compact_draws;
use crate::error::{RendererError, RendererResult};
use crate::frame_ring::{FenceWait, FrameOutcome, FrameRing, FrameTarget};
use crate::gpu_data::{GpuCameraData, GpuDrawCommand, GpuObjectData, GpuSceneData, clear_color};
use crate::targets::RenderTargets;

// Descriptor interface shared by every shader: set 0 is per-frame globals,
// set 1 the object buffer, set 2 the material texture.
const CAMERA_BINDING: ShaderBinding =
    ShaderBinding::new(0, 0, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC);
const SCENE_BINDING: ShaderBinding =
    ShaderBinding::new(0, 1, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC);
const OBJECTS_BINDING: ShaderBinding =
    ShaderBinding::new(1, 0, vk::DescriptorType::STORAGE_BUFFER);
const TEXTURE_BINDING: ShaderBinding =
    ShaderBinding::new(2, 0, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);

const MESH_VERTEX_SHADER: &str = "shaders/tri_mesh.vert.spv";
const DEFAULT_LIT_SHADER: &str = "shaders/default_lit.frag.spv";
const TEXTURED_LIT_SHADER: &str = "shaders/textured_lit.frag.spv";

const MONKEY_OBJ: &str = "monkey_smooth.obj";
const EMPIRE_OBJ: &str = "lost_empire.obj";
const EMPIRE_TEXTURE: &str = "lost_empire-RGBA.png";

/// Resources owned by one ring slot.
struct FrameData {
    image_acquired: vk::Semaphore,
    render_complete: vk::Semaphore,
    /// Created signaled so the first wait on the slot returns at once
    fence: vk::Fence,
    /// Camera and scene uniforms, bound with dynamic offsets
    global_set: vk::DescriptorSet,
    object_set: vk::DescriptorSet,
    object_buffer: WriteBuffer,
    indirect_buffer: WriteBuffer,
}

/// The rendering engine.
pub struct Engine {
    config: EngineConfig,
    ring: FrameRing,
    frames: Vec<FrameData>,
    arena: ResourceArena,
    render_objects: Vec<RenderObject>,
    camera_buffer: WriteBuffer,
    scene_buffer: WriteBuffer,
    descriptor_allocator: DescriptorAllocator,
    layout_cache: DescriptorLayoutCache,
    targets: RenderTargets,
    /// Latest window size; zero while minimized
    window_extent: vk::Extent2D,
    resize_requested: bool,
    deletion: DeletionStack,
    // Dropped in declaration order after `Drop::drop` has flushed the stacks.
    surface: Surface,
    device: Arc<Device>,
    instance: Instance,
}

impl Engine {
    /// Creates the engine for `window` and loads the demo scene.
    ///
    /// Missing meshes or textures are logged and the objects using them are
    /// left out of the scene.
    ///
    /// # Errors
    ///
    /// Fails if any core Vulkan object cannot be created, if a shader cannot
    /// be loaded, or if two shader stages disagree on a binding.
    pub fn new(window: &Window, config: EngineConfig) -> RendererResult<Self> {
        let window_extent = window.extent();
        info!(
            "Initializing engine ({}x{}, {} frames in flight)",
            window_extent.width, window_extent.height, config.frame_overlap
        );

        let extensions = window.required_extensions()?;
        let instance = Instance::new(c"engine", config.enable_validation, &extensions)?;
        let surface = window.create_surface(instance.entry(), instance.handle())?;
        let gpu = select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, &gpu)?;

        let mut targets = RenderTargets::new(
            &instance,
            &device,
            surface.handle(),
            window_extent,
            config.frame_overlap,
        )?;

        let mut deletion = DeletionStack::new("main");
        let mut layout_cache = DescriptorLayoutCache::new();
        let mut descriptor_allocator = DescriptorAllocator::new(config.descriptor_pool_batch);

        let built = build_resources(
            &device,
            &config,
            targets.render_pass(),
            &mut layout_cache,
            &mut descriptor_allocator,
            &mut deletion,
        );
        let Resources {
            camera_buffer,
            scene_buffer,
            frames,
            arena,
        } = match built {
            Ok(resources) => resources,
            Err(e) => {
                error!("Engine initialization failed: {}", e);
                let _ = device.wait_idle();
                descriptor_allocator.cleanup(&*device);
                layout_cache.cleanup(&*device);
                targets.destroy(&device);
                deletion.flush(&device);
                return Err(e);
            }
        };

        let mut engine = Self {
            ring: FrameRing::new(config.frame_overlap),
            config,
            frames,
            arena,
            render_objects: Vec::new(),
            camera_buffer,
            scene_buffer,
            descriptor_allocator,
            layout_cache,
            targets,
            window_extent,
            resize_requested: false,
            deletion,
            surface,
            device,
            instance,
        };

        let scene = DemoScene::build(&mut Rng::new(u64::from(engine.config.seed)));
        let objects = scene
            .objects
            .iter()
            .filter_map(|desc| match engine.arena.resolve(desc) {
                Ok(object) => Some(object),
                Err(e) => {
                    warn!("Skipping scene object: {}", e);
                    None
                }
            })
            .collect();
        engine.set_render_objects(objects);

        info!(
            "Engine initialized: {} meshes, {} materials, {} objects",
            engine.arena.mesh_count(),
            engine.arena.material_count(),
            engine.render_objects.len()
        );
        Ok(engine)
    }

    /// Replaces the render list, truncating it to what the per-frame
    /// buffers can hold.
    pub fn set_render_objects(&mut self, mut objects: Vec<RenderObject>) {
        let capacity = self.draw_capacity();
        if objects.len() > capacity {
            warn!(
                "Render list of {} objects truncated to {}",
                objects.len(),
                capacity
            );
            objects.truncate(capacity);
        }
        self.render_objects = objects;
    }

    #[inline]
    pub fn render_objects(&self) -> &[RenderObject] {
        &self.render_objects
    }

    #[inline]
    pub fn arena(&self) -> &ResourceArena {
        &self.arena
    }

    /// Frames presented so far.
    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.ring.frame_number()
    }

    /// Size of the current swapchain images.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.targets.extent()
    }

    /// Records the new window size; the swapchain is rebuilt before the next
    /// frame.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == self.window_extent.width && height == self.window_extent.height {
            return;
        }
        debug!(
            "Resize requested: {}x{} -> {}x{}",
            self.window_extent.width, self.window_extent.height, width, height
        );
        self.window_extent = vk::Extent2D { width, height };
        self.resize_requested = true;
    }

    /// Renders one frame seen from `camera`.
    ///
    /// Does nothing while the window is minimized.
    ///
    /// # Errors
    ///
    /// Any error is fatal; a GPU timeout means the device is most likely
    /// lost.
    pub fn draw(&mut self, camera: &PlayerCamera) -> RendererResult<()> {
        if self.window_extent.width == 0 || self.window_extent.height == 0 {
            return Ok(());
        }
        if self.resize_requested {
            self.recreate_targets()?;
        }

        let mut ring = self.ring;
        let result = ring.run_frame(&mut FrameContext {
            engine: self,
            camera,
        });
        self.ring = ring;

        match result {
            Ok(FrameOutcome::Abandoned) => {
                debug!("Frame {} abandoned", self.ring.frame_number());
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(e) => {
                error!("Frame {} failed: {}", self.ring.frame_number(), e);
                Err(e)
            }
        }
    }

    /// Writes this frame's buffers and records the batched indirect draws.
    fn draw_objects(
        &mut self,
        cmd: &CommandBuffer<'_>,
        slot: usize,
        camera: &PlayerCamera,
    ) -> RendererResult<()> {
        let extent = self.targets.extent();
        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        let frame_number = self.ring.frame_number();

        fill(
            &mut self.camera_buffer,
            slot,
            &[GpuCameraData::from_camera(camera, aspect)],
        );
        fill(
            &mut self.scene_buffer,
            slot,
            &[GpuSceneData::animated(frame_number)],
        );

        let objects = &self.render_objects;
        let frame = &mut self.frames[slot];

        let object_data: Vec<GpuObjectData> = objects
            .iter()
            .map(|object| GpuObjectData {
                model: object.transform,
                color: object.color,
            })
            .collect();
        fill(&mut frame.object_buffer, 0, &object_data);

        let commands: Vec<GpuDrawCommand> = objects
            .iter()
            .enumerate()
            .map(|(index, object)| {
                let vertex_count = self
                    .arena
                    .mesh(object.mesh)
                    .map_or(0, |mesh| mesh.vertex_count);
                GpuDrawCommand::for_object(vertex_count, index as u32)
            })
            .collect();
        fill(&mut frame.indirect_buffer, 0, &commands);

        let uniform_offset = |buffer: &WriteBuffer| {
            buffer.offset(slot).map(|offset| offset as u32).ok_or_else(|| {
                RhiError::InvalidHandle(format!("no uniform sub-buffer for slot {}", slot))
            })
        };
        let dynamic_offsets = [
            uniform_offset(&self.camera_buffer)?,
            uniform_offset(&self.scene_buffer)?,
        ];

        let stride = size_of::<GpuDrawCommand>() as u32;
        let mut last_material = None;
        let mut last_mesh = None;

        for batch in compact_draws(objects) {
            if last_material != Some(batch.material) {
                let material = self
                    .arena
                    .material(batch.material)
                    .ok_or_else(|| RendererError::UnknownMaterial(format!("{:?}", batch.material)))?;
                cmd.bind_graphics_pipeline(material.pipeline);
                cmd.bind_descriptor_sets(
                    material.pipeline_layout,
                    0,
                    &[frame.global_set],
                    &dynamic_offsets,
                );
                cmd.bind_descriptor_sets(material.pipeline_layout, 1, &[frame.object_set], &[]);
                if let Some(texture_set) = material.texture_set {
                    cmd.bind_descriptor_sets(material.pipeline_layout, 2, &[texture_set], &[]);
                }
                last_material = Some(batch.material);
            }

            if last_mesh != Some(batch.mesh) {
                let mesh = self
                    .arena
                    .mesh(batch.mesh)
                    .ok_or_else(|| RendererError::UnknownMesh(format!("{:?}", batch.mesh)))?;
                cmd.bind_vertex_buffer(mesh.vertex_buffer);
                last_mesh = Some(batch.mesh);
            }

            cmd.draw_indirect(
                frame.indirect_buffer.handle(),
                u64::from(batch.first) * u64::from(stride),
                batch.count,
                stride,
            );
        }

        Ok(())
    }

    fn record_frame(
        &mut self,
        slot: usize,
        image_index: u32,
        camera: &PlayerCamera,
    ) -> RendererResult<()> {
        let command_buffer = self.targets.command_buffer(slot).ok_or_else(|| {
            RhiError::InvalidHandle(format!("no command buffer for slot {}", slot))
        })?;
        let framebuffer = self.targets.framebuffer(image_index).ok_or_else(|| {
            RhiError::InvalidHandle(format!("no framebuffer for image {}", image_index))
        })?;
        let extent = self.targets.extent();
        let clear = clear_values(clear_color(self.ring.frame_number()));

        let device = Arc::clone(&self.device);
        let cmd = CommandBuffer::new(&device, command_buffer);
        cmd.reset()?;
        cmd.begin_one_time()?;
        cmd.set_viewport_and_scissor(extent);
        cmd.begin_render_pass(self.targets.render_pass(), framebuffer, extent, &clear);
        self.draw_objects(&cmd, slot, camera)?;
        cmd.end_render_pass();
        cmd.end()?;
        Ok(())
    }

    fn recreate_targets(&mut self) -> RendererResult<()> {
        let rebuilt = self.targets.recreate(
            &self.instance,
            &self.device,
            self.surface.handle(),
            self.window_extent,
        )?;
        if rebuilt {
            self.resize_requested = false;
        }
        Ok(())
    }

    /// Objects one frame can hold: bounded by both per-frame buffers.
    fn draw_capacity(&self) -> usize {
        self.config.max_objects.min(self.config.max_commands)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let fences: Vec<vk::Fence> = self.frames.iter().map(|frame| frame.fence).collect();
        if let Err(e) = self
            .device
            .wait_for_fences(&fences, self.config.gpu_timeout_ns)
        {
            error!("Failed to wait for in-flight frames during drop: {}", e);
        }
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during drop: {}", e);
        }

        let device: &Device = &self.device;
        self.descriptor_allocator.cleanup(device);
        self.layout_cache.cleanup(device);
        self.targets.destroy(device);
        self.deletion.flush(device);

        info!("Engine destroyed");
    }
}

/// One frame's view of the engine, driven by [`FrameRing::run_frame`].
struct FrameContext<'a> {
    engine: &'a mut Engine,
    camera: &'a PlayerCamera,
}

impl FenceWait for FrameContext<'_> {
    fn wait_slot(&mut self, slot: usize) -> engine_rhi::RhiResult<()> {
        let fence = self.engine.frames[slot].fence;
        self.engine
            .device
            .wait_for_fences(&[fence], self.engine.config.gpu_timeout_ns)
    }

    fn reset_slot(&mut self, slot: usize) -> engine_rhi::RhiResult<()> {
        self.engine.device.reset_fences(&[self.engine.frames[slot].fence])
    }
}

impl FrameTarget for FrameContext<'_> {
    fn acquire(&mut self, slot: usize) -> engine_rhi::RhiResult<Acquire> {
        self.engine.targets.swapchain().acquire(
            self.engine.frames[slot].image_acquired,
            self.engine.config.gpu_timeout_ns,
        )
    }

    fn record(&mut self, slot: usize, image_index: u32, _frame_number: u64) -> RendererResult<()> {
        self.engine.record_frame(slot, image_index, self.camera)
    }

    fn submit(&mut self, slot: usize) -> engine_rhi::RhiResult<()> {
        let frame = &self.engine.frames[slot];
        let command_buffer = self.engine.targets.command_buffer(slot).ok_or_else(|| {
            RhiError::InvalidHandle(format!("no command buffer for slot {}", slot))
        })?;

        let wait_semaphores = [frame.image_acquired];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [frame.render_complete];
        let command_buffers = [command_buffer];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        // SAFETY: the buffer was recorded this frame and the fence was reset
        // after the wait that retired its previous submission.
        unsafe { self.engine.device.submit_graphics(&[submit_info], frame.fence) }
    }

    fn present(&mut self, slot: usize, image_index: u32) -> engine_rhi::RhiResult<Present> {
        self.engine.targets.swapchain().present(
            self.engine.device.present_queue(),
            image_index,
            self.engine.frames[slot].render_complete,
        )
    }

    fn recreate(&mut self) -> RendererResult<()> {
        self.engine.recreate_targets()
    }
}

/// Rewrites sub-buffer `sub_buffer` of `buffer` with `values`.
///
/// Misuse is logged by the buffer; the write is dropped and the frame goes on.
fn fill<T: Pod>(buffer: &mut WriteBuffer, sub_buffer: usize, values: &[T]) {
    if buffer.open(sub_buffer).is_err() {
        return;
    }
    let _ = buffer.write_slice(values, 0);
    let _ = buffer.close();
}

/// Maps a failed set allocation to the non-recoverable engine error.
fn set_allocation_failed(what: &'static str) -> impl FnOnce(RhiError) -> RendererError {
    move |e| match e {
        RhiError::DescriptorAllocation(result) => {
            error!("Could not allocate the {}: {:?}", what, result);
            RendererError::DescriptorAllocation(what)
        }
        other => other.into(),
    }
}

/// Everything `Engine::new` creates after the render targets.
struct Resources {
    camera_buffer: WriteBuffer,
    scene_buffer: WriteBuffer,
    frames: Vec<FrameData>,
    arena: ResourceArena,
}

fn build_resources(
    device: &Device,
    config: &EngineConfig,
    render_pass: vk::RenderPass,
    layout_cache: &mut DescriptorLayoutCache,
    allocator: &mut DescriptorAllocator,
    deletion: &mut DeletionStack,
) -> RendererResult<Resources> {
    let upload = UploadContext::new(device, config.gpu_timeout_ns, deletion)?;

    let camera_buffer = WriteBuffer::build_constant(
        device,
        config.frame_overlap,
        size_of::<GpuCameraData>() as u64,
        device.min_uniform_alignment(),
        BufferUsage::Uniform,
        "camera_data",
        deletion,
    )?;
    let scene_buffer = WriteBuffer::build_constant(
        device,
        config.frame_overlap,
        size_of::<GpuSceneData>() as u64,
        device.min_uniform_alignment(),
        BufferUsage::Uniform,
        "scene_data",
        deletion,
    )?;

    let mut frames = Vec::with_capacity(config.frame_overlap);
    for slot in 0..config.frame_overlap {
        frames.push(create_frame_data(
            device,
            config,
            &camera_buffer,
            &scene_buffer,
            layout_cache,
            allocator,
            deletion,
        )?);
        debug!("Frame data created for slot {}", slot);
    }

    let mut arena = ResourceArena::new();
    load_meshes(device, &upload, config, &mut arena, deletion)?;
    let texture_set = load_empire_texture(device, &upload, config, layout_cache, allocator, deletion)?;
    create_materials(
        device,
        config,
        render_pass,
        texture_set,
        layout_cache,
        &mut arena,
        deletion,
    )?;

    Ok(Resources {
        camera_buffer,
        scene_buffer,
        frames,
        arena,
    })
}

fn create_frame_data(
    device: &Device,
    config: &EngineConfig,
    camera_buffer: &WriteBuffer,
    scene_buffer: &WriteBuffer,
    layout_cache: &mut DescriptorLayoutCache,
    allocator: &mut DescriptorAllocator,
    deletion: &mut DeletionStack,
) -> RendererResult<FrameData> {
    let fence = create_fence(device, true, deletion)?;
    let image_acquired = create_semaphore(device, deletion)?;
    let render_complete = create_semaphore(device, deletion)?;

    let object_buffer = WriteBuffer::build_constant(
        device,
        1,
        (config.max_objects * size_of::<GpuObjectData>()) as u64,
        device.min_storage_alignment(),
        BufferUsage::Storage,
        "object_data",
        deletion,
    )?;
    let indirect_buffer = WriteBuffer::build_constant(
        device,
        1,
        (config.max_commands * size_of::<GpuDrawCommand>()) as u64,
        device.min_storage_alignment(),
        BufferUsage::Indirect,
        "indirect_commands",
        deletion,
    )?;

    let (global_set, _) = DescriptorSetBuilder::begin(layout_cache, allocator)
        .bind_buffer(
            CAMERA_BINDING.binding,
            camera_buffer.descriptor_info(size_of::<GpuCameraData>() as u64),
            CAMERA_BINDING.ty,
            vk::ShaderStageFlags::VERTEX,
        )
        .bind_buffer(
            SCENE_BINDING.binding,
            scene_buffer.descriptor_info(size_of::<GpuSceneData>() as u64),
            SCENE_BINDING.ty,
            vk::ShaderStageFlags::FRAGMENT,
        )
        .build(device)
        .map_err(set_allocation_failed("global descriptor set"))?;

    let (object_set, _) = DescriptorSetBuilder::begin(layout_cache, allocator)
        .bind_buffer(
            OBJECTS_BINDING.binding,
            object_buffer.descriptor_info(object_buffer.buffer().size()),
            OBJECTS_BINDING.ty,
            vk::ShaderStageFlags::VERTEX,
        )
        .build(device)
        .map_err(set_allocation_failed("object descriptor set"))?;

    Ok(FrameData {
        image_acquired,
        render_complete,
        fence,
        global_set,
        object_set,
        object_buffer,
        indirect_buffer,
    })
}

fn load_meshes(
    device: &Device,
    upload: &UploadContext,
    config: &EngineConfig,
    arena: &mut ResourceArena,
    deletion: &mut DeletionStack,
) -> RendererResult<()> {
    let mut upload_mesh = |name: &str, mesh: &MeshData| -> RendererResult<()> {
        let buffer =
            upload.upload_buffer(device, mesh.as_bytes(), BufferUsage::Vertex, name, deletion)?;
        arena.add_mesh(
            name,
            GpuMesh {
                vertex_buffer: buffer.handle(),
                vertex_count: mesh.vertex_count(),
            },
        );
        Ok(())
    };

    upload_mesh(TRIANGLE_MESH, &MeshData::triangle())?;
    for (name, file) in [(MONKEY_MESH, MONKEY_OBJ), (EMPIRE_MESH, EMPIRE_OBJ)] {
        match MeshData::load_obj(&config.asset_path(file)) {
            Ok(mesh) => upload_mesh(name, &mesh)?,
            Err(e) => error!("Mesh '{}' not loaded: {}", name, e),
        }
    }
    Ok(())
}

/// Uploads the map texture and writes its descriptor set.
///
/// Returns `None` when the file cannot be loaded or the set cannot be
/// allocated; the textured material is then left out.
fn load_empire_texture(
    device: &Device,
    upload: &UploadContext,
    config: &EngineConfig,
    layout_cache: &mut DescriptorLayoutCache,
    allocator: &mut DescriptorAllocator,
    deletion: &mut DeletionStack,
) -> RendererResult<Option<vk::DescriptorSet>> {
    let texture = match TextureData::load(&config.asset_path(EMPIRE_TEXTURE)) {
        Ok(texture) => texture,
        Err(e) => {
            error!("Texture '{}' not loaded: {}", EMPIRE_TEXTURE, e);
            return Ok(None);
        }
    };

    let image = upload.upload_image(
        device,
        &texture.pixels,
        texture.width,
        texture.height,
        "empire_diffuse",
        deletion,
    )?;
    let sampler = create_sampler(device, vk::Filter::NEAREST, deletion)?;

    let built = DescriptorSetBuilder::begin(layout_cache, allocator)
        .bind_image(
            TEXTURE_BINDING.binding,
            image_info(sampler, image.view(), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
            TEXTURE_BINDING.ty,
            vk::ShaderStageFlags::FRAGMENT,
        )
        .build(device);

    match built {
        Ok((set, _)) => Ok(Some(set)),
        Err(RhiError::DescriptorAllocation(result)) => {
            error!("Texture descriptor set not allocated: {:?}", result);
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Builds the untextured and textured materials.
fn create_materials(
    device: &Device,
    config: &EngineConfig,
    render_pass: vk::RenderPass,
    texture_set: Option<vk::DescriptorSet>,
    layout_cache: &mut DescriptorLayoutCache,
    arena: &mut ResourceArena,
    deletion: &mut DeletionStack,
) -> RendererResult<()> {
    let vertex = ShaderModule::load(
        device,
        &config.asset_path(MESH_VERTEX_SHADER),
        ShaderStage::Vertex,
        &[CAMERA_BINDING, OBJECTS_BINDING],
    )?;
    let default_lit = ShaderModule::load(
        device,
        &config.asset_path(DEFAULT_LIT_SHADER),
        ShaderStage::Fragment,
        &[SCENE_BINDING],
    )?;
    let textured_lit = ShaderModule::load(
        device,
        &config.asset_path(TEXTURED_LIT_SHADER),
        ShaderStage::Fragment,
        &[SCENE_BINDING, TEXTURE_BINDING],
    )?;

    let builder = GraphicsPipelineBuilder::new()
        .vertex_binding(Vertex::binding_description())
        .vertex_attributes(&Vertex::attribute_descriptions())
        .depth(true, true, CompareOp::LessOrEqual);

    let mut build_material = |fragment: &ShaderModule| -> RendererResult<Material> {
        let mut effect = ShaderEffect::new();
        effect.add_stage(&vertex)?;
        effect.add_stage(fragment)?;
        let pipeline_layout = effect.build_layout(device, layout_cache, &[], deletion)?;
        let pipeline = builder.build(device, &effect, render_pass, deletion)?;
        Ok(Material {
            pipeline,
            pipeline_layout,
            texture_set: None,
        })
    };

    let result = build_material(&default_lit).and_then(|untextured| {
        arena.add_material(DEFAULT_MATERIAL, untextured);
        match texture_set {
            Some(set) => {
                let textured = build_material(&textured_lit)?;
                arena.add_material(
                    TEXTURED_MATERIAL,
                    Material {
                        texture_set: Some(set),
                        ..textured
                    },
                );
            }
            None => warn!("No texture for '{}', material skipped", TEXTURED_MATERIAL),
        }
        Ok(())
    });

    // Pipelines keep what they need; the modules can go either way.
    vertex.destroy(device);
    default_lit.destroy(device);
    textured_lit.destroy(device);
    result
}
