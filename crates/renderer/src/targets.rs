//! Swapchain-dependent render targets.
//!
//! Everything whose size or count follows the swapchain lives here: the
//! swapchain and its views, the depth image, the render pass, one
//! framebuffer per image and one command pool per ring slot. All of it is
//! registered with a dedicated deletion stack so a resize can tear it down
//! in one flush and build it again.

use ash::vk;
use tracing::{debug, info, warn};

use engine_rhi::RhiResult;
use engine_rhi::command::{allocate_primary, create_command_pool};
use engine_rhi::deletion::DeletionStack;
use engine_rhi::device::Device;
use engine_rhi::image::AllocatedImage;
use engine_rhi::instance::Instance;
use engine_rhi::render_pass::{create_framebuffers, create_render_pass};
use engine_rhi::swapchain::Swapchain;

/// Handles built for one swapchain generation.
struct Generation {
    swapchain: Swapchain,
    depth_image: AllocatedImage,
    render_pass: vk::RenderPass,
    framebuffers: Vec<vk::Framebuffer>,
    command_buffers: Vec<vk::CommandBuffer>,
}

/// The swapchain and everything rebuilt with it.
pub struct RenderTargets {
    current: Generation,
    ring_depth: usize,
    deletion: DeletionStack,
}

impl RenderTargets {
    /// Builds the targets for a window of `extent`.
    pub fn new(
        instance: &Instance,
        device: &Device,
        surface: vk::SurfaceKHR,
        extent: vk::Extent2D,
        ring_depth: usize,
    ) -> RhiResult<Self> {
        let mut deletion = DeletionStack::new("swapchain");
        let current = build(instance, device, surface, extent, ring_depth, &mut deletion)
            .inspect_err(|_| deletion.flush(device))?;
        Ok(Self {
            current,
            ring_depth,
            deletion,
        })
    }

    /// Tears everything down and builds it again for `extent`.
    ///
    /// Returns `Ok(false)` without touching anything while `extent` is zero
    /// (a minimized window); the caller retries once it has a size.
    pub fn recreate(
        &mut self,
        instance: &Instance,
        device: &Device,
        surface: vk::SurfaceKHR,
        extent: vk::Extent2D,
    ) -> RhiResult<bool> {
        if extent.width == 0 || extent.height == 0 {
            debug!("Window has no area, deferring swapchain recreation");
            return Ok(false);
        }

        device.wait_idle()?;
        let old_format = self.current.swapchain.format();
        self.deletion.flush(device);

        self.current = build(
            instance,
            device,
            surface,
            extent,
            self.ring_depth,
            &mut self.deletion,
        )
        .inspect_err(|_| self.deletion.flush(device))?;

        if self.current.swapchain.format() != old_format {
            // pipelines were built against a render pass of the old format
            warn!(
                "Swapchain format changed from {:?} to {:?}",
                old_format,
                self.current.swapchain.format()
            );
        }
        info!(
            "Swapchain recreated: {}x{}",
            self.extent().width,
            self.extent().height
        );
        Ok(true)
    }

    /// Destroys every target. The device must be idle.
    pub fn destroy(&mut self, device: &Device) {
        self.deletion.flush(device);
    }

    #[inline]
    pub fn swapchain(&self) -> &Swapchain {
        &self.current.swapchain
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.current.swapchain.extent()
    }

    #[inline]
    pub fn render_pass(&self) -> vk::RenderPass {
        self.current.render_pass
    }

    #[inline]
    pub fn depth_image(&self) -> &AllocatedImage {
        &self.current.depth_image
    }

    /// Framebuffer wrapping swapchain image `image_index`.
    pub fn framebuffer(&self, image_index: u32) -> Option<vk::Framebuffer> {
        self.current.framebuffers.get(image_index as usize).copied()
    }

    /// Primary command buffer of ring slot `slot`, from a pool of its own.
    pub fn command_buffer(&self, slot: usize) -> Option<vk::CommandBuffer> {
        self.current.command_buffers.get(slot).copied()
    }
}

fn build(
    instance: &Instance,
    device: &Device,
    surface: vk::SurfaceKHR,
    extent: vk::Extent2D,
    ring_depth: usize,
    deletion: &mut DeletionStack,
) -> RhiResult<Generation> {
    let swapchain = Swapchain::create(
        instance,
        device,
        surface,
        extent.width,
        extent.height,
        deletion,
    )?;
    let depth_image = AllocatedImage::create_depth(device, swapchain.extent(), deletion)?;
    let render_pass = create_render_pass(device, swapchain.format(), deletion)?;
    let framebuffers = create_framebuffers(
        device,
        render_pass,
        swapchain.image_views(),
        depth_image.view(),
        swapchain.extent(),
        deletion,
    )?;

    let mut command_buffers = Vec::with_capacity(ring_depth);
    for _ in 0..ring_depth {
        let pool = create_command_pool(
            device,
            device.graphics_family(),
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            deletion,
        )?;
        command_buffers.push(allocate_primary(device, pool)?);
    }

    debug!(
        "Render targets built: {} images, {} command pools",
        swapchain.image_count(),
        command_buffers.len()
    );

    Ok(Generation {
        swapchain,
        depth_image,
        render_pass,
        framebuffers,
        command_buffers,
    })
}
