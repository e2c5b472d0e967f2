//! Command pools and command buffer recording.
//!
//! # Overview
//!
//! - [`create_command_pool`] creates a pool and registers it for deferred
//!   destruction; command buffers are freed along with their pool.
//! - [`CommandBuffer`] borrows the device and wraps one handle with the
//!   recording calls the frame loop and the upload path use.
//!
//! # Example
//!
//! ```no_run
//! use engine_rhi::command::{CommandBuffer, allocate_primary, create_command_pool};
//! use engine_rhi::deletion::DeletionStack;
//! use engine_rhi::vk;
//!
//! # fn example(device: &engine_rhi::device::Device) -> engine_rhi::RhiResult<()> {
//! let mut deletion = DeletionStack::new("main");
//! let pool = create_command_pool(
//!     device,
//!     device.graphics_family(),
//!     vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
//!     &mut deletion,
//! )?;
//! let cmd = CommandBuffer::new(device, allocate_primary(device, pool)?);
//! cmd.begin_one_time()?;
//! cmd.end()?;
//! # Ok(())
//! # }
//! ```

use ash::vk;
use tracing::debug;

use crate::deletion::{DeletionStack, Disposal};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Creates a command pool for `queue_family`.
pub fn create_command_pool(
    device: &Device,
    queue_family: u32,
    flags: vk::CommandPoolCreateFlags,
    deletion: &mut DeletionStack,
) -> RhiResult<vk::CommandPool> {
    let info = vk::CommandPoolCreateInfo::default()
        .queue_family_index(queue_family)
        .flags(flags);
    let pool = unsafe { device.handle().create_command_pool(&info, None)? };
    deletion.push(Disposal::CommandPool(pool));
    debug!("Command pool created for queue family {}", queue_family);
    Ok(pool)
}

/// Allocates one primary command buffer from `pool`.
pub fn allocate_primary(device: &Device, pool: vk::CommandPool) -> RhiResult<vk::CommandBuffer> {
    let info = vk::CommandBufferAllocateInfo::default()
        .command_pool(pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);
    let buffers = unsafe { device.handle().allocate_command_buffers(&info)? };
    buffers
        .into_iter()
        .next()
        .ok_or_else(|| RhiError::InvalidHandle("no command buffer allocated".into()))
}

/// Resets every command buffer allocated from `pool`.
pub fn reset_command_pool(device: &Device, pool: vk::CommandPool) -> RhiResult<()> {
    unsafe {
        device
            .handle()
            .reset_command_pool(pool, vk::CommandPoolResetFlags::empty())?;
    }
    Ok(())
}

/// Recording wrapper around a command buffer handle.
///
/// The handle is owned by its pool; this type never frees it.
#[derive(Clone, Copy)]
pub struct CommandBuffer<'a> {
    device: &'a Device,
    buffer: vk::CommandBuffer,
}

impl<'a> CommandBuffer<'a> {
    #[inline]
    pub fn new(device: &'a Device, buffer: vk::CommandBuffer) -> Self {
        Self { device, buffer }
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    // =========================================================================
    // Recording Control
    // =========================================================================

    /// Resets the buffer so it can be re-recorded.
    pub fn reset(&self) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .reset_command_buffer(self.buffer, vk::CommandBufferResetFlags::empty())?;
        }
        Ok(())
    }

    /// Begins recording for a single submission.
    pub fn begin_one_time(&self) -> RhiResult<()> {
        let info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device
                .handle()
                .begin_command_buffer(self.buffer, &info)?;
        }
        Ok(())
    }

    pub fn end(&self) -> RhiResult<()> {
        unsafe { self.device.handle().end_command_buffer(self.buffer)? };
        Ok(())
    }

    // =========================================================================
    // Render Pass
    // =========================================================================

    /// Begins `render_pass` on `framebuffer`, clearing with `clear_values`.
    pub fn begin_render_pass(
        &self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_values: &[vk::ClearValue],
    ) {
        let info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(clear_values);
        unsafe {
            self.device
                .handle()
                .cmd_begin_render_pass(self.buffer, &info, vk::SubpassContents::INLINE);
        }
    }

    pub fn end_render_pass(&self) {
        unsafe { self.device.handle().cmd_end_render_pass(self.buffer) };
    }

    /// Sets a full-extent viewport and scissor.
    pub fn set_viewport_and_scissor(&self, extent: vk::Extent2D) {
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        unsafe {
            let raw = self.device.handle();
            raw.cmd_set_viewport(self.buffer, 0, &[viewport]);
            raw.cmd_set_scissor(self.buffer, 0, &[scissor]);
        }
    }

    // =========================================================================
    // Binding
    // =========================================================================

    pub fn bind_graphics_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe {
            self.device.handle().cmd_bind_pipeline(
                self.buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline,
            );
        }
    }

    /// Binds graphics descriptor sets starting at `first_set`.
    ///
    /// `dynamic_offsets` supplies one offset per dynamic descriptor, in
    /// binding order across the bound sets.
    pub fn bind_descriptor_sets(
        &self,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    ) {
        unsafe {
            self.device.handle().cmd_bind_descriptor_sets(
                self.buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                first_set,
                sets,
                dynamic_offsets,
            );
        }
    }

    pub fn bind_vertex_buffer(&self, buffer: vk::Buffer) {
        unsafe {
            self.device
                .handle()
                .cmd_bind_vertex_buffers(self.buffer, 0, &[buffer], &[0]);
        }
    }

    // =========================================================================
    // Draw Commands
    // =========================================================================

    /// Issues `draw_count` draws whose parameters are read from `buffer`.
    pub fn draw_indirect(
        &self,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        draw_count: u32,
        stride: u32,
    ) {
        unsafe {
            self.device
                .handle()
                .cmd_draw_indirect(self.buffer, buffer, offset, draw_count, stride);
        }
    }

    // =========================================================================
    // Transfer
    // =========================================================================

    pub fn copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize) {
        let region = vk::BufferCopy::default().size(size);
        unsafe {
            self.device
                .handle()
                .cmd_copy_buffer(self.buffer, src, dst, &[region]);
        }
    }

    /// Copies a tightly packed buffer into mip 0 of a color image.
    pub fn copy_buffer_to_image(&self, src: vk::Buffer, dst: vk::Image, extent: vk::Extent3D) {
        let region = vk::BufferImageCopy::default()
            .image_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .layer_count(1),
            )
            .image_extent(extent);
        unsafe {
            self.device.handle().cmd_copy_buffer_to_image(
                self.buffer,
                src,
                dst,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }
    }

    /// Inserts a pipeline barrier with image barriers only.
    pub fn image_barrier(
        &self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        barriers: &[vk::ImageMemoryBarrier<'_>],
    ) {
        unsafe {
            self.device.handle().cmd_pipeline_barrier(
                self.buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                barriers,
            );
        }
    }
}
