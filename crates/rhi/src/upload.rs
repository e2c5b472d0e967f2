//! One-shot transfers to GPU-only memory.
//!
//! [`UploadContext`] owns a command pool, one command buffer and an
//! unsignaled fence. [`UploadContext::immediate_submit`] records a closure,
//! submits it and blocks until the GPU is done, so it is meant for load time,
//! not for the frame loop.
//!
//! Uploads go through a [`StagingBuffer`] that is destroyed as soon as the
//! copy has completed; only the destination is registered for deferred
//! destruction.

use ash::vk;
use tracing::{debug, warn};

use crate::buffer::{AllocatedBuffer, BufferUsage, StagingBuffer};
use crate::command::{CommandBuffer, allocate_primary, create_command_pool, reset_command_pool};
use crate::deletion::DeletionStack;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::{AllocatedImage, full_range};
use crate::sync::create_fence;

/// Command pool, command buffer and fence for blocking transfers.
pub struct UploadContext {
    fence: vk::Fence,
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    timeout_ns: u64,
}

impl UploadContext {
    /// Creates the context on the graphics queue family.
    pub fn new(device: &Device, timeout_ns: u64, deletion: &mut DeletionStack) -> RhiResult<Self> {
        let fence = create_fence(device, false, deletion)?;
        let command_pool = create_command_pool(
            device,
            device.graphics_family(),
            vk::CommandPoolCreateFlags::empty(),
            deletion,
        )?;
        let command_buffer = allocate_primary(device, command_pool)?;
        Ok(Self {
            fence,
            command_pool,
            command_buffer,
            timeout_ns,
        })
    }

    /// Records `record`, submits it and waits for completion.
    ///
    /// On return the fence is unsignaled again and the pool has been reset.
    pub fn immediate_submit<F>(&self, device: &Device, record: F) -> RhiResult<()>
    where
        F: FnOnce(&CommandBuffer<'_>),
    {
        let cmd = CommandBuffer::new(device, self.command_buffer);
        cmd.begin_one_time()?;
        record(&cmd);
        cmd.end()?;

        let command_buffers = [self.command_buffer];
        let submit = vk::SubmitInfo::default().command_buffers(&command_buffers);
        // SAFETY: the buffer was just recorded and the fence is unsignaled:
        // every previous submission was waited on and the fence reset.
        unsafe { device.submit_graphics(&[submit], self.fence)? };

        device.wait_for_fences(&[self.fence], self.timeout_ns)?;
        device.reset_fences(&[self.fence])?;
        reset_command_pool(device, self.command_pool)
    }

    /// Copies `bytes` into a new GPU-only buffer of the given usage.
    pub fn upload_buffer(
        &self,
        device: &Device,
        bytes: &[u8],
        usage: BufferUsage,
        name: &str,
        deletion: &mut DeletionStack,
    ) -> RhiResult<AllocatedBuffer> {
        let size = bytes.len() as vk::DeviceSize;
        let staging = StagingBuffer::with_data(device, bytes, name)?;
        let buffer = match AllocatedBuffer::create(device, size, usage, name, deletion) {
            Ok(buffer) => buffer,
            Err(e) => {
                staging.destroy(device);
                return Err(e);
            }
        };

        let result = self.immediate_submit(device, |cmd| {
            cmd.copy_buffer(staging.handle(), buffer.handle(), size);
        });
        release_staging(device, staging, &result);
        result?;

        debug!("Uploaded {} bytes to '{}'", size, name);
        Ok(buffer)
    }

    /// Uploads tightly packed RGBA8 pixels into a new sampled texture.
    ///
    /// The texture ends in SHADER_READ_ONLY_OPTIMAL.
    pub fn upload_image(
        &self,
        device: &Device,
        rgba: &[u8],
        width: u32,
        height: u32,
        name: &str,
        deletion: &mut DeletionStack,
    ) -> RhiResult<AllocatedImage> {
        let extent = vk::Extent3D {
            width,
            height,
            depth: 1,
        };
        let staging = StagingBuffer::with_data(device, rgba, name)?;
        let image = match AllocatedImage::create_texture(device, extent, name, deletion) {
            Ok(image) => image,
            Err(e) => {
                staging.destroy(device);
                return Err(e);
            }
        };

        let result = self.immediate_submit(device, |cmd| {
            let [to_transfer, to_shader] = layout_transitions(image.handle());
            cmd.image_barrier(
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
                &[to_transfer],
            );
            cmd.copy_buffer_to_image(staging.handle(), image.handle(), extent);
            cmd.image_barrier(
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                &[to_shader],
            );
        });
        release_staging(device, staging, &result);
        result?;

        debug!("Uploaded {}x{} texture '{}'", width, height, name);
        Ok(image)
    }
}

/// Destroys the staging buffer unless the transfer may still be reading it.
fn release_staging(device: &Device, staging: StagingBuffer, result: &RhiResult<()>) {
    if transfer_may_be_pending(result) {
        warn!(
            "Leaking {} byte staging buffer: its transfer did not finish in time",
            staging.size()
        );
        std::mem::forget(staging);
    } else {
        staging.destroy(device);
    }
}

/// A timed-out wait leaves the submission in flight.
fn transfer_may_be_pending(result: &RhiResult<()>) -> bool {
    matches!(result, Err(RhiError::Timeout(_)))
}

/// UNDEFINED -> TRANSFER_DST before the copy, then TRANSFER_DST ->
/// SHADER_READ_ONLY after it.
fn layout_transitions(image: vk::Image) -> [vk::ImageMemoryBarrier<'static>; 2] {
    let range = full_range(vk::ImageAspectFlags::COLOR);
    [
        vk::ImageMemoryBarrier::default()
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(range)
            .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE),
        vk::ImageMemoryBarrier::default()
            .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(range)
            .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .dst_access_mask(vk::AccessFlags::SHADER_READ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_layout_transitions_chain() {
        let image = vk::Image::from_raw(7);
        let [first, second] = layout_transitions(image);
        assert_eq!(first.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(first.new_layout, second.old_layout);
        assert_eq!(second.new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(first.image, image);
        assert_eq!(second.src_access_mask, first.dst_access_mask);
    }

    #[test]
    fn test_only_a_timed_out_transfer_keeps_its_staging_buffer() {
        assert!(transfer_may_be_pending(&Err(RhiError::Timeout("fence"))));
        assert!(!transfer_may_be_pending(&Ok(())));
        assert!(!transfer_may_be_pending(&Err(RhiError::VulkanError(
            vk::Result::ERROR_DEVICE_LOST
        ))));
    }
}
