//! Deferred destruction of GPU objects.
//!
//! # Overview
//!
//! Every long-lived Vulkan object is registered with a [`DeletionStack`] at
//! creation time as a [`Disposal`] record: the resource kind plus the native
//! handles needed to destroy it. [`DeletionStack::flush`] destroys the records
//! in strict reverse order of registration, so an object is always destroyed
//! after everything that was built on top of it.
//!
//! The records are plain data, which makes the order auditable without a
//! device: [`DeletionStack::kinds`] lists what is registered and
//! [`DeletionStack::drain_reversed`] yields records in destruction order.
//!
//! # Example
//!
//! ```no_run
//! use engine_rhi::deletion::{DeletionStack, Disposal};
//! use engine_rhi::vk;
//!
//! # fn example(device: &engine_rhi::device::Device, pool: vk::CommandPool, fence: vk::Fence) {
//! let mut stack = DeletionStack::new("main");
//! stack.push(Disposal::CommandPool(pool));
//! stack.push(Disposal::Fence(fence));
//! // fence first, then the pool
//! stack.flush(device);
//! # }
//! ```

use ash::vk;
use gpu_allocator::vulkan::Allocation;
use tracing::{debug, error, warn};

use crate::device::Device;

/// Discriminant of a [`Disposal`], used for auditing the stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DisposalKind {
    Buffer,
    Image,
    ImageView,
    Sampler,
    Framebuffer,
    RenderPass,
    Pipeline,
    PipelineLayout,
    DescriptorSetLayout,
    DescriptorPool,
    CommandPool,
    Fence,
    Semaphore,
    Swapchain,
}

/// A GPU object waiting to be destroyed, with everything needed to do so.
pub enum Disposal {
    Buffer {
        buffer: vk::Buffer,
        allocation: Allocation,
    },
    Image {
        image: vk::Image,
        allocation: Allocation,
    },
    ImageView(vk::ImageView),
    Sampler(vk::Sampler),
    Framebuffer(vk::Framebuffer),
    RenderPass(vk::RenderPass),
    Pipeline(vk::Pipeline),
    PipelineLayout(vk::PipelineLayout),
    DescriptorSetLayout(vk::DescriptorSetLayout),
    DescriptorPool(vk::DescriptorPool),
    CommandPool(vk::CommandPool),
    Fence(vk::Fence),
    Semaphore(vk::Semaphore),
    Swapchain {
        loader: ash::khr::swapchain::Device,
        swapchain: vk::SwapchainKHR,
    },
}

impl Disposal {
    /// The kind of resource this record destroys.
    pub fn kind(&self) -> DisposalKind {
        match self {
            Disposal::Buffer { .. } => DisposalKind::Buffer,
            Disposal::Image { .. } => DisposalKind::Image,
            Disposal::ImageView(_) => DisposalKind::ImageView,
            Disposal::Sampler(_) => DisposalKind::Sampler,
            Disposal::Framebuffer(_) => DisposalKind::Framebuffer,
            Disposal::RenderPass(_) => DisposalKind::RenderPass,
            Disposal::Pipeline(_) => DisposalKind::Pipeline,
            Disposal::PipelineLayout(_) => DisposalKind::PipelineLayout,
            Disposal::DescriptorSetLayout(_) => DisposalKind::DescriptorSetLayout,
            Disposal::DescriptorPool(_) => DisposalKind::DescriptorPool,
            Disposal::CommandPool(_) => DisposalKind::CommandPool,
            Disposal::Fence(_) => DisposalKind::Fence,
            Disposal::Semaphore(_) => DisposalKind::Semaphore,
            Disposal::Swapchain { .. } => DisposalKind::Swapchain,
        }
    }

    /// Destroys the resource.
    ///
    /// The caller guarantees the GPU no longer uses it.
    pub fn destroy(self, device: &Device) {
        let raw = device.handle();
        // SAFETY: each handle was created from `device` and is destroyed exactly
        // once, since the record is consumed here.
        unsafe {
            match self {
                Disposal::Buffer { buffer, allocation } => {
                    free_allocation(device, allocation);
                    raw.destroy_buffer(buffer, None);
                }
                Disposal::Image { image, allocation } => {
                    free_allocation(device, allocation);
                    raw.destroy_image(image, None);
                }
                Disposal::ImageView(view) => raw.destroy_image_view(view, None),
                Disposal::Sampler(sampler) => raw.destroy_sampler(sampler, None),
                Disposal::Framebuffer(fb) => raw.destroy_framebuffer(fb, None),
                Disposal::RenderPass(pass) => raw.destroy_render_pass(pass, None),
                Disposal::Pipeline(pipeline) => raw.destroy_pipeline(pipeline, None),
                Disposal::PipelineLayout(layout) => raw.destroy_pipeline_layout(layout, None),
                Disposal::DescriptorSetLayout(layout) => {
                    raw.destroy_descriptor_set_layout(layout, None)
                }
                Disposal::DescriptorPool(pool) => raw.destroy_descriptor_pool(pool, None),
                Disposal::CommandPool(pool) => raw.destroy_command_pool(pool, None),
                Disposal::Fence(fence) => raw.destroy_fence(fence, None),
                Disposal::Semaphore(semaphore) => raw.destroy_semaphore(semaphore, None),
                Disposal::Swapchain { loader, swapchain } => {
                    loader.destroy_swapchain(swapchain, None)
                }
            }
        }
    }
}

impl std::fmt::Debug for Disposal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Disposal").field(&self.kind()).finish()
    }
}

fn free_allocation(device: &Device, allocation: Allocation) {
    match device.lock_allocator() {
        Ok(mut allocator) => {
            if let Err(e) = allocator.free(allocation) {
                error!("Failed to free allocation: {}", e);
            }
        }
        Err(e) => error!("Leaking allocation: {}", e),
    }
}

/// LIFO registry of [`Disposal`] records.
#[derive(Debug)]
pub struct DeletionStack {
    name: &'static str,
    records: Vec<Disposal>,
}

impl DeletionStack {
    /// Creates an empty stack. `name` only appears in log output.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            records: Vec::new(),
        }
    }

    /// Registers a resource for later destruction.
    pub fn push(&mut self, disposal: Disposal) {
        self.records.push(disposal);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Kinds of the registered records, in registration order.
    pub fn kinds(&self) -> Vec<DisposalKind> {
        self.records.iter().map(Disposal::kind).collect()
    }

    /// Removes every record, yielding them in destruction order.
    pub fn drain_reversed(&mut self) -> impl Iterator<Item = Disposal> + '_ {
        self.records.drain(..).rev()
    }

    /// Destroys every registered resource, most recent first.
    pub fn flush(&mut self, device: &Device) {
        let count = self.records.len();
        for disposal in self.drain_reversed() {
            disposal.destroy(device);
        }
        debug!("Flushed {} deletion stack ({} objects)", self.name, count);
    }
}

impl Drop for DeletionStack {
    fn drop(&mut self) {
        if !self.records.is_empty() {
            warn!(
                "{} deletion stack dropped with {} unflushed objects",
                self.name,
                self.records.len()
            );
        }
    }
}
