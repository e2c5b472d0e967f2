//! GPU buffer allocation.
//!
//! # Overview
//!
//! - [`BufferUsage`] picks Vulkan usage flags and a memory location.
//! - [`AllocatedBuffer`] is a buffer handle plus its size and (for
//!   host-visible memory) its persistent mapping. It has no `Drop`: its
//!   memory is registered with a [`DeletionStack`] at creation and released
//!   when that stack is flushed.
//! - [`StagingBuffer`] is the one exception. It owns its allocation and is
//!   destroyed synchronously once its transfer has completed.
//!
//! # Example
//!
//! ```no_run
//! use engine_rhi::buffer::{AllocatedBuffer, BufferUsage};
//! use engine_rhi::deletion::DeletionStack;
//!
//! # fn example(device: &engine_rhi::device::Device) -> engine_rhi::RhiResult<()> {
//! let mut deletion = DeletionStack::new("main");
//! let camera = AllocatedBuffer::create(device, 256, BufferUsage::Uniform, "camera", &mut deletion)?;
//! let info = camera.build_info(0, 64);
//! # let _ = info;
//! # deletion.flush(device);
//! # Ok(())
//! # }
//! ```

use std::ptr::NonNull;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::debug;

use crate::deletion::{DeletionStack, Disposal};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Buffer usage type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Device-local vertex data, filled through a staging copy
    Vertex,
    /// Host-visible transfer source
    Staging,
    /// Host-visible uniform data rewritten every frame
    Uniform,
    /// Host-visible storage data rewritten every frame
    Storage,
    /// Host-visible indirect draw commands, also readable as storage
    Indirect,
}

impl BufferUsage {
    /// Converts to Vulkan buffer usage flags.
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Vertex => {
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
            BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferUsage::Storage => vk::BufferUsageFlags::STORAGE_BUFFER,
            BufferUsage::Indirect => {
                vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::INDIRECT_BUFFER
            }
        }
    }

    /// Returns the memory location for this buffer type.
    pub fn memory_location(self) -> MemoryLocation {
        match self {
            BufferUsage::Vertex => MemoryLocation::GpuOnly,
            BufferUsage::Staging
            | BufferUsage::Uniform
            | BufferUsage::Storage
            | BufferUsage::Indirect => MemoryLocation::CpuToGpu,
        }
    }

    /// Whether memory of this usage is mapped for CPU writes.
    #[inline]
    pub fn is_host_visible(self) -> bool {
        self.memory_location() != MemoryLocation::GpuOnly
    }
}

/// A GPU buffer whose memory is owned by a [`DeletionStack`].
#[derive(Debug)]
pub struct AllocatedBuffer {
    buffer: vk::Buffer,
    size: vk::DeviceSize,
    mapped: Option<NonNull<u8>>,
}

// SAFETY: the mapping pointer refers to host-visible device memory that stays
// mapped until the owning disposal record is destroyed; access is externally
// synchronized by the single frame-loop thread.
unsafe impl Send for AllocatedBuffer {}

impl AllocatedBuffer {
    /// Creates a buffer and registers its destruction with `deletion`.
    ///
    /// # Errors
    ///
    /// Returns an error if `size` is zero or buffer/memory creation fails.
    pub fn create(
        device: &Device,
        size: vk::DeviceSize,
        usage: BufferUsage,
        name: &str,
        deletion: &mut DeletionStack,
    ) -> RhiResult<Self> {
        let (buffer, allocation) = allocate(device, size, usage, name)?;
        deletion.push(Disposal::Buffer {
            buffer: buffer.buffer,
            allocation,
        });
        Ok(buffer)
    }

    /// Returns the Vulkan buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Returns the requested size in bytes.
    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Descriptor info for a region of this buffer.
    pub fn build_info(&self, offset: vk::DeviceSize, range: vk::DeviceSize) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo::default()
            .buffer(self.buffer)
            .offset(offset)
            .range(range)
    }

    /// The mapped contents, or `None` for device-local memory.
    pub fn mapped_bytes(&self) -> Option<&[u8]> {
        // SAFETY: the mapping covers at least `size` bytes and lives as long
        // as the allocation, which is only freed by flushing the deletion stack.
        self.mapped
            .map(|ptr| unsafe { std::slice::from_raw_parts(ptr.as_ptr(), self.size as usize) })
    }

    /// Mutable view of the mapped contents.
    pub fn mapped_bytes_mut(&mut self) -> Option<&mut [u8]> {
        // SAFETY: as above; the buffer is not Clone, so `&mut self` is unique.
        self.mapped
            .map(|ptr| unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), self.size as usize) })
    }
}

/// A host-visible transfer source destroyed right after its copy completes.
pub struct StagingBuffer {
    buffer: AllocatedBuffer,
    allocation: Allocation,
}

impl StagingBuffer {
    /// Creates a staging buffer holding a copy of `data`.
    pub fn with_data(device: &Device, data: &[u8], name: &str) -> RhiResult<Self> {
        let (mut buffer, allocation) =
            allocate(device, data.len() as vk::DeviceSize, BufferUsage::Staging, name)?;
        let dst = buffer
            .mapped_bytes_mut()
            .ok_or_else(|| RhiError::InvalidHandle("staging memory is not mapped".into()))?;
        dst.copy_from_slice(data);
        Ok(Self { buffer, allocation })
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.buffer.size()
    }

    /// Frees the memory and destroys the buffer immediately.
    ///
    /// The transfer reading from this buffer must have completed.
    pub fn destroy(self, device: &Device) {
        Disposal::Buffer {
            buffer: self.buffer.handle(),
            allocation: self.allocation,
        }
        .destroy(device);
    }
}

fn allocate(
    device: &Device,
    size: vk::DeviceSize,
    usage: BufferUsage,
    name: &str,
) -> RhiResult<(AllocatedBuffer, Allocation)> {
    if size == 0 {
        return Err(RhiError::InvalidHandle(format!(
            "buffer '{}' must be larger than 0 bytes",
            name
        )));
    }

    let buffer_info = vk::BufferCreateInfo::default()
        .size(size)
        .usage(usage.to_vk_usage())
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    let raw = device.handle();
    let buffer = unsafe { raw.create_buffer(&buffer_info, None)? };
    let requirements = unsafe { raw.get_buffer_memory_requirements(buffer) };

    let allocation = device.lock_allocator().and_then(|mut allocator| {
        allocator
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location: usage.memory_location(),
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(RhiError::from)
    });
    let allocation = match allocation {
        Ok(allocation) => allocation,
        Err(e) => {
            unsafe { raw.destroy_buffer(buffer, None) };
            return Err(e);
        }
    };

    if let Err(e) = unsafe { raw.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) }
    {
        Disposal::Buffer { buffer, allocation }.destroy(device);
        return Err(e.into());
    }

    let mapped = if usage.is_host_visible() {
        allocation.mapped_ptr().map(|ptr| ptr.cast::<u8>())
    } else {
        None
    };

    debug!("Created buffer '{}' ({:?}, {} bytes)", name, usage, size);

    Ok((
        AllocatedBuffer {
            buffer,
            size,
            mapped,
        },
        allocation,
    ))
}
