//! Synchronization primitives.
//!
//! Fences and semaphores are plain handles. Their destruction is registered
//! with a [`DeletionStack`] at creation, like every other long-lived object.
//!
//! - A **fence** lets the CPU wait for GPU work. Ring slot fences are created
//!   signaled so the first wait on each slot returns immediately.
//! - A **semaphore** orders work between queue operations (acquire, render,
//!   present) without involving the CPU.

use ash::vk;
use tracing::debug;

use crate::deletion::{DeletionStack, Disposal};
use crate::device::Device;
use crate::error::RhiResult;

/// Creates a fence, optionally already signaled.
pub fn create_fence(
    device: &Device,
    signaled: bool,
    deletion: &mut DeletionStack,
) -> RhiResult<vk::Fence> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };
    let info = vk::FenceCreateInfo::default().flags(flags);
    let fence = unsafe { device.handle().create_fence(&info, None)? };
    deletion.push(Disposal::Fence(fence));
    debug!("Fence created (signaled: {})", signaled);
    Ok(fence)
}

/// Creates a binary semaphore.
pub fn create_semaphore(device: &Device, deletion: &mut DeletionStack) -> RhiResult<vk::Semaphore> {
    let info = vk::SemaphoreCreateInfo::default();
    let semaphore = unsafe { device.handle().create_semaphore(&info, None)? };
    deletion.push(Disposal::Semaphore(semaphore));
    Ok(semaphore)
}

/// Non-blocking check of a fence.
pub fn is_signaled(device: &Device, fence: vk::Fence) -> RhiResult<bool> {
    Ok(unsafe { device.handle().get_fence_status(fence)? })
}
