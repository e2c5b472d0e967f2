//! Errors raised by the Vulkan layer.

use thiserror::Error;

/// Failures of the RHI crate.
///
/// Raw Vulkan results, loader and allocator errors convert through `?`.
#[derive(Error, Debug)]
pub enum RhiError {
    #[error("Vulkan call failed: {0}")]
    VulkanError(#[from] ash::vk::Result),

    #[error("Could not load the Vulkan library: {0}")]
    LoadingError(#[from] ash::LoadingError),

    #[error("GPU memory allocation failed: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// No device offers graphics, present and the swapchain extension
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// Unreadable or invalid SPIR-V
    #[error("Shader error: {0}")]
    ShaderError(String),

    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// A lookup by index or slot found nothing
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// A bounded GPU wait expired. The device is most likely lost.
    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    /// Two shader stages declared different resources at the same slot.
    #[error("Conflicting descriptor declarations at set {set}, binding {binding}")]
    BindingConflict { set: u32, binding: u32 },

    /// A thread panicked while holding the allocator lock.
    #[error("GPU allocator lock poisoned")]
    AllocatorPoisoned,

    /// Descriptor set allocation failed even after a fresh pool was tried.
    #[error("Descriptor set allocation failed: {0}")]
    DescriptorAllocation(ash::vk::Result),
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
