//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate wraps Vulkan through `ash`. It handles:
//! - Instance, physical device and logical device creation
//! - Swapchain acquisition and presentation
//! - Command buffer recording and synchronization primitives
//! - Buffers, sub-allocated write buffers, images and one-shot uploads
//! - Descriptor pools, cached set layouts and set building
//! - Shader effects, render passes and graphics pipelines
//! - Deferred destruction through a deletion stack

mod error;

pub mod buffer;
pub mod command;
pub mod deletion;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod upload;
pub mod vertex;
pub mod write_buffer;

pub use error::{RhiError, RhiResult};
pub use write_buffer::BufferMisuse;

// Re-export ash types that users might need
pub use ash::vk;
