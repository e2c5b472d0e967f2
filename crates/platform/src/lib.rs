//! Platform layer.
//!
//! This crate provides:
//! - Window management via winit
//! - Vulkan surface creation via ash-window
//! - Polled keyboard and pointer input

mod input;
mod window;

pub use input::{InputState, KeyCode, MouseButton};
pub use window::{Surface, Window};

// Re-export winit types the app needs
pub use winit::event::{DeviceEvent, ElementState, WindowEvent};
pub use winit::event_loop::{ActiveEventLoop, EventLoop};
