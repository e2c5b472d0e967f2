//! Frame orchestration and draw submission.
//!
//! This crate drives the rendering of each frame:
//! - Frame ring scheduling and swapchain recreation
//! - Per-frame camera, scene and object data
//! - Handle-based mesh and material storage
//! - Compaction of the render list into indirect draw batches

mod error;

pub mod arena;
pub mod batch;
pub mod engine;
pub mod frame_ring;
pub mod gpu_data;
pub mod targets;

pub use arena::{MaterialHandle, MeshHandle, RenderObject, ResourceArena};
pub use batch::{IndirectBatch, compact_draws};
pub use engine::Engine;
pub use error::{RendererError, RendererResult};
pub use frame_ring::{FrameOutcome, FrameRing};
