//! Asset loading.
//!
//! This crate turns files into CPU-side data the renderer uploads:
//! - OBJ meshes through `tobj`, flattened into vertex lists
//! - Textures through `image`, decoded to RGBA8

mod error;

pub mod mesh;
pub mod texture;

pub use error::{ResourceError, ResourceResult};
pub use mesh::MeshData;
pub use texture::TextureData;
