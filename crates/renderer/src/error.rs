//! Renderer error types.

use thiserror::Error;

use engine_resources::ResourceError;
use engine_rhi::RhiError;

/// Errors surfaced by the engine driver.
#[derive(Error, Debug)]
pub enum RendererError {
    /// A Vulkan layer failure; timeouts and device loss land here
    #[error(transparent)]
    Rhi(#[from] RhiError),

    /// Mesh or texture loading failed
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Window, surface or configuration failure
    #[error(transparent)]
    Core(#[from] engine_core::Error),

    #[error("Unknown mesh '{0}'")]
    UnknownMesh(String),

    #[error("Unknown material '{0}'")]
    UnknownMaterial(String),

    /// A descriptor set the engine cannot run without failed to allocate
    #[error("Descriptor allocation failed for {0}")]
    DescriptorAllocation(&'static str),
}

/// Result type alias for renderer operations.
pub type RendererResult<T> = std::result::Result<T, RendererError>;
