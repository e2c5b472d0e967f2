//! Error types shared across the engine.

use thiserror::Error;

/// Errors raised below the Vulkan layer: windowing, surfaces and configuration.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Window error: {0}")]
    Window(String),

    /// The window system could not provide a Vulkan surface or its extensions
    #[error("Surface error: {0}")]
    Surface(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or out-of-range configuration
    #[error("Config error: {0}")]
    Config(String),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

/// Result type alias using the engine's Error type.
pub type Result<T> = std::result::Result<T, Error>;
