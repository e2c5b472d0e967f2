//! Engine configuration.
//!
//! Every field has a default, so an empty TOML document (or no file at all)
//! yields a working configuration. Only the keys that differ need to be
//! written:
//!
//! ```toml
//! frame_overlap = 3
//! seed = 42
//!
//! [window]
//! width = 1280
//! height = 720
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Window settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1700,
            height: 900,
            title: "Vulkan Engine".to_string(),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub window: WindowConfig,
    /// Number of ring slots, i.e. how many frames may be in flight at once.
    pub frame_overlap: usize,
    /// Capacity of the per-frame object storage buffer, in objects.
    pub max_objects: usize,
    /// Capacity of the per-frame indirect command buffer, in commands.
    pub max_commands: usize,
    /// Descriptor sets per pool; per-type sizes are weights times this.
    pub descriptor_pool_batch: u32,
    /// Timeout for fence and acquire waits, in nanoseconds.
    pub gpu_timeout_ns: u64,
    pub fixed_update_hz: u32,
    pub enable_validation: bool,
    /// Overrides the default tracing directive when `RUST_LOG` is unset.
    pub log_filter: Option<String>,
    pub assets_dir: PathBuf,
    /// Seed for scene randomization.
    pub seed: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            frame_overlap: 2,
            max_objects: 10_000,
            max_commands: 10_000,
            descriptor_pool_batch: 1000,
            gpu_timeout_ns: 1_000_000_000,
            fixed_update_hz: 60,
            enable_validation: cfg!(debug_assertions),
            log_filter: None,
            assets_dir: PathBuf::from("assets"),
            seed: 0x5EED,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from a TOML string and validate it.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not valid TOML, or
    /// fails validation.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&source)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load a configuration file, falling back to defaults if it does not exist.
    ///
    /// A file that exists but cannot be parsed is still an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No configuration at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Check value ranges that the type system does not enforce.
    pub fn validate(&self) -> Result<()> {
        if self.frame_overlap == 0 {
            return Err(Error::Config("frame_overlap must be at least 1".into()));
        }
        if self.max_objects == 0 || self.max_commands == 0 {
            return Err(Error::Config(
                "max_objects and max_commands must be non-zero".into(),
            ));
        }
        if self.descriptor_pool_batch == 0 {
            return Err(Error::Config("descriptor_pool_batch must be non-zero".into()));
        }
        if self.gpu_timeout_ns == 0 {
            return Err(Error::Config("gpu_timeout_ns must be non-zero".into()));
        }
        Ok(())
    }

    /// Resolve a path relative to the assets directory.
    pub fn asset_path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.assets_dir.join(relative)
    }
}
