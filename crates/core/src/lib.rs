//! Core utilities for the engine.
//!
//! This crate provides foundational types shared by every other crate:
//! - Error types and result aliases
//! - Logging initialization
//! - Frame timing and the fixed-step accumulator
//! - Engine configuration loaded from TOML

mod config;
mod error;
mod logging;
mod timer;

pub use config::{EngineConfig, WindowConfig};
pub use error::{Error, Result};
pub use logging::{init_logging, init_logging_with_filter};
pub use timer::{FixedTimestep, Timer};
