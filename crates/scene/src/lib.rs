//! Scene-side collaborators of the renderer.
//!
//! This crate provides:
//! - A first-person fly camera
//! - An explicitly seeded random number generator
//! - The demo scene description

pub mod camera;
pub mod demo;
pub mod rng;

pub use camera::PlayerCamera;
pub use demo::{DemoScene, ObjectDesc};
pub use rng::Rng;
