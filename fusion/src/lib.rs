//! Spatial input fusion and gesture recognition for hand-driven XR controls.

pub mod config;
pub mod xr;

pub use config::{ConfigError, FusionConfig};
