#![forbid(unsafe_code)]

pub mod clock;
pub mod composite;
pub mod config;
pub mod core;
pub mod effect;
pub mod error;
pub mod host;
pub mod mask;
pub mod noise;
pub mod surface;
pub mod text;

pub use config::{EffectConfig, EffectOptions, FontWeight, ValidationMode};
pub use crate::core::{PremulRgba8, Raster, SurfaceDescriptor};
pub use effect::Effect;
pub use error::{EffectError, EffectResult};
pub use host::{FrameHandle, FrameScheduler, HostEnv, MonotonicClock};
pub use mask::{Mask, MaskBuilder};
pub use noise::NoiseField;
pub use surface::{SurfaceHandle, SurfaceManager};
pub use text::TextRasterizer;
