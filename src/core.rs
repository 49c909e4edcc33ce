use crate::error::{EffectError, EffectResult};

/// Premultiplied RGBA8 pixel.
pub type PremulRgba8 = [u8; 4];

pub const TRANSPARENT: PremulRgba8 = [0, 0, 0, 0];
pub const BLACK: PremulRgba8 = [0, 0, 0, 255];
pub const WHITE: PremulRgba8 = [255, 255, 255, 255];

/// Largest edge any raster in this crate may have, in pixels.
pub const MAX_RASTER_EDGE: u32 = 8192;

/// A CPU raster buffer. All pixels are **premultiplied** RGBA8.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Raster {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Default for Raster {
    /// A 1x1 transparent raster.
    fn default() -> Self {
        Self {
            width: 1,
            height: 1,
            data: vec![0; 4],
        }
    }
}

impl Raster {
    /// Allocate a transparent raster. Dimensions must be positive and within
    /// [`MAX_RASTER_EDGE`].
    pub fn new(width: u32, height: u32) -> EffectResult<Self> {
        if width == 0 || height == 0 {
            return Err(EffectError::invalid_dimensions(format!(
                "raster dimensions must be positive (got {width}x{height})"
            )));
        }
        if width > MAX_RASTER_EDGE || height > MAX_RASTER_EDGE {
            return Err(EffectError::invalid_dimensions(format!(
                "raster dimensions {width}x{height} exceed sanity ceiling {MAX_RASTER_EDGE}"
            )));
        }
        Ok(Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 4],
        })
    }

    /// Wrap existing premultiplied RGBA8 bytes.
    pub fn from_premul_bytes(width: u32, height: u32, data: Vec<u8>) -> EffectResult<Self> {
        if data.len() != width as usize * height as usize * 4 {
            return Err(EffectError::invalid_dimensions(format!(
                "byte length {} does not match {width}x{height} rgba8",
                data.len()
            )));
        }
        let mut raster = Self::new(width, height)?;
        raster.data = data;
        Ok(raster)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<PremulRgba8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        Some([self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]])
    }

    /// Alpha at (x, y); 0 outside the raster.
    pub fn alpha(&self, x: u32, y: u32) -> u8 {
        self.pixel(x, y).map(|px| px[3]).unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    pub fn fill(&mut self, color: PremulRgba8) {
        for px in self.data.chunks_exact_mut(4) {
            px.copy_from_slice(&color);
        }
    }
}

/// Surface geometry as seen by the compositor.
///
/// Invariant: `backing = round(display * pixel_density)`, re-established after
/// every resize. Compositor drawing is expressed in CSS pixels and scaled by
/// `pixel_density` at the final blit.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SurfaceDescriptor {
    pub display_width: f64,
    pub display_height: f64,
    pub backing_width: u32,
    pub backing_height: u32,
    pub pixel_density: f64,
}

impl SurfaceDescriptor {
    /// True when the geometry delta against `other` exceeds the churn
    /// thresholds (1 px size, 0.1 density).
    pub fn differs_from(&self, other: &SurfaceDescriptor) -> bool {
        (self.display_width - other.display_width).abs() > 1.0
            || (self.display_height - other.display_height).abs() > 1.0
            || (self.pixel_density - other.pixel_density).abs() > 0.1
    }
}

/// Round `v` down to a multiple of `unit`.
pub fn align_down(v: u32, unit: u32) -> u32 {
    debug_assert!(unit > 0);
    v - v % unit
}

/// Round `v` up to a multiple of `unit`.
pub fn align_up(v: u32, unit: u32) -> u32 {
    debug_assert!(unit > 0);
    match v % unit {
        0 => v,
        r => v + (unit - r),
    }
}
