//! Procedural binary noise: independently-random black/white cells on a
//! block grid. No spatial correlation and no caching; every render is freshly
//! random, which is what makes the effect flicker.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::composite;
use crate::core::{BLACK, MAX_RASTER_EDGE, Raster, WHITE, align_up};
use crate::error::{EffectError, EffectResult};

pub const MAX_CELL_SIZE: u32 = 100;

pub struct NoiseField {
    cell_size: u32,
    rng: SmallRng,
}

impl NoiseField {
    pub fn new(cell_size: u32) -> EffectResult<Self> {
        Self::with_seed(cell_size, rand::thread_rng().r#gen())
    }

    /// Seeded constructor for deterministic harnesses.
    pub fn with_seed(cell_size: u32, seed: u64) -> EffectResult<Self> {
        validate_cell_size(cell_size)?;
        Ok(Self {
            cell_size,
            rng: SmallRng::seed_from_u64(seed),
        })
    }

    pub fn cell_size(&self) -> u32 {
        self.cell_size
    }

    pub fn set_cell_size(&mut self, cell_size: u32) -> EffectResult<()> {
        validate_cell_size(cell_size)?;
        self.cell_size = cell_size;
        Ok(())
    }

    /// Render a fresh tile covering `width`×`height` pixels. Cells that do
    /// not divide evenly are clipped at the raster edge.
    pub fn render_tile(&mut self, width: u32, height: u32) -> EffectResult<Raster> {
        validate_dimensions(width, height)?;
        let mut tile = Raster::new(width, height)?;
        self.fill_cells(&mut tile, f64::from(self.cell_size));
        Ok(tile)
    }

    /// Same cell pattern drawn straight into a caller-provided raster,
    /// covering it entirely. `scale` stretches the cell edge for
    /// device-pixel targets (a cell stays one CSS-pixel cell).
    pub fn render_direct(&mut self, target: &mut Raster, scale: f64) {
        let scale = if scale.is_finite() && scale > 0.0 { scale } else { 1.0 };
        self.fill_cells(target, f64::from(self.cell_size) * scale);
    }

    /// Round the requested size up to whole cells before rendering, so the
    /// tile repeats seamlessly when blitted end to end.
    pub fn aligned_tile(&mut self, width: u32, height: u32) -> EffectResult<Raster> {
        validate_dimensions(width, height)?;
        let w = align_up(width, self.cell_size);
        let h = align_up(height, self.cell_size);
        if w > MAX_RASTER_EDGE || h > MAX_RASTER_EDGE {
            return Err(EffectError::invalid_dimensions(format!(
                "aligned tile {w}x{h} exceeds sanity ceiling {MAX_RASTER_EDGE}"
            )));
        }
        self.render_tile(w, h)
    }

    fn fill_cells(&mut self, target: &mut Raster, cell_edge: f64) {
        let cell_edge = cell_edge.max(1.0);
        let cols = (f64::from(target.width()) / cell_edge).ceil() as u32;
        let rows = (f64::from(target.height()) / cell_edge).ceil() as u32;

        for row in 0..rows {
            let y = (f64::from(row) * cell_edge).round() as i64;
            let h = ((f64::from(row) + 1.0) * cell_edge).round() as i64 - y;
            for col in 0..cols {
                let x = (f64::from(col) * cell_edge).round() as i64;
                let w = ((f64::from(col) + 1.0) * cell_edge).round() as i64 - x;
                let color = if self.rng.gen_bool(0.5) { WHITE } else { BLACK };
                composite::fill_rect(target, x, y, w as u32, h as u32, color);
            }
        }
    }
}

fn validate_cell_size(cell_size: u32) -> EffectResult<()> {
    if cell_size == 0 || cell_size > MAX_CELL_SIZE {
        return Err(EffectError::invalid_parameter(format!(
            "cell size must be in 1..={MAX_CELL_SIZE} (got {cell_size})"
        )));
    }
    Ok(())
}

fn validate_dimensions(width: u32, height: u32) -> EffectResult<()> {
    if width == 0 || height == 0 || width > MAX_RASTER_EDGE || height > MAX_RASTER_EDGE {
        return Err(EffectError::invalid_dimensions(format!(
            "tile dimensions must be in 1..={MAX_RASTER_EDGE} (got {width}x{height})"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_size_bounds_are_enforced() {
        assert!(NoiseField::with_seed(0, 1).is_err());
        assert!(NoiseField::with_seed(101, 1).is_err());

        let mut field = NoiseField::with_seed(2, 1).unwrap();
        assert!(field.set_cell_size(0).is_err());
        field.set_cell_size(5).unwrap();
        assert_eq!(field.cell_size(), 5);
    }

    #[test]
    fn render_tile_rejects_bad_dimensions() {
        let mut field = NoiseField::with_seed(2, 1).unwrap();
        assert!(field.render_tile(0, 10).is_err());
        assert!(field.render_tile(10, 0).is_err());
        assert!(field.render_tile(MAX_RASTER_EDGE + 1, 10).is_err());
    }

    #[test]
    fn aligned_tile_rounds_up_to_cell_multiples() {
        let mut field = NoiseField::with_seed(4, 1).unwrap();
        let tile = field.aligned_tile(9, 13).unwrap();
        assert_eq!(tile.width(), 12);
        assert_eq!(tile.height(), 16);
        assert_eq!(tile.width() % 4, 0);
        assert_eq!(tile.height() % 4, 0);
    }

    #[test]
    fn aligned_tile_stays_a_cell_multiple_at_the_ceiling() {
        let mut field = NoiseField::with_seed(3, 1).unwrap();
        // 8192 rounds up to 8193 for cell size 3; a clamped tile would no
        // longer repeat seamlessly, so this is an error instead.
        assert!(field.aligned_tile(MAX_RASTER_EDGE, 9).is_err());

        let tile = field.aligned_tile(MAX_RASTER_EDGE - 3, 9).unwrap();
        assert_eq!(tile.width() % 3, 0);
        assert_eq!(tile.height() % 3, 0);
        assert!(tile.width() >= MAX_RASTER_EDGE - 3);
    }

    #[test]
    fn cells_are_uniform_blocks_of_black_or_white() {
        let mut field = NoiseField::with_seed(4, 7).unwrap();
        let tile = field.render_tile(16, 16).unwrap();
        for cy in 0..4u32 {
            for cx in 0..4u32 {
                let first = tile.pixel(cx * 4, cy * 4).unwrap();
                assert!(first == BLACK || first == WHITE);
                for y in 0..4 {
                    for x in 0..4 {
                        assert_eq!(tile.pixel(cx * 4 + x, cy * 4 + y).unwrap(), first);
                    }
                }
            }
        }
    }

    #[test]
    fn successive_tiles_differ() {
        let mut field = NoiseField::with_seed(1, 42).unwrap();
        let a = field.render_tile(32, 32).unwrap();
        let b = field.render_tile(32, 32).unwrap();
        assert_ne!(a.data(), b.data());
    }

    #[test]
    fn render_direct_covers_whole_target() {
        let mut field = NoiseField::with_seed(3, 9).unwrap();
        let mut target = Raster::new(10, 10).unwrap();
        field.render_direct(&mut target, 1.0);
        for y in 0..10 {
            for x in 0..10 {
                assert_eq!(target.alpha(x, y), 255);
            }
        }
    }
}
