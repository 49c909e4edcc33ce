//! Text → block-quantized binary mask.
//!
//! The mask is what the scrolling noise gets cut through. Build failures
//! never propagate: every internal error degrades to an empty placeholder
//! mask, because the effect must keep running no matter what the text or
//! font situation looks like.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::composite;
use crate::config::{EffectConfig, normalize_text};
use crate::core::{Raster, WHITE, align_down, align_up};
use crate::text::{FontSpec, TextRasterizer};

/// Fraction of the viewport the rendered text may occupy.
pub const TARGET_WIDTH_FRACTION: f64 = 0.85;
pub const TARGET_HEIGHT_FRACTION: f64 = 0.60;

/// Multi-line spacing as a multiple of font size.
const LINE_HEIGHT: f32 = 1.2;
const FONT_SIZE_FLOOR: f64 = 8.0;
const ESTIMATE_MAX_ITERATIONS: usize = 5;

/// Font-size memo entries kept before the clear-on-threshold policy kicks in.
pub const FONT_MEMO_CAPACITY: usize = 64;

/// A block-quantized binary mask, tightly cropped to glyph coverage.
/// Dimensions are always positive multiples of `block_size`.
#[derive(Clone, Debug)]
pub struct Mask {
    raster: Raster,
    block_size: u32,
}

impl Default for Mask {
    /// The empty 1x1 placeholder.
    fn default() -> Self {
        Self {
            raster: Raster::default(),
            block_size: 1,
        }
    }
}

impl Mask {
    pub fn raster(&self) -> &Raster {
        &self.raster
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn width(&self) -> u32 {
        self.raster.width()
    }

    pub fn height(&self) -> u32 {
        self.raster.height()
    }

    /// True for the degraded/empty placeholder.
    pub fn is_empty(&self) -> bool {
        self.raster.data().iter().all(|&b| b == 0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct MemoKey {
    text: String,
    target_w: u32,
    target_h: u32,
    weight_bits: u32,
    family: String,
}

pub struct MaskBuilder {
    rasterizer: Box<dyn TextRasterizer>,
    size_memo: HashMap<MemoKey, f64>,
}

impl MaskBuilder {
    pub fn new(rasterizer: Box<dyn TextRasterizer>) -> Self {
        Self {
            rasterizer,
            size_memo: HashMap::new(),
        }
    }

    /// Largest font size (bounded fixed-point search, ≤ 5 iterations) whose
    /// rendered bounds fit `target_w`×`target_h`. Never upscales beyond the
    /// starting candidate and never goes below the 8 px floor. Measurement
    /// failure falls back to a heuristic size.
    pub fn estimate_font_size(
        &mut self,
        text: &str,
        target_w: f64,
        target_h: f64,
        cfg: &EffectConfig,
    ) -> f64 {
        let line_count = text.split('\n').count().max(1) as f64;
        let fallback = (target_h / line_count).min(24.0).max(FONT_SIZE_FLOOR);

        let key = MemoKey {
            text: text.to_string(),
            target_w: target_w.round().max(0.0) as u32,
            target_h: target_h.round().max(0.0) as u32,
            weight_bits: cfg.font_weight.numeric().to_bits(),
            family: cfg.font_family.clone(),
        };
        if let Some(&size) = self.size_memo.get(&key) {
            return size;
        }

        let mut candidate = (target_h / line_count).max(FONT_SIZE_FLOOR);
        for _ in 0..ESTIMATE_MAX_ITERATIONS {
            let metrics = match self.rasterizer.measure(text, &font(cfg, candidate), LINE_HEIGHT) {
                Ok(m) => m,
                Err(e) => {
                    warn!("font size estimation failed ({e}); using heuristic {fallback}px");
                    return fallback;
                }
            };

            let scale_w = if metrics.width > 0.0 { target_w / metrics.width } else { 1.0 };
            let scale_h = if metrics.height > 0.0 { target_h / metrics.height } else { 1.0 };
            let scale = scale_w.min(scale_h).min(1.0);

            let next = (candidate * scale).max(FONT_SIZE_FLOOR);
            if (next - candidate).abs() < 0.5 || next <= FONT_SIZE_FLOOR {
                candidate = next;
                break;
            }
            candidate = next;
        }

        if self.size_memo.len() >= FONT_MEMO_CAPACITY {
            self.size_memo.clear();
        }
        self.size_memo.insert(key, candidate);
        candidate
    }

    /// Build a mask for `text` within a `viewport_w`×`viewport_h` CSS-pixel
    /// viewport. Never fails: any internal error degrades to an empty
    /// `block_size`×`block_size` placeholder.
    pub fn build_mask(
        &mut self,
        text: &str,
        block_size: u32,
        viewport_w: u32,
        viewport_h: u32,
        cfg: &EffectConfig,
    ) -> Mask {
        let block_size = block_size.max(1);
        let (text, _truncation) = normalize_text(text);

        if text.trim().is_empty() || viewport_w == 0 || viewport_h == 0 {
            return placeholder(block_size);
        }

        let target_w = f64::from(viewport_w) * TARGET_WIDTH_FRACTION;
        let target_h = f64::from(viewport_h) * TARGET_HEIGHT_FRACTION;
        let size = match cfg.font_size {
            Some(explicit) => explicit,
            None => self.estimate_font_size(&text, target_w, target_h, cfg),
        };

        let scratch = match self.rasterizer.render_centered(
            &text,
            &font(cfg, size),
            viewport_w,
            viewport_h,
            LINE_HEIGHT,
        ) {
            Ok(raster) => raster,
            Err(e) => {
                warn!("mask rendering degraded to empty placeholder: {e}");
                return placeholder(block_size);
            }
        };

        let Some((x0, y0, x1, y1)) = alpha_bounds(&scratch) else {
            return placeholder(block_size);
        };

        // Expand outward to the enclosing block grid; origin stays aligned.
        let bx0 = align_down(x0, block_size);
        let by0 = align_down(y0, block_size);
        let bx1 = align_up(x1 + 1, block_size);
        let by1 = align_up(y1 + 1, block_size);
        let out_w = bx1 - bx0;
        let out_h = by1 - by0;

        let mut out = match Raster::new(out_w, out_h) {
            Ok(r) => r,
            Err(e) => {
                warn!("mask raster allocation failed ({e}); degrading to placeholder");
                return placeholder(block_size);
            }
        };

        // Sample each block at its center pixel; solid fill keeps the edges
        // crisp at exactly the noise grid's granularity.
        for by in 0..(out_h / block_size) {
            for bx in 0..(out_w / block_size) {
                let cx = bx0 + bx * block_size + block_size / 2;
                let cy = by0 + by * block_size + block_size / 2;
                if scratch.alpha(cx, cy) > 0 {
                    composite::fill_rect(
                        &mut out,
                        i64::from(bx * block_size),
                        i64::from(by * block_size),
                        block_size,
                        block_size,
                        WHITE,
                    );
                }
            }
        }

        debug!(
            "mask built: {}x{} (blocks of {}) from viewport {}x{}",
            out_w, out_h, block_size, viewport_w, viewport_h
        );
        Mask {
            raster: out,
            block_size,
        }
    }

    /// Drop all memoized font sizes. Must be called whenever a font-affecting
    /// configuration field changes.
    pub fn invalidate_memo(&mut self) {
        self.size_memo.clear();
    }

    pub fn memo_len(&self) -> usize {
        self.size_memo.len()
    }

    /// Housekeeping hook: clears the memo once it grows past `threshold`.
    pub fn trim_memo(&mut self, threshold: usize) {
        if self.size_memo.len() > threshold {
            self.size_memo.clear();
        }
    }
}

fn font(cfg: &EffectConfig, size: f64) -> FontSpec {
    FontSpec {
        size: size as f32,
        weight: cfg.font_weight.numeric(),
        family: cfg.font_family.clone(),
    }
}

fn placeholder(block_size: u32) -> Mask {
    let raster = Raster::new(block_size, block_size).unwrap_or_default();
    Mask { raster, block_size }
}

/// Inclusive bounding box of all non-transparent pixels, or `None` when the
/// raster is fully transparent.
fn alpha_bounds(raster: &Raster) -> Option<(u32, u32, u32, u32)> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for y in 0..raster.height() {
        for x in 0..raster.width() {
            if raster.alpha(x, y) == 0 {
                continue;
            }
            bounds = Some(match bounds {
                None => (x, y, x, y),
                Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
            });
        }
    }
    bounds
}
