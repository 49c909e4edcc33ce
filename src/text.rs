//! Text rasterization seam.
//!
//! The mask builder only needs two things from a text backend: tight pixel
//! bounds for a line of text, and an alpha rendering of the whole (possibly
//! multi-line) string centered in a scratch raster. [`VelloTextRasterizer`]
//! is the real backend (parley layout + vello_cpu glyph fills);
//! [`BlockGlyphRasterizer`] is a font-free deterministic stand-in for tests
//! and headless hosts without usable system fonts.

use std::collections::HashMap;

use crate::composite;
use crate::core::{Raster, WHITE};
use crate::error::{EffectError, EffectResult};

/// Font parameters the rasterizer understands.
#[derive(Clone, Debug, PartialEq)]
pub struct FontSpec {
    pub size: f32,
    pub weight: f32,
    pub family: String,
}

/// Tight pixel bounds of laid-out text.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TextMetrics {
    pub width: f64,
    pub height: f64,
}

pub trait TextRasterizer {
    /// Measure `text` (newlines separate lines) at `font`, with lines spaced
    /// at `line_height` multiples of the font size.
    fn measure(&mut self, text: &str, font: &FontSpec, line_height: f32)
    -> EffectResult<TextMetrics>;

    /// Render `text` centered (block and per line) into a `width`×`height`
    /// raster. Glyph coverage is opaque white on transparent.
    fn render_centered(
        &mut self,
        text: &str,
        font: &FontSpec,
        width: u32,
        height: u32,
        line_height: f32,
    ) -> EffectResult<Raster>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct MaskBrush;

/// Parley + vello_cpu text backend. Fonts are resolved through the system
/// collection (generic families like `sans-serif` included); glyph outlines
/// are filled on the CPU pipeline.
pub struct VelloTextRasterizer {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<MaskBrush>,
    font_cache: HashMap<u64, vello_cpu::peniko::FontData>,
}

impl Default for VelloTextRasterizer {
    fn default() -> Self {
        Self::new()
    }
}

impl VelloTextRasterizer {
    pub fn new() -> Self {
        Self {
            font_ctx: parley::FontContext::default(),
            layout_ctx: parley::LayoutContext::new(),
            font_cache: HashMap::new(),
        }
    }

    fn layout_line(&mut self, line: &str, font: &FontSpec) -> parley::Layout<MaskBrush> {
        let mut builder = self.layout_ctx.ranged_builder(&mut self.font_ctx, line, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(std::borrow::Cow::Owned(font.family.clone())),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(font.size));
        builder.push_default(parley::style::StyleProperty::FontWeight(
            parley::style::FontWeight::new(font.weight),
        ));
        builder.push_default(parley::style::StyleProperty::Brush(MaskBrush));

        let mut layout: parley::Layout<MaskBrush> = builder.build(line);
        layout.break_all_lines(None);
        layout
    }

}

impl TextRasterizer for VelloTextRasterizer {
    fn measure(
        &mut self,
        text: &str,
        font: &FontSpec,
        line_height: f32,
    ) -> EffectResult<TextMetrics> {
        validate_font(font)?;

        let mut width: f64 = 0.0;
        let mut lines = 0usize;
        for line in text.split('\n') {
            let layout = self.layout_line(line, font);
            width = width.max(f64::from(layout.width()));
            lines += 1;
        }

        Ok(TextMetrics {
            width,
            height: lines as f64 * f64::from(line_height * font.size),
        })
    }

    fn render_centered(
        &mut self,
        text: &str,
        font: &FontSpec,
        width: u32,
        height: u32,
        line_height: f32,
    ) -> EffectResult<Raster> {
        validate_font(font)?;
        let w: u16 = width
            .try_into()
            .map_err(|_| EffectError::invalid_dimensions("scratch raster width exceeds u16"))?;
        let h: u16 = height
            .try_into()
            .map_err(|_| EffectError::invalid_dimensions("scratch raster height exceeds u16"))?;

        let lines: Vec<&str> = text.split('\n').collect();
        let line_step = f64::from(line_height * font.size);
        let block_top = (f64::from(height) - lines.len() as f64 * line_step) / 2.0;

        let mut ctx = vello_cpu::RenderContext::new(w, h);
        ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(255, 255, 255, 255));

        for (i, line) in lines.iter().enumerate() {
            let layout = self.layout_line(line, font);
            let x = (f64::from(width) - f64::from(layout.width())) / 2.0;
            let y = block_top + i as f64 * line_step;
            ctx.set_transform(vello_cpu::kurbo::Affine::translate((x, y)));

            for layout_line in layout.lines() {
                for item in layout_line.items() {
                    let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                        continue;
                    };
                    // Parley and vello_cpu pin different peniko versions, so
                    // the resolved font is rebuilt from its raw bytes and
                    // cached by blob identity.
                    let font = run.run().font();
                    let font_data = match self.font_cache.get(&font.data.id()) {
                        Some(data) => data.clone(),
                        None => {
                            let data = vello_cpu::peniko::FontData::new(
                                vello_cpu::peniko::Blob::from(font.data.as_ref().to_vec()),
                                font.index,
                            );
                            self.font_cache.insert(font.data.id(), data.clone());
                            data
                        }
                    };
                    let glyphs = run.glyphs().map(|g| vello_cpu::Glyph {
                        id: g.id,
                        x: g.x,
                        y: g.y,
                    });
                    ctx.glyph_run(&font_data)
                        .font_size(run.run().font_size())
                        .fill_glyphs(glyphs);
                }
            }
        }

        ctx.flush();
        let mut pixmap = vello_cpu::Pixmap::new(w, h);
        ctx.render_to_pixmap(&mut pixmap);
        Raster::from_premul_bytes(width, height, pixmap.data_as_u8_slice().to_vec())
    }
}

/// Deterministic glyph stand-in: every non-whitespace character becomes a
/// solid box 0.6×size wide and 0.8×size tall. No font files involved.
#[derive(Clone, Copy, Debug, Default)]
pub struct BlockGlyphRasterizer;

impl BlockGlyphRasterizer {
    fn advance(font: &FontSpec) -> f64 {
        f64::from(font.size) * 0.6
    }
}

impl TextRasterizer for BlockGlyphRasterizer {
    fn measure(
        &mut self,
        text: &str,
        font: &FontSpec,
        line_height: f32,
    ) -> EffectResult<TextMetrics> {
        validate_font(font)?;
        let advance = Self::advance(font);
        let mut width: f64 = 0.0;
        let mut lines = 0usize;
        for line in text.split('\n') {
            width = width.max(line.chars().count() as f64 * advance);
            lines += 1;
        }
        Ok(TextMetrics {
            width,
            height: lines as f64 * f64::from(line_height * font.size),
        })
    }

    fn render_centered(
        &mut self,
        text: &str,
        font: &FontSpec,
        width: u32,
        height: u32,
        line_height: f32,
    ) -> EffectResult<Raster> {
        validate_font(font)?;
        let mut out = Raster::new(width, height)?;

        let advance = Self::advance(font);
        let glyph_w = (advance * 0.9).max(1.0) as u32;
        let glyph_h = (f64::from(font.size) * 0.8).max(1.0) as u32;
        let lines: Vec<&str> = text.split('\n').collect();
        let line_step = f64::from(line_height * font.size);
        let block_top = (f64::from(height) - lines.len() as f64 * line_step) / 2.0;

        for (i, line) in lines.iter().enumerate() {
            let line_w = line.chars().count() as f64 * advance;
            let x0 = (f64::from(width) - line_w) / 2.0;
            let y = (block_top + i as f64 * line_step) as i64;
            for (j, ch) in line.chars().enumerate() {
                if ch.is_whitespace() {
                    continue;
                }
                let x = (x0 + j as f64 * advance) as i64;
                composite::fill_rect(&mut out, x, y, glyph_w, glyph_h, WHITE);
            }
        }
        Ok(out)
    }
}

fn validate_font(font: &FontSpec) -> EffectResult<()> {
    if !font.size.is_finite() || font.size <= 0.0 {
        return Err(EffectError::invalid_parameter(
            "font size must be finite and > 0",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn font(size: f32) -> FontSpec {
        FontSpec {
            size,
            weight: 900.0,
            family: "sans-serif".to_string(),
        }
    }

    #[test]
    fn block_rasterizer_measures_longest_line() {
        let mut r = BlockGlyphRasterizer;
        let m = r.measure("AB\nA", &font(10.0), 1.2).unwrap();
        assert_eq!(m.width, 12.0);
        assert_eq!(m.height, 24.0);
    }

    #[test]
    fn block_rasterizer_renders_centered_opaque_glyphs() {
        let mut r = BlockGlyphRasterizer;
        let raster = r.render_centered("A", &font(20.0), 100, 60, 1.2).unwrap();
        assert_eq!(raster.alpha(50, 30), 255);
        assert_eq!(raster.alpha(0, 0), 0);
        assert_eq!(raster.alpha(99, 59), 0);
    }

    #[test]
    fn whitespace_renders_nothing() {
        let mut r = BlockGlyphRasterizer;
        let raster = r.render_centered("   ", &font(20.0), 64, 64, 1.2).unwrap();
        assert!(raster.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn invalid_font_size_is_rejected() {
        let mut r = BlockGlyphRasterizer;
        assert!(r.measure("A", &font(0.0), 1.2).is_err());
        assert!(r.measure("A", &font(f32::NAN), 1.2).is_err());
    }

    #[test]
    fn vello_rasterizer_handles_hosts_without_fonts() {
        let mut r = VelloTextRasterizer::new();
        // Metrics depend on which system fonts exist; only the contract that
        // measurement never fails for valid font parameters is asserted here.
        let m = r.measure("A", &font(24.0), 1.2).unwrap();
        assert!(m.width >= 0.0);
        assert!(m.height > 0.0);
    }
}
