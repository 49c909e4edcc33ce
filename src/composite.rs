//! Slice-level compositing primitives for premultiplied RGBA8 buffers.

use crate::core::{PremulRgba8, Raster};
use crate::error::{EffectError, EffectResult};

/// Source-over for a single premultiplied pixel.
pub fn over(dst: PremulRgba8, src: PremulRgba8) -> PremulRgba8 {
    if src[3] == 0 {
        return dst;
    }
    if src[3] == 255 {
        return src;
    }

    let inv = 255u16 - u16::from(src[3]);
    let mut out = [0u8; 4];
    for i in 0..4 {
        out[i] = src[i].saturating_add(mul_div255(u16::from(dst[i]), inv));
    }
    out
}

/// Destination-in: keep `dst` only where `mask` is opaque, scaling by the
/// mask's alpha. This is the operation that cuts scrolling noise to the text
/// silhouette.
pub fn mask_in_place(dst: &mut [u8], mask: &[u8]) -> EffectResult<()> {
    if dst.len() != mask.len() || dst.len() % 4 != 0 {
        return Err(EffectError::invalid_dimensions(
            "mask_in_place expects equal-length rgba8 buffers",
        ));
    }
    for (d, m) in dst.chunks_exact_mut(4).zip(mask.chunks_exact(4)) {
        let a = u16::from(m[3]);
        if a == 0 {
            d.fill(0);
            continue;
        }
        if a == 255 {
            continue;
        }
        for c in d.iter_mut() {
            *c = mul_div255(u16::from(*c), a);
        }
    }
    Ok(())
}

/// Replace-copy `src` into `dst` at (dx, dy), clipped to `dst` bounds.
pub fn copy_into(dst: &mut Raster, src: &Raster, dx: i64, dy: i64) {
    for_each_overlap(dst, src, dx, dy, |d, s| d.copy_from_slice(s));
}

/// Source-over blit of `src` into `dst` at (dx, dy), clipped to `dst` bounds.
pub fn blit_over(dst: &mut Raster, src: &Raster, dx: i64, dy: i64) {
    for_each_overlap(dst, src, dx, dy, |d, s| {
        let out = over([d[0], d[1], d[2], d[3]], [s[0], s[1], s[2], s[3]]);
        d.copy_from_slice(&out);
    });
}

/// Source-over blit with nearest-neighbour magnification by `scale`; used to
/// map CSS-pixel buffers onto a device-pixel backing store.
pub fn blit_over_scaled(dst: &mut Raster, src: &Raster, dx: i64, dy: i64, scale: f64) {
    if !scale.is_finite() || scale <= 0.0 {
        return;
    }
    let out_w = (f64::from(src.width()) * scale).round() as i64;
    let out_h = (f64::from(src.height()) * scale).round() as i64;

    let x0 = dx.max(0);
    let y0 = dy.max(0);
    let x1 = (dx + out_w).min(i64::from(dst.width()));
    let y1 = (dy + out_h).min(i64::from(dst.height()));

    for y in y0..y1 {
        let sy = (((y - dy) as f64) / scale).floor() as u32;
        let sy = sy.min(src.height() - 1);
        for x in x0..x1 {
            let sx = (((x - dx) as f64) / scale).floor() as u32;
            let sx = sx.min(src.width() - 1);
            let Some(s) = src.pixel(sx, sy) else { continue };
            if s[3] == 0 {
                continue;
            }
            let i = (y as usize * dst.width() as usize + x as usize) * 4;
            let d = &mut dst.data_mut()[i..i + 4];
            let out = over([d[0], d[1], d[2], d[3]], s);
            d.copy_from_slice(&out);
        }
    }
}

/// Fill an axis-aligned rectangle, clipped to the raster.
pub fn fill_rect(dst: &mut Raster, x: i64, y: i64, w: u32, h: u32, color: PremulRgba8) {
    let x0 = x.max(0);
    let y0 = y.max(0);
    let x1 = (x + i64::from(w)).min(i64::from(dst.width()));
    let y1 = (y + i64::from(h)).min(i64::from(dst.height()));
    if x1 <= x0 || y1 <= y0 {
        return;
    }

    let width = dst.width() as usize;
    for row in y0..y1 {
        let start = (row as usize * width + x0 as usize) * 4;
        let end = (row as usize * width + x1 as usize) * 4;
        for px in dst.data_mut()[start..end].chunks_exact_mut(4) {
            px.copy_from_slice(&color);
        }
    }
}

fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}

fn for_each_overlap(
    dst: &mut Raster,
    src: &Raster,
    dx: i64,
    dy: i64,
    mut op: impl FnMut(&mut [u8], &[u8]),
) {
    let x0 = dx.max(0);
    let y0 = dy.max(0);
    let x1 = (dx + i64::from(src.width())).min(i64::from(dst.width()));
    let y1 = (dy + i64::from(src.height())).min(i64::from(dst.height()));
    if x1 <= x0 || y1 <= y0 {
        return;
    }

    let dst_w = dst.width() as usize;
    let src_w = src.width() as usize;
    let row_px = (x1 - x0) as usize;

    for y in y0..y1 {
        let sx = (x0 - dx) as usize;
        let sy = (y - dy) as usize;
        let d_start = (y as usize * dst_w + x0 as usize) * 4;
        let s_start = (sy * src_w + sx) * 4;
        let d_row = &mut dst.data_mut()[d_start..d_start + row_px * 4];
        let s_row = &src.data()[s_start..s_start + row_px * 4];
        for (d, s) in d_row.chunks_exact_mut(4).zip(s_row.chunks_exact(4)) {
            op(d, s);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BLACK, TRANSPARENT, WHITE};

    #[test]
    fn over_src_alpha_0_is_noop() {
        let dst = [10, 20, 30, 40];
        assert_eq!(over(dst, TRANSPARENT), dst);
    }

    #[test]
    fn over_src_opaque_replaces_dst() {
        assert_eq!(over(BLACK, WHITE), WHITE);
    }

    #[test]
    fn over_dst_transparent_returns_src() {
        let src = [100, 110, 120, 200];
        assert_eq!(over(TRANSPARENT, src), src);
    }

    #[test]
    fn mask_in_place_keeps_only_opaque_mask_pixels() {
        let mut dst = vec![255, 255, 255, 255, 10, 20, 30, 255];
        let mask = vec![0, 0, 0, 255, 0, 0, 0, 0];
        mask_in_place(&mut dst, &mask).unwrap();
        assert_eq!(&dst[0..4], &[255, 255, 255, 255]);
        assert_eq!(&dst[4..8], &[0, 0, 0, 0]);
    }

    #[test]
    fn mask_in_place_rejects_length_mismatch() {
        let mut dst = vec![0u8; 8];
        assert!(mask_in_place(&mut dst, &[0u8; 4]).is_err());
    }

    #[test]
    fn copy_into_clips_negative_offsets() {
        let mut dst = Raster::new(2, 2).unwrap();
        let mut src = Raster::new(2, 2).unwrap();
        src.fill(WHITE);
        copy_into(&mut dst, &src, -1, -1);
        assert_eq!(dst.pixel(0, 0), Some(WHITE));
        assert_eq!(dst.pixel(1, 1), Some(TRANSPARENT));
    }

    #[test]
    fn fill_rect_is_clipped() {
        let mut dst = Raster::new(4, 4).unwrap();
        fill_rect(&mut dst, 3, 3, 10, 10, BLACK);
        assert_eq!(dst.pixel(3, 3), Some(BLACK));
        assert_eq!(dst.pixel(2, 2), Some(TRANSPARENT));
    }

    #[test]
    fn blit_over_scaled_magnifies_nearest() {
        let mut dst = Raster::new(4, 4).unwrap();
        let mut src = Raster::new(2, 2).unwrap();
        src.data_mut()[0..4].copy_from_slice(&WHITE); // only (0,0) opaque
        blit_over_scaled(&mut dst, &src, 0, 0, 2.0);
        assert_eq!(dst.pixel(0, 0), Some(WHITE));
        assert_eq!(dst.pixel(1, 1), Some(WHITE));
        assert_eq!(dst.pixel(2, 2), Some(TRANSPARENT));
    }
}
