//! Effect configuration: documented bounds, clamp-with-warning resolution,
//! and partial updates.

use tracing::warn;

use crate::error::{EffectError, EffectResult};

pub const DEFAULT_TEXT: &str = "HELLO";
/// Input text is capped at this many characters before mask building.
pub const TEXT_MAX_CHARS: usize = 1000;

pub const CELL_SIZE_RANGE: (u32, u32) = (1, 20);
pub const CIRCLE_RADIUS_RANGE: (u32, u32) = (50, 1000);
pub const STEP_PIXELS_RANGE: (u32, u32) = (1, 20);
pub const STEP_MS_RANGE: (f64, f64) = (16.0, 200.0);
pub const MASK_BLOCK_SIZE_RANGE: (u32, u32) = (1, 10);
pub const FONT_SIZE_RANGE: (f64, f64) = (10.0, 500.0);

/// How out-of-range values are treated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ValidationMode {
    /// Clamp to the nearest bound and record a human-readable warning.
    #[default]
    Clamp,
    /// Any out-of-range or invalid field is an `InvalidParameter` error.
    Strict,
}

/// CSS-style font weight: numeric or a named keyword.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum FontWeight {
    Numeric(u16),
    Named(String),
}

impl Default for FontWeight {
    fn default() -> Self {
        Self::Numeric(900)
    }
}

impl FontWeight {
    /// Numeric weight for the text rasterizer; named weights map onto the
    /// usual CSS values, unknown names onto 400.
    pub fn numeric(&self) -> f32 {
        match self {
            Self::Numeric(w) => f32::from(*w),
            Self::Named(name) => match name.to_ascii_lowercase().as_str() {
                "thin" => 100.0,
                "light" => 300.0,
                "normal" | "regular" => 400.0,
                "medium" => 500.0,
                "semibold" => 600.0,
                "bold" => 700.0,
                "black" | "heavy" => 900.0,
                _ => 400.0,
            },
        }
    }
}

/// Resolved, fully-validated configuration. Immutable per tick.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EffectConfig {
    pub text: String,
    pub cell_size: u32,
    /// Legacy knob kept for compositing-footprint compatibility.
    pub circle_radius: u32,
    pub step_pixels: u32,
    pub step_ms: f64,
    pub mask_block_size: u32,
    /// `None` means the mask builder estimates a size that fits the viewport.
    pub font_size: Option<f64>,
    pub font_weight: FontWeight,
    pub font_family: String,
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            text: DEFAULT_TEXT.to_string(),
            cell_size: 2,
            circle_radius: 300,
            step_pixels: 4,
            step_ms: 32.0,
            mask_block_size: 2,
            font_size: None,
            font_weight: FontWeight::default(),
            font_family: "sans-serif".to_string(),
        }
    }
}

/// Partial options, every field independent. Unset fields keep their current
/// (or default) value.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EffectOptions {
    pub text: Option<String>,
    pub cell_size: Option<u32>,
    pub circle_radius: Option<u32>,
    pub step_pixels: Option<u32>,
    pub step_ms: Option<f64>,
    pub mask_block_size: Option<u32>,
    pub font_size: Option<f64>,
    pub font_weight: Option<FontWeight>,
    pub font_family: Option<String>,
}

impl EffectConfig {
    /// Resolve `options` against the defaults.
    pub fn resolve(
        options: &EffectOptions,
        mode: ValidationMode,
    ) -> EffectResult<(Self, Vec<String>)> {
        Self::default().apply(options, mode)
    }

    /// Merge a partial update onto `self`, validating every supplied field.
    pub fn apply(
        &self,
        patch: &EffectOptions,
        mode: ValidationMode,
    ) -> EffectResult<(Self, Vec<String>)> {
        let mut out = self.clone();
        let mut warnings = Vec::new();

        if let Some(text) = &patch.text {
            let (normalized, warning) = normalize_text(text);
            if let Some(w) = warning {
                report(&mut warnings, mode, w)?;
            }
            out.text = normalized;
        }
        if let Some(v) = patch.cell_size {
            out.cell_size = clamp_u32("cellSize", v, CELL_SIZE_RANGE, mode, &mut warnings)?;
        }
        if let Some(v) = patch.circle_radius {
            out.circle_radius =
                clamp_u32("circleRadius", v, CIRCLE_RADIUS_RANGE, mode, &mut warnings)?;
        }
        if let Some(v) = patch.step_pixels {
            out.step_pixels = clamp_u32("stepPixels", v, STEP_PIXELS_RANGE, mode, &mut warnings)?;
        }
        if let Some(v) = patch.step_ms {
            out.step_ms = clamp_f64("stepMs", v, STEP_MS_RANGE, 32.0, mode, &mut warnings)?;
        }
        if let Some(v) = patch.mask_block_size {
            out.mask_block_size =
                clamp_u32("maskBlockSize", v, MASK_BLOCK_SIZE_RANGE, mode, &mut warnings)?;
        }
        if let Some(v) = patch.font_size {
            if v.is_finite() {
                out.font_size =
                    Some(clamp_f64("fontSize", v, FONT_SIZE_RANGE, 24.0, mode, &mut warnings)?);
            } else {
                report(
                    &mut warnings,
                    mode,
                    format!("fontSize {v} is not finite; falling back to auto"),
                )?;
                out.font_size = None;
            }
        }
        if let Some(v) = &patch.font_weight {
            out.font_weight = validate_weight(v, mode, &mut warnings)?;
        }
        if let Some(v) = &patch.font_family {
            if v.trim().is_empty() {
                report(
                    &mut warnings,
                    mode,
                    "fontFamily must be non-empty; falling back to sans-serif".to_string(),
                )?;
                out.font_family = "sans-serif".to_string();
            } else {
                out.font_family = v.clone();
            }
        }

        Ok((out, warnings))
    }

    /// True when switching to `next` requires a mask rebuild.
    pub fn mask_affected_by(&self, next: &EffectConfig) -> bool {
        self.text != next.text
            || self.mask_block_size != next.mask_block_size
            || self.font_size != next.font_size
            || self.font_weight != next.font_weight
            || self.font_family != next.font_family
    }
}

/// Defensive text normalization: control characters other than newline are
/// stripped, and the result is capped at [`TEXT_MAX_CHARS`] characters.
pub fn normalize_text(input: &str) -> (String, Option<String>) {
    let cleaned: String = input.chars().filter(|c| !c.is_control() || *c == '\n').collect();

    let count = cleaned.chars().count();
    if count <= TEXT_MAX_CHARS {
        return (cleaned, None);
    }

    let truncated: String = cleaned.chars().take(TEXT_MAX_CHARS).collect();
    let warning = format!("text truncated from {count} to {TEXT_MAX_CHARS} characters");
    warn!("{warning}");
    (truncated, Some(warning))
}

fn report(warnings: &mut Vec<String>, mode: ValidationMode, msg: String) -> EffectResult<()> {
    match mode {
        ValidationMode::Strict => Err(EffectError::invalid_parameter(msg)),
        ValidationMode::Clamp => {
            warn!("{msg}");
            warnings.push(msg);
            Ok(())
        }
    }
}

fn clamp_u32(
    field: &str,
    value: u32,
    (min, max): (u32, u32),
    mode: ValidationMode,
    warnings: &mut Vec<String>,
) -> EffectResult<u32> {
    if value < min || value > max {
        let clamped = value.clamp(min, max);
        report(
            warnings,
            mode,
            format!("{field} {value} out of range {min}..={max}; clamped to {clamped}"),
        )?;
        return Ok(clamped);
    }
    Ok(value)
}

fn clamp_f64(
    field: &str,
    value: f64,
    (min, max): (f64, f64),
    default: f64,
    mode: ValidationMode,
    warnings: &mut Vec<String>,
) -> EffectResult<f64> {
    if !value.is_finite() {
        report(
            warnings,
            mode,
            format!("{field} {value} is not finite; falling back to {default}"),
        )?;
        return Ok(default);
    }
    if value < min || value > max {
        let clamped = value.clamp(min, max);
        report(
            warnings,
            mode,
            format!("{field} {value} out of range {min}..={max}; clamped to {clamped}"),
        )?;
        return Ok(clamped);
    }
    Ok(value)
}

fn validate_weight(
    value: &FontWeight,
    mode: ValidationMode,
    warnings: &mut Vec<String>,
) -> EffectResult<FontWeight> {
    match value {
        FontWeight::Numeric(w) if *w < 1 || *w > 1000 => {
            let clamped = (*w).clamp(1, 1000);
            report(
                warnings,
                mode,
                format!("fontWeight {w} out of range 1..=1000; clamped to {clamped}"),
            )?;
            Ok(FontWeight::Numeric(clamped))
        }
        other => Ok(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = EffectConfig::default();
        assert_eq!(cfg.text, "HELLO");
        assert_eq!(cfg.cell_size, 2);
        assert_eq!(cfg.circle_radius, 300);
        assert_eq!(cfg.step_pixels, 4);
        assert_eq!(cfg.step_ms, 32.0);
        assert_eq!(cfg.mask_block_size, 2);
        assert_eq!(cfg.font_size, None);
        assert_eq!(cfg.font_weight.numeric(), 900.0);
        assert_eq!(cfg.font_family, "sans-serif");
    }

    #[test]
    fn out_of_range_values_clamp_with_warnings() {
        let opts = EffectOptions {
            cell_size: Some(50),
            step_ms: Some(1.0),
            mask_block_size: Some(0),
            ..Default::default()
        };
        let (cfg, warnings) = EffectConfig::resolve(&opts, ValidationMode::Clamp).unwrap();
        assert_eq!(cfg.cell_size, 20);
        assert_eq!(cfg.step_ms, 16.0);
        assert_eq!(cfg.mask_block_size, 1);
        assert_eq!(warnings.len(), 3);
    }

    #[test]
    fn strict_mode_rejects_out_of_range() {
        let opts = EffectOptions {
            cell_size: Some(50),
            ..Default::default()
        };
        assert!(matches!(
            EffectConfig::resolve(&opts, ValidationMode::Strict),
            Err(EffectError::InvalidParameter(_))
        ));
    }

    #[test]
    fn clamp_round_trips_every_numeric_field() {
        let opts = EffectOptions {
            cell_size: Some(0),
            circle_radius: Some(9999),
            step_pixels: Some(21),
            step_ms: Some(500.0),
            mask_block_size: Some(11),
            font_size: Some(1.0),
            ..Default::default()
        };
        let (cfg, _) = EffectConfig::resolve(&opts, ValidationMode::Clamp).unwrap();
        assert_eq!(cfg.cell_size, 1);
        assert_eq!(cfg.circle_radius, 1000);
        assert_eq!(cfg.step_pixels, 20);
        assert_eq!(cfg.step_ms, 200.0);
        assert_eq!(cfg.mask_block_size, 10);
        assert_eq!(cfg.font_size, Some(10.0));
    }

    #[test]
    fn non_finite_font_size_falls_back_to_auto() {
        let opts = EffectOptions {
            font_size: Some(f64::NAN),
            ..Default::default()
        };
        let (cfg, warnings) = EffectConfig::resolve(&opts, ValidationMode::Clamp).unwrap();
        assert_eq!(cfg.font_size, None);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn normalize_text_strips_controls_and_caps_length() {
        let (s, w) = normalize_text("A\u{0007}B\nC");
        assert_eq!(s, "AB\nC");
        assert!(w.is_none());

        let long = "A".repeat(1500);
        let (s, w) = normalize_text(&long);
        assert_eq!(s.chars().count(), 1000);
        assert!(w.unwrap().contains("truncated"));
    }

    #[test]
    fn named_weights_resolve_to_css_values() {
        assert_eq!(FontWeight::Named("bold".to_string()).numeric(), 700.0);
        assert_eq!(FontWeight::Named("mystery".to_string()).numeric(), 400.0);
    }

    #[test]
    fn options_json_roundtrip() {
        let opts = EffectOptions {
            text: Some("HI".to_string()),
            font_weight: Some(FontWeight::Named("bold".to_string())),
            ..Default::default()
        };
        let s = serde_json::to_string(&opts).unwrap();
        let de: EffectOptions = serde_json::from_str(&s).unwrap();
        assert_eq!(de, opts);
    }

    #[test]
    fn mask_affecting_delta_detection() {
        let a = EffectConfig::default();
        let mut b = a.clone();
        b.cell_size = 4;
        assert!(!a.mask_affected_by(&b));
        b.font_family = "serif".to_string();
        assert!(a.mask_affected_by(&b));
    }
}
