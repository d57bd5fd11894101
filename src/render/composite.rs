use serde::{Deserialize, Serialize};

use crate::foundation::error::{WavecastError, WavecastResult};
use crate::foundation::math::{mul_div255_u8, unit_to_u8_weight};

/// Composite operation applied when a layer is drawn onto the shared surface.
///
/// Names follow the canvas `globalCompositeOperation` vocabulary; both camelCase and the
/// hyphenated CSS spellings deserialize.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlendMode {
    #[default]
    #[serde(alias = "source-over")]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    #[serde(alias = "color-dodge")]
    ColorDodge,
    #[serde(alias = "color-burn")]
    ColorBurn,
    #[serde(alias = "hard-light")]
    HardLight,
    #[serde(alias = "soft-light")]
    SoftLight,
    Difference,
    Exclusion,
}

/// Alpha and blend mode used to draw one layer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Composite {
    pub alpha: f32,
    pub mode: BlendMode,
}

impl Default for Composite {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            mode: BlendMode::Normal,
        }
    }
}

/// Draw premultiplied `src` over premultiplied `dst` with `alpha` and `mode`.
pub fn composite_layer(dst: &mut [u8], src: &[u8], composite: Composite) -> WavecastResult<()> {
    if dst.len() != src.len() || !dst.len().is_multiple_of(4) {
        return Err(WavecastError::render(
            "composite_layer expects equal-length rgba8 buffers",
        ));
    }

    // Mode dispatch happens once per layer; each arm monomorphizes its own kernel.
    let alpha = composite.alpha;
    match composite.mode {
        BlendMode::Normal => source_over(dst, src, alpha),
        BlendMode::Multiply => blend_over(dst, src, alpha, |s, d| s * d),
        BlendMode::Screen => blend_over(dst, src, alpha, |s, d| s + d - s * d),
        BlendMode::Overlay => blend_over(dst, src, alpha, |s, d| hard_light(d, s)),
        BlendMode::Darken => blend_over(dst, src, alpha, |s, d| s.min(d)),
        BlendMode::Lighten => blend_over(dst, src, alpha, |s, d| s.max(d)),
        BlendMode::ColorDodge => blend_over(dst, src, alpha, |s, d| {
            if d <= 0.0 {
                0.0
            } else if s >= 1.0 {
                1.0
            } else {
                (d / (1.0 - s)).min(1.0)
            }
        }),
        BlendMode::ColorBurn => blend_over(dst, src, alpha, |s, d| {
            if d >= 1.0 {
                1.0
            } else if s <= 0.0 {
                0.0
            } else {
                1.0 - ((1.0 - d) / s).min(1.0)
            }
        }),
        BlendMode::HardLight => blend_over(dst, src, alpha, hard_light),
        BlendMode::SoftLight => blend_over(dst, src, alpha, |s, d| {
            if s <= 0.5 {
                d - (1.0 - 2.0 * s) * d * (1.0 - d)
            } else {
                let g = if d <= 0.25 {
                    ((16.0 * d - 12.0) * d + 4.0) * d
                } else {
                    d.sqrt()
                };
                d + (2.0 * s - 1.0) * (g - d)
            }
        }),
        BlendMode::Difference => blend_over(dst, src, alpha, |s, d| (d - s).abs()),
        BlendMode::Exclusion => blend_over(dst, src, alpha, |s, d| d + s - 2.0 * d * s),
    }
    Ok(())
}

fn hard_light(s: f32, d: f32) -> f32 {
    if s <= 0.5 {
        2.0 * s * d
    } else {
        1.0 - 2.0 * (1.0 - s) * (1.0 - d)
    }
}

fn source_over(dst: &mut [u8], src: &[u8], alpha: f32) {
    let op = unit_to_u8_weight(alpha);
    if op == 0 {
        return;
    }
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let sa = mul_div255_u8(u16::from(s[3]), op);
        if sa == 0 {
            continue;
        }
        let inv = 255u16 - u16::from(sa);
        d[3] = sa.saturating_add(mul_div255_u8(u16::from(d[3]), inv));
        for c in 0..3 {
            let sc = mul_div255_u8(u16::from(s[c]), op);
            let dc = mul_div255_u8(u16::from(d[c]), inv);
            d[c] = sc.saturating_add(dc);
        }
    }
}

// Source-over with a separable blend function applied to unpremultiplied channels:
// out_a = sa + da * (1 - sa)
// out_p = sp * (1 - da) + dp * (1 - sa) + B(sc, dc) * sa * da
#[inline(always)]
fn blend_over<F>(dst: &mut [u8], src: &[u8], alpha: f32, blend_fn: F)
where
    F: Fn(f32, f32) -> f32,
{
    let alpha = alpha.clamp(0.0, 1.0);
    if alpha <= 0.0 {
        return;
    }

    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let sa = (f32::from(s[3]) / 255.0) * alpha;
        if sa <= 0.0 {
            continue;
        }
        let da = f32::from(d[3]) / 255.0;
        let out_a = (sa + da * (1.0 - sa)).clamp(0.0, 1.0);

        for c in 0..3 {
            let sp = (f32::from(s[c]) / 255.0) * alpha;
            let dp = f32::from(d[c]) / 255.0;
            let sc = (sp / sa).clamp(0.0, 1.0);
            let dc = if da > 0.0 { (dp / da).clamp(0.0, 1.0) } else { 0.0 };
            let b = blend_fn(sc, dc).clamp(0.0, 1.0);
            let out = (sp * (1.0 - da) + dp * (1.0 - sa) + b * sa * da).clamp(0.0, 1.0);
            d[c] = (out * 255.0).round() as u8;
        }
        d[3] = (out_a * 255.0).round() as u8;
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/composite.rs"]
mod tests;
