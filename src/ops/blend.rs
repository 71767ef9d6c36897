// ============================================================================
// BLEND MODES: closed set of layer blend modes on premultiplied pixels
// ============================================================================
//
// Each mode maps (via `COMBINE_TABLE`) to a pure function
// `fn(src, dst) -> out` over premultiplied RGBA in 0..=1. Layer opacity is
// folded into `src` before the call.

pub type Premul = [f32; 4];
type CombineFn = fn(Premul, Premul) -> Premul;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
    Plus,
    Xor,
}

/// Indexed by `BlendMode as usize`.
const COMBINE_TABLE: [CombineFn; 14] = [
    normal,
    multiply,
    screen,
    overlay,
    darken,
    lighten,
    color_dodge,
    color_burn,
    hard_light,
    soft_light,
    difference,
    exclusion,
    plus,
    xor,
];

impl BlendMode {
    pub fn all() -> &'static [BlendMode] {
        &[
            BlendMode::Normal,
            BlendMode::Multiply,
            BlendMode::Screen,
            BlendMode::Overlay,
            BlendMode::Darken,
            BlendMode::Lighten,
            BlendMode::ColorDodge,
            BlendMode::ColorBurn,
            BlendMode::HardLight,
            BlendMode::SoftLight,
            BlendMode::Difference,
            BlendMode::Exclusion,
            BlendMode::Plus,
            BlendMode::Xor,
        ]
    }

    /// Host identifier for the mode.
    pub fn id(&self) -> &'static str {
        match self {
            BlendMode::Normal => "normal",
            BlendMode::Multiply => "multiply",
            BlendMode::Screen => "screen",
            BlendMode::Overlay => "overlay",
            BlendMode::Darken => "darken",
            BlendMode::Lighten => "lighten",
            BlendMode::ColorDodge => "color_dodge",
            BlendMode::ColorBurn => "color_burn",
            BlendMode::HardLight => "hard_light",
            BlendMode::SoftLight => "soft_light",
            BlendMode::Difference => "difference",
            BlendMode::Exclusion => "exclusion",
            BlendMode::Plus => "plus",
            BlendMode::Xor => "xor",
        }
    }

    /// Parse a host identifier. Unknown modes fall back to Normal.
    pub fn from_id(id: &str) -> Self {
        let key = id.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        BlendMode::all()
            .iter()
            .copied()
            .find(|m| m.id() == key)
            .unwrap_or(BlendMode::Normal)
    }

    /// Composite `src` over `dst` (both premultiplied) with `opacity` in 0..=1.
    #[inline]
    pub fn combine(self, src: Premul, dst: Premul, opacity: f32) -> Premul {
        let o = opacity.clamp(0.0, 1.0);
        if src[3] <= 0.0 || o <= 0.0 {
            // Xor/Plus with a fully transparent source leave dst unchanged too.
            return dst;
        }
        let s = [src[0] * o, src[1] * o, src[2] * o, src[3] * o];
        COMBINE_TABLE[self as usize](s, dst)
    }
}

/// W3C separable compositing: `co = cs(1-ab) + cb(1-as) + as·ab·B(Cb, Cs)`.
#[inline]
fn separable(s: Premul, d: Premul, f: impl Fn(f32, f32) -> f32) -> Premul {
    let sa = s[3];
    let da = d[3];
    let mut out = [0.0f32; 4];
    for c in 0..3 {
        let cs = if sa > 0.0 { s[c] / sa } else { 0.0 };
        let cb = if da > 0.0 { d[c] / da } else { 0.0 };
        let mixed = f(cb, cs).clamp(0.0, 1.0);
        out[c] = s[c] * (1.0 - da) + d[c] * (1.0 - sa) + sa * da * mixed;
    }
    out[3] = sa + da - sa * da;
    out
}

fn normal(s: Premul, d: Premul) -> Premul {
    let k = 1.0 - s[3];
    [s[0] + d[0] * k, s[1] + d[1] * k, s[2] + d[2] * k, s[3] + d[3] * k]
}

fn multiply(s: Premul, d: Premul) -> Premul {
    separable(s, d, |base, top| base * top)
}

fn screen(s: Premul, d: Premul) -> Premul {
    separable(s, d, |base, top| 1.0 - (1.0 - base) * (1.0 - top))
}

fn overlay(s: Premul, d: Premul) -> Premul {
    separable(s, d, overlay_channel)
}

fn darken(s: Premul, d: Premul) -> Premul {
    separable(s, d, f32::min)
}

fn lighten(s: Premul, d: Premul) -> Premul {
    separable(s, d, f32::max)
}

fn color_dodge(s: Premul, d: Premul) -> Premul {
    separable(s, d, color_dodge_channel)
}

fn color_burn(s: Premul, d: Premul) -> Premul {
    separable(s, d, color_burn_channel)
}

fn hard_light(s: Premul, d: Premul) -> Premul {
    separable(s, d, |base, top| overlay_channel(top, base))
}

fn soft_light(s: Premul, d: Premul) -> Premul {
    separable(s, d, soft_light_channel)
}

fn difference(s: Premul, d: Premul) -> Premul {
    separable(s, d, |base, top| (base - top).abs())
}

fn exclusion(s: Premul, d: Premul) -> Premul {
    separable(s, d, |base, top| base + top - 2.0 * base * top)
}

fn plus(s: Premul, d: Premul) -> Premul {
    [
        (s[0] + d[0]).min(1.0),
        (s[1] + d[1]).min(1.0),
        (s[2] + d[2]).min(1.0),
        (s[3] + d[3]).min(1.0),
    ]
}

fn xor(s: Premul, d: Premul) -> Premul {
    let ks = 1.0 - d[3];
    let kd = 1.0 - s[3];
    [
        s[0] * ks + d[0] * kd,
        s[1] * ks + d[1] * kd,
        s[2] * ks + d[2] * kd,
        s[3] * ks + d[3] * kd,
    ]
}

// Channel helpers take (base, top) in straight 0..=1.

fn overlay_channel(base: f32, top: f32) -> f32 {
    if base < 0.5 {
        2.0 * base * top
    } else {
        1.0 - 2.0 * (1.0 - base) * (1.0 - top)
    }
}

fn color_burn_channel(base: f32, top: f32) -> f32 {
    if base >= 1.0 {
        1.0
    } else if top <= 0.0 {
        0.0
    } else {
        (1.0 - (1.0 - base) / top).max(0.0)
    }
}

fn color_dodge_channel(base: f32, top: f32) -> f32 {
    if base <= 0.0 {
        0.0
    } else if top >= 1.0 {
        1.0
    } else {
        (base / (1.0 - top)).min(1.0)
    }
}

/// W3C Soft Light formula.
fn soft_light_channel(base: f32, top: f32) -> f32 {
    if top <= 0.5 {
        base - (1.0 - 2.0 * top) * base * (1.0 - base)
    } else {
        let d = if base <= 0.25 {
            ((16.0 * base - 12.0) * base + 4.0) * base
        } else {
            base.sqrt()
        };
        base + (2.0 * top - 1.0) * (d - base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const RED: Premul = [1.0, 0.0, 0.0, 1.0];
    const GREY: Premul = [0.5, 0.5, 0.5, 1.0];

    fn assert_px(a: Premul, b: Premul) {
        for c in 0..4 {
            assert_abs_diff_eq!(a[c], b[c], epsilon = 1e-5);
        }
    }

    #[test]
    fn ids_round_trip_and_unknown_is_normal() {
        for &m in BlendMode::all() {
            assert_eq!(BlendMode::from_id(m.id()), m);
        }
        assert_eq!(BlendMode::from_id("Color-Dodge"), BlendMode::ColorDodge);
        assert_eq!(BlendMode::from_id("hue"), BlendMode::Normal);
        assert_eq!(BlendMode::from_id(""), BlendMode::Normal);
    }

    #[test]
    fn normal_over_transparent_is_source() {
        assert_px(BlendMode::Normal.combine(GREY, [0.0; 4], 1.0), GREY);
        // half opacity halves premultiplied source
        assert_px(BlendMode::Normal.combine(RED, [0.0; 4], 0.5), [0.5, 0.0, 0.0, 0.5]);
    }

    #[test]
    fn opaque_separable_modes() {
        assert_px(BlendMode::Multiply.combine(GREY, RED, 1.0), [0.5, 0.0, 0.0, 1.0]);
        assert_px(BlendMode::Screen.combine(GREY, RED, 1.0), [1.0, 0.5, 0.5, 1.0]);
        assert_px(BlendMode::Difference.combine(GREY, RED, 1.0), [0.5, 0.5, 0.5, 1.0]);
        assert_px(BlendMode::Darken.combine(GREY, RED, 1.0), [0.5, 0.0, 0.0, 1.0]);
        assert_px(BlendMode::Lighten.combine(GREY, RED, 1.0), [1.0, 0.5, 0.5, 1.0]);
    }

    #[test]
    fn separable_mode_over_transparent_keeps_source() {
        for &m in &[BlendMode::Multiply, BlendMode::Overlay, BlendMode::ColorBurn] {
            assert_px(m.combine(GREY, [0.0; 4], 1.0), GREY);
        }
    }

    // Opaque over opaque reduces to the channel function B(base, top).
    // Base channels 0.25 / 0.75 / 0.5 sit either side of (and on) the 0.5 split.
    const BASE: Premul = [0.25, 0.75, 0.5, 1.0];
    const TOP: Premul = [0.6, 0.2, 1.0, 1.0];

    #[test]
    fn overlay_splits_on_base() {
        assert_px(BlendMode::Overlay.combine(TOP, BASE, 1.0), [0.3, 0.6, 1.0, 1.0]);
    }

    #[test]
    fn hard_light_splits_on_top() {
        assert_px(BlendMode::HardLight.combine(TOP, BASE, 1.0), [0.4, 0.3, 1.0, 1.0]);
    }

    #[test]
    fn color_dodge_values_and_edges() {
        assert_px(BlendMode::ColorDodge.combine(TOP, BASE, 1.0), [0.625, 0.9375, 1.0, 1.0]);
        // black base stays black even under a white top; 0.5 / (1 - 0.5) saturates
        let out = BlendMode::ColorDodge.combine([1.0, 0.5, 0.0, 1.0], [0.0, 0.5, 0.5, 1.0], 1.0);
        assert_px(out, [0.0, 1.0, 0.5, 1.0]);
    }

    #[test]
    fn color_burn_values_and_edges() {
        // white base stays white, black top burns to black
        let out = BlendMode::ColorBurn.combine([0.0, 0.0, 0.5, 1.0], [1.0, 0.5, 0.8, 1.0], 1.0);
        assert_px(out, [1.0, 0.0, 0.6, 1.0]);
        // 1 - 0.75 / 0.6 is negative and clamps
        assert_px(BlendMode::ColorBurn.combine(TOP, BASE, 1.0), [0.0, 0.0, 0.5, 1.0]);
    }

    #[test]
    fn soft_light_covers_all_three_branches() {
        // top > 0.5 with base <= 0.25, top <= 0.5, top > 0.5 with base > 0.25
        let out = BlendMode::SoftLight.combine(TOP, BASE, 1.0);
        assert_px(out, [0.3, 0.6375, std::f32::consts::FRAC_1_SQRT_2, 1.0]);
    }

    #[test]
    fn exclusion_values() {
        assert_px(BlendMode::Exclusion.combine(TOP, BASE, 1.0), [0.55, 0.65, 0.5, 1.0]);
    }

    #[test]
    fn xor_of_two_opaque_pixels_is_empty() {
        assert_px(BlendMode::Xor.combine(RED, GREY, 1.0), [0.0; 4]);
        assert_px(BlendMode::Plus.combine(GREY, GREY, 1.0), [1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn zero_opacity_is_noop() {
        for &m in BlendMode::all() {
            assert_eq!(m.combine(RED, GREY, 0.0), GREY);
        }
    }
}
