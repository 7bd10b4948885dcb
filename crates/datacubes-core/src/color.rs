//! Color palettes and perceptual color conversion.
//!
//! Datacube base colors are specified in CIE L*a*b* and animated in a normalized
//! `[0, 1]` mapping of that space, so transitions stay perceptually even. Point colors come
//! from user palettes whose stops are CSS `rgb()` / `rgba()` strings.

use serde::{Deserialize, Serialize};

/// Default datacube color.
pub const DEFAULT_LAB: [f32; 3] = [98.87, 1.17, -0.14];
/// Color of erroneous datacubes.
pub const ERROR_LAB: [f32; 3] = [52.94, 66.39, 42.22];
/// Color of dataset (input) datacubes.
pub const DATASET_LAB: [f32; 3] = [81.59, -0.31, -1.24];
/// Color of filtering datacubes.
pub const FILTERING_LAB: [f32; 3] = [39.86, -18.04, -13.93];
/// Color of color-mapping datacubes.
pub const MAPPING_LAB: [f32; 3] = [64.85, -6.79, 0.03];
/// Color of rendering primitives.
pub const RENDERING_LAB: [f32; 3] = [69.33, 26.95, 68.9];

const WHITE: [f32; 3] = [1.0, 1.0, 1.0];

/// Maps L*a*b* (L in `[0, 100]`, a/b in `[-128, 128]`) into `[0, 1]`.
#[must_use]
pub fn normalize_lab(lab: [f32; 3]) -> [f32; 3] {
    [lab[0] / 100.0, (lab[1] + 128.0) / 256.0, (lab[2] + 128.0) / 256.0]
}

/// Inverse of [`normalize_lab`].
#[must_use]
pub fn denormalize_lab(lab: [f32; 3]) -> [f32; 3] {
    [lab[0] * 100.0, lab[1] * 256.0 - 128.0, lab[2] * 256.0 - 128.0]
}

/// Converts L*a*b* (D65) into gamma-encoded sRGB, clamped to `[0, 1]`.
#[must_use]
pub fn lab_to_rgb(lab: [f32; 3]) -> [f32; 3] {
    const EPSILON: f32 = 216.0 / 24389.0;
    const KAPPA: f32 = 24389.0 / 27.0;
    const WHITE_POINT: [f32; 3] = [0.950_47, 1.0, 1.088_83];

    let [l, a, b] = lab;
    let fy = (l + 16.0) / 116.0;
    let fx = fy + a / 500.0;
    let fz = fy - b / 200.0;

    let inverse = |f: f32| {
        let cubed = f * f * f;
        if cubed > EPSILON {
            cubed
        } else {
            (116.0 * f - 16.0) / KAPPA
        }
    };
    let yr = if l > KAPPA * EPSILON { fy * fy * fy } else { l / KAPPA };

    let x = inverse(fx) * WHITE_POINT[0];
    let y = yr * WHITE_POINT[1];
    let z = inverse(fz) * WHITE_POINT[2];

    let linear = [
        3.240_454_2 * x - 1.537_138_5 * y - 0.498_531_4 * z,
        -0.969_266 * x + 1.876_010_8 * y + 0.041_556 * z,
        0.055_643_4 * x - 0.204_025_9 * y + 1.057_225_2 * z,
    ];
    linear.map(|c| linear_to_srgb(c).clamp(0.0, 1.0))
}

/// Converts a normalized L*a*b* color (see [`normalize_lab`]) to sRGB.
#[must_use]
pub fn normalized_lab_to_rgb(lab: [f32; 3]) -> [f32; 3] {
    lab_to_rgb(denormalize_lab(lab))
}

/// sRGB transfer function, encoded to linear.
#[must_use]
pub fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.040_45 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// sRGB transfer function, linear to encoded.
#[must_use]
pub fn linear_to_srgb(c: f32) -> f32 {
    if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.max(0.0).powf(1.0 / 2.4) - 0.055
    }
}

/// Parses `rgb(r, g, b)` or `rgba(r, g, b, a)` with 8-bit channels into `[0, 1]` RGBA.
#[must_use]
pub fn parse_css_color(css: &str) -> Option<[f32; 4]> {
    let css = css.trim();
    let inner = css
        .strip_prefix("rgba(")
        .or_else(|| css.strip_prefix("rgb("))?
        .strip_suffix(')')?;

    let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
    if !(3..=4).contains(&parts.len()) {
        return None;
    }

    let mut rgba = [1.0; 4];
    for (channel, part) in rgba.iter_mut().zip(&parts[..3]) {
        *channel = f32::from(part.parse::<u8>().ok()?) / 255.0;
    }
    if let Some(alpha) = parts.get(3) {
        rgba[3] = alpha.parse::<f32>().ok()?;
    }
    Some(rgba)
}

/// One stop of a color palette.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorStop {
    /// Position of the stop in `[0, 1]`.
    pub offset: f32,
    /// CSS color string.
    pub color: String,
}

impl ColorStop {
    /// Creates a new stop.
    pub fn new(offset: f32, color: impl Into<String>) -> Self {
        Self {
            offset,
            color: color.into(),
        }
    }

    fn rgb(&self) -> [f32; 3] {
        if let Some([r, g, b, _]) = parse_css_color(&self.color) {
            [r, g, b]
        } else {
            log::debug!("unparsable palette color {:?}, using white", self.color);
            WHITE
        }
    }
}

/// An ordered set of color stops.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColorPalette {
    pub stops: Vec<ColorStop>,
}

impl ColorPalette {
    /// Creates a palette from stops.
    pub fn new(stops: Vec<ColorStop>) -> Self {
        Self { stops }
    }

    /// Returns the color at a normalized value.
    ///
    /// The nearest stops at or below and at or above the value are blended by inverse
    /// distance. Returns `None` for NaN and for an empty palette; values outside every
    /// stop's reach fall back to white.
    #[must_use]
    pub fn color_for_normalized_value(&self, value: f32) -> Option<[f32; 3]> {
        if value.is_nan() || self.stops.is_empty() {
            return None;
        }

        let mut previous: Option<(&ColorStop, f32)> = None;
        let mut next: Option<(&ColorStop, f32)> = None;

        for stop in &self.stops {
            let distance = (stop.offset - value).abs();
            if stop.offset <= value {
                if previous.map_or(true, |(_, d)| distance < d) {
                    previous = Some((stop, distance));
                }
            } else if next.map_or(true, |(_, d)| distance < d) {
                next = Some((stop, distance));
            }
        }

        let color = match (previous, next) {
            (Some((prev, prev_distance)), Some((next, next_distance))) => {
                let total = prev_distance + next_distance;
                let prev_factor = 1.0 - prev_distance / total;
                let next_factor = 1.0 - next_distance / total;
                let (a, b) = (prev.rgb(), next.rgb());
                [
                    a[0] * prev_factor + b[0] * next_factor,
                    a[1] * prev_factor + b[1] * next_factor,
                    a[2] * prev_factor + b[2] * next_factor,
                ]
            }
            (Some((stop, _)), None) | (None, Some((stop, _))) => stop.rgb(),
            (None, None) => WHITE,
        };
        Some(color)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_rgb_eq(a: [f32; 3], b: [f32; 3]) {
        for i in 0..3 {
            assert!((a[i] - b[i]).abs() < 1e-3, "{a:?} != {b:?}");
        }
    }

    fn black_white() -> ColorPalette {
        ColorPalette::new(vec![
            ColorStop::new(0.0, "rgb(0, 0, 0)"),
            ColorStop::new(1.0, "rgb(255, 255, 255)"),
        ])
    }

    #[test]
    fn test_parse_css_color() {
        assert_eq!(parse_css_color("rgb(255, 0, 0)"), Some([1.0, 0.0, 0.0, 1.0]));
        assert_eq!(
            parse_css_color("rgba(0,255,0,0.5)"),
            Some([0.0, 1.0, 0.0, 0.5])
        );
        assert_eq!(parse_css_color("#ff0000"), None);
        assert_eq!(parse_css_color("rgb(300, 0, 0)"), None);
    }

    #[test]
    fn test_color_lookup_at_stop() {
        let palette = black_white();
        assert_rgb_eq(palette.color_for_normalized_value(0.0).unwrap(), [0.0; 3]);
        assert_rgb_eq(palette.color_for_normalized_value(1.0).unwrap(), [1.0; 3]);
    }

    #[test]
    fn test_color_lookup_blends_between_stops() {
        let palette = black_white();
        assert_rgb_eq(palette.color_for_normalized_value(0.25).unwrap(), [0.25; 3]);
    }

    #[test]
    fn test_color_lookup_single_side() {
        let palette = ColorPalette::new(vec![ColorStop::new(0.5, "rgb(255, 0, 0)")]);
        assert_rgb_eq(palette.color_for_normalized_value(0.9).unwrap(), [1.0, 0.0, 0.0]);
        assert_rgb_eq(palette.color_for_normalized_value(0.1).unwrap(), [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_color_lookup_degenerate_inputs() {
        assert_eq!(black_white().color_for_normalized_value(f32::NAN), None);
        assert_eq!(ColorPalette::default().color_for_normalized_value(0.5), None);
    }

    #[test]
    fn test_unparsable_stop_is_white() {
        let palette = ColorPalette::new(vec![ColorStop::new(0.0, "tomato")]);
        assert_rgb_eq(palette.color_for_normalized_value(0.0).unwrap(), [1.0; 3]);
    }

    #[test]
    fn test_lab_to_rgb_extremes() {
        assert_rgb_eq(lab_to_rgb([100.0, 0.0, 0.0]), [1.0, 1.0, 1.0]);
        assert_rgb_eq(lab_to_rgb([0.0, 0.0, 0.0]), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_lab_to_rgb_error_color_is_red() {
        let rgb = lab_to_rgb(ERROR_LAB);
        assert!(rgb[0] > 0.8);
        assert!(rgb[1] < 0.4);
        assert!(rgb[2] < 0.4);
    }

    #[test]
    fn test_normalize_lab_inverse() {
        let lab = denormalize_lab(normalize_lab(RENDERING_LAB));
        for i in 0..3 {
            assert!((lab[i] - RENDERING_LAB[i]).abs() < 1e-4);
        }
    }
}
