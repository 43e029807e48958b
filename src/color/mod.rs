//! Color-space conversions and recommendation colors
//!
//! Hex formatting, HSL round trips and the tonal variations derived from a
//! dominant color. Palette extraction lives in [`quantize`], the masked-region
//! pipeline in [`analyzer`].

pub mod analyzer;
pub mod quantize;

pub use analyzer::ColorAnalyzer;
pub use quantize::{quantize, QuantizedColor};

use crate::error::{GarmentError, Result};
use crate::types::{Color, RecommendedColors};
use palette::{FromColor, Hsl, Srgb};

/// Lightness added for the lighter shade
pub const LIGHTEN_DELTA: f32 = 0.40;
/// Upper lightness bound of the lighter shade
pub const LIGHTEST: f32 = 0.95;
/// Lightness removed for the darker shade
pub const DARKEN_DELTA: f32 = 0.45;
/// Lower lightness bound of the darker shade
pub const DARKEST: f32 = 0.05;

/// Format as lowercase, zero-padded `#rrggbb`
#[must_use]
pub fn rgb_to_hex(rgb: [u8; 3]) -> String {
    format!("#{:02x}{:02x}{:02x}", rgb[0], rgb[1], rgb[2])
}

/// Parse `#rrggbb` or `rrggbb` (either case)
///
/// # Errors
/// Returns `ColorAnalysis` for anything that is not six hex digits.
pub fn hex_to_rgb(hex: &str) -> Result<[u8; 3]> {
    let digits = hex.strip_prefix('#').unwrap_or(hex);
    if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(GarmentError::color_analysis(format!(
            "Invalid hex color '{hex}'"
        )));
    }
    let channel = |range: std::ops::Range<usize>| {
        digits
            .get(range)
            .and_then(|s| u8::from_str_radix(s, 16).ok())
            .ok_or_else(|| GarmentError::color_analysis(format!("Invalid hex color '{hex}'")))
    };
    Ok([channel(0..2)?, channel(2..4)?, channel(4..6)?])
}

/// Convert to HSL (hue in degrees, saturation and lightness in `0..=1`)
#[must_use]
pub fn rgb_to_hsl(rgb: [u8; 3]) -> Hsl {
    let srgb: Srgb<f32> = Srgb::<u8>::new(rgb[0], rgb[1], rgb[2]).into_format();
    Hsl::from_color(srgb)
}

#[must_use]
pub fn hsl_to_rgb(hsl: Hsl) -> [u8; 3] {
    let srgb: Srgb<u8> = Srgb::<f32>::from_color(hsl).into_format();
    [srgb.red, srgb.green, srgb.blue]
}

fn with_lightness(rgb: [u8; 3], adjust: impl Fn(f32) -> f32) -> [u8; 3] {
    let mut hsl = rgb_to_hsl(rgb);
    hsl.lightness = adjust(hsl.lightness);
    hsl_to_rgb(hsl)
}

/// Lightness raised by 0.40, capped at 0.95
#[must_use]
pub fn lighter_shade(rgb: [u8; 3]) -> [u8; 3] {
    with_lightness(rgb, |l| (l + LIGHTEN_DELTA).min(LIGHTEST))
}

/// Lightness lowered by 0.45, floored at 0.05
#[must_use]
pub fn darker_shade(rgb: [u8; 3]) -> [u8; 3] {
    with_lightness(rgb, |l| (l - DARKEN_DELTA).max(DARKEST))
}

#[must_use]
pub fn complementary(rgb: [u8; 3]) -> [u8; 3] {
    rgb.map(|c| 255 - c)
}

/// All recommendation colors for a dominant color
#[must_use]
pub fn recommended_colors(dominant: Color) -> RecommendedColors {
    RecommendedColors {
        lighter_shade: lighter_shade(dominant.rgb).into(),
        darker_shade: darker_shade(dominant.rgb).into(),
        complementary: complementary(dominant.rgb).into(),
        neutral_black: Color::BLACK,
        neutral_white: Color::WHITE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every 5th value per channel plus both extremes
    fn rgb_grid() -> impl Iterator<Item = [u8; 3]> {
        let steps: Vec<u8> = (0..=255u8).step_by(5).chain(std::iter::once(254)).collect();
        let steps_g = steps.clone();
        let steps_b = steps.clone();
        steps.into_iter().flat_map(move |r| {
            let steps_b = steps_b.clone();
            steps_g
                .clone()
                .into_iter()
                .flat_map(move |g| steps_b.clone().into_iter().map(move |b| [r, g, b]))
        })
    }

    #[test]
    fn test_hex_format() {
        assert_eq!(rgb_to_hex([0, 0, 0]), "#000000");
        assert_eq!(rgb_to_hex([255, 255, 255]), "#ffffff");
        assert_eq!(rgb_to_hex([1, 171, 15]), "#01ab0f");
    }

    #[test]
    fn test_hex_round_trip() {
        for rgb in rgb_grid() {
            let hex = rgb_to_hex(rgb);
            assert_eq!(hex.len(), 7);
            assert_eq!(hex_to_rgb(&hex).unwrap(), rgb);
        }
    }

    #[test]
    fn test_hex_parse_rejects_garbage() {
        assert!(hex_to_rgb("#12345").is_err());
        assert!(hex_to_rgb("#gg0000").is_err());
        assert!(hex_to_rgb("").is_err());
        assert_eq!(hex_to_rgb("FFA500").unwrap(), [255, 165, 0]);
    }

    #[test]
    fn test_hsl_round_trip_within_one() {
        for rgb in rgb_grid() {
            let back = hsl_to_rgb(rgb_to_hsl(rgb));
            for (a, b) in rgb.iter().zip(back.iter()) {
                assert!(
                    (i16::from(*a) - i16::from(*b)).abs() <= 1,
                    "{rgb:?} came back as {back:?}"
                );
            }
        }
    }

    #[test]
    fn test_variation_lightness_bounds() {
        // quantization of the output back to 8 bits moves lightness by < 1/255
        let tolerance = 1.0 / 255.0;
        for rgb in rgb_grid() {
            let l = rgb_to_hsl(rgb).lightness;
            let lighter = rgb_to_hsl(lighter_shade(rgb)).lightness;
            let darker = rgb_to_hsl(darker_shade(rgb)).lightness;

            assert!(lighter <= LIGHTEST + tolerance);
            assert!(darker >= DARKEST - tolerance);
            if l <= LIGHTEST {
                assert!(lighter + tolerance >= l, "{rgb:?}: {lighter} < {l}");
            }
            if l >= DARKEST {
                assert!(darker <= l + tolerance, "{rgb:?}: {darker} > {l}");
            }
        }
    }

    #[test]
    fn test_complementary_involution() {
        for rgb in rgb_grid() {
            let comp = complementary(rgb);
            assert_eq!(comp, [255 - rgb[0], 255 - rgb[1], 255 - rgb[2]]);
            assert_eq!(complementary(comp), rgb);
        }
    }

    #[test]
    fn test_recommended_colors_for_red() {
        let rec = recommended_colors(Color::new(200, 30, 30));
        assert_eq!(rec.complementary, Color::new(55, 225, 225));
        assert_eq!(rec.neutral_black.hex(), "#000000");
        assert_eq!(rec.neutral_white.hex(), "#ffffff");

        let original = rgb_to_hsl([200, 30, 30]);
        let lighter = rgb_to_hsl(rec.lighter_shade.rgb);
        assert!((lighter.lightness - (original.lightness + LIGHTEN_DELTA)).abs() < 0.01);
        assert!((lighter.hue.into_positive_degrees() - original.hue.into_positive_degrees()).abs() < 1.0);
    }
}
