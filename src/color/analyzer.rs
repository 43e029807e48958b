//! Dominant color, palette and recommendations for a masked region

use super::quantize::{quantize, QuantizedColor};
use super::recommended_colors;
use crate::{
    config::{ArtifactConfig, ColorConfig},
    error::{GarmentError, Result},
    services::ImageIOService,
    tracing_config::events,
    types::{Color, ColorAnalysis, SegmentationMask},
};
use image::{Rgba, RgbaImage, RgbImage};
use std::path::Path;
use tracing::{debug, instrument, warn};

/// Number of boxes used to pick the dominant color
const DOMINANT_QUANTIZE_COLORS: usize = 5;

/// Runs palette extraction over the foreground of a mask
#[derive(Debug, Clone)]
pub struct ColorAnalyzer {
    config: ColorConfig,
    masked_file: String,
}

impl ColorAnalyzer {
    #[must_use]
    pub fn new(config: ColorConfig, artifacts: &ArtifactConfig) -> Self {
        Self {
            config,
            masked_file: artifacts.masked_file.clone(),
        }
    }

    /// RGBA copy of `image`, opaque where the mask is set and fully transparent elsewhere
    ///
    /// # Errors
    /// Returns `ColorAnalysis` when the mask and image sizes differ.
    pub fn masked_image(image: &RgbImage, mask: &SegmentationMask) -> Result<RgbaImage> {
        if image.dimensions() != mask.dimensions {
            return Err(GarmentError::color_analysis(format!(
                "Mask is {}x{} but image is {}x{}",
                mask.width(),
                mask.height(),
                image.width(),
                image.height()
            )));
        }
        Ok(RgbaImage::from_fn(image.width(), image.height(), |x, y| {
            if mask.get(x, y) {
                let [r, g, b] = image.get_pixel(x, y).0;
                Rgba([r, g, b, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        }))
    }

    /// Every `quality`-th pixel that is fully opaque
    fn opaque_samples(masked: &RgbaImage, quality: u32) -> Vec<[u8; 3]> {
        masked
            .pixels()
            .step_by(quality.max(1) as usize)
            .filter(|p| p[3] == 255)
            .map(|p| [p[0], p[1], p[2]])
            .collect()
    }

    /// Analyze the colors under `mask`
    ///
    /// When `output_dir` is given and saving is enabled, the transparent
    /// masked image is written there and its path reported.
    ///
    /// # Errors
    /// Returns `ColorAnalysis` for size mismatches, empty masks, failed
    /// writes or a failed dominant-color quantization. A palette failure on
    /// its own is recovered with a one-color palette.
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn analyze(
        &self,
        image: &RgbImage,
        mask: &SegmentationMask,
        output_dir: Option<&Path>,
    ) -> Result<ColorAnalysis> {
        let masked = Self::masked_image(image, mask)?;

        let masked_image_path = match output_dir {
            Some(dir) if self.config.save_masked_image => {
                let path = dir.join(&self.masked_file);
                ImageIOService::save_rgba_png(&masked, &path).map_err(|e| {
                    GarmentError::color_analysis(format!("Failed to write masked image: {e}"))
                })?;
                Some(path)
            },
            _ => None,
        };

        let samples = Self::opaque_samples(&masked, self.config.quality);
        debug!(samples = samples.len(), quality = self.config.quality, "Sampled opaque pixels");
        if samples.is_empty() {
            return Err(GarmentError::color_analysis("Mask has no opaque pixels to sample"));
        }

        let dominant: Color = quantize(samples.iter().copied(), DOMINANT_QUANTIZE_COLORS)
            .map_err(|e| GarmentError::color_analysis(e.to_string()))?
            .first()
            .map(|c| Color::from(c.rgb))
            .ok_or_else(|| GarmentError::color_analysis("Quantization returned no colors"))?;

        let palette = palette_or_dominant(
            quantize(samples.iter().copied(), self.config.palette_size),
            dominant,
        );

        let analysis = ColorAnalysis {
            dominant_color: dominant,
            palette,
            recommended_colors: recommended_colors(dominant),
            masked_image_path,
        };
        events::color_report(&analysis);
        Ok(analysis)
    }
}

/// Palette colors from a quantization result, or `[dominant]` when it failed or came back empty
fn palette_or_dominant(quantized: Result<Vec<QuantizedColor>>, dominant: Color) -> Vec<Color> {
    match quantized {
        Ok(colors) if !colors.is_empty() => colors.iter().map(|c| Color::from(c.rgb)).collect(),
        Ok(_) => {
            warn!("Palette extraction returned no colors, using dominant color only");
            vec![dominant]
        },
        Err(e) => {
            warn!(error = %e, "Palette extraction failed, using dominant color only");
            vec![dominant]
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GarmentConfig;
    use image::Rgb;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct CapturedLog(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLog {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn with_captured_log<T>(f: impl FnOnce() -> T) -> (T, String) {
        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let value = tracing::subscriber::with_default(subscriber, f);
        (value, log.contents())
    }

    fn analyzer() -> ColorAnalyzer {
        let config = GarmentConfig::default();
        ColorAnalyzer::new(config.color, &config.artifacts)
    }

    fn square_mask(width: u32, height: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> SegmentationMask {
        let data = (0..height)
            .flat_map(|y| (0..width).map(move |x| u8::from(x >= x0 && x < x1 && y >= y0 && y < y1)))
            .collect();
        SegmentationMask::from_raw(width, height, data).unwrap()
    }

    #[test]
    fn test_uniform_region_is_exact() {
        // background colors outside the mask must not leak into the palette
        let mut image = RgbImage::from_pixel(40, 40, Rgb([250, 250, 250]));
        for y in 10..30 {
            for x in 10..30 {
                image.put_pixel(x, y, Rgb([34, 139, 34]));
            }
        }
        let mask = square_mask(40, 40, 10, 10, 30, 30);

        let analysis = analyzer().analyze(&image, &mask, None).unwrap();
        assert_eq!(analysis.dominant_color, Color::new(34, 139, 34));
        assert_eq!(analysis.palette, vec![Color::new(34, 139, 34)]);
        assert_eq!(analysis.recommended_colors.complementary, Color::new(221, 116, 221));
        assert!(analysis.masked_image_path.is_none());
    }

    #[test]
    fn test_dominant_follows_majority() {
        let mut image = RgbImage::from_pixel(20, 20, Rgb([200, 20, 20]));
        for y in 0..5 {
            for x in 0..20 {
                image.put_pixel(x, y, Rgb([20, 20, 200]));
            }
        }
        let mask = square_mask(20, 20, 0, 0, 20, 20);

        let analysis = analyzer().analyze(&image, &mask, None).unwrap();
        assert_eq!(analysis.dominant_color, Color::new(200, 20, 20));
        assert_eq!(analysis.palette.len(), 2);
        assert_eq!(analysis.palette[1], Color::new(20, 20, 200));
    }

    #[test]
    fn test_masked_image_written() {
        let dir = tempfile::TempDir::new().unwrap();
        let image = RgbImage::from_pixel(8, 8, Rgb([10, 20, 30]));
        let mask = square_mask(8, 8, 2, 2, 6, 6);

        let analysis = analyzer().analyze(&image, &mask, Some(dir.path())).unwrap();
        let path = analysis.masked_image_path.unwrap();
        assert!(path.ends_with("masked_transparent.png"));

        let written = image::open(&path).unwrap().to_rgba8();
        assert_eq!(written.get_pixel(0, 0)[3], 0);
        assert_eq!(*written.get_pixel(3, 3), Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn test_empty_mask_fails() {
        let image = RgbImage::new(8, 8);
        let mask = square_mask(8, 8, 0, 0, 0, 0);
        let result = analyzer().analyze(&image, &mask, None);
        assert!(matches!(result, Err(GarmentError::ColorAnalysis(_))));
    }

    #[test]
    fn test_failed_palette_falls_back_to_dominant() {
        let dominant = Color::new(90, 30, 120);
        let (palette, log) = with_captured_log(|| {
            palette_or_dominant(
                Err(GarmentError::palette_extraction("No pixels to quantize")),
                dominant,
            )
        });
        assert_eq!(palette, vec![dominant]);
        assert!(log.contains("WARN"), "{log}");
        assert!(log.contains("Palette extraction failed"), "{log}");
        assert!(log.contains("No pixels to quantize"), "{log}");
    }

    #[test]
    fn test_empty_palette_falls_back_to_dominant() {
        let dominant = Color::new(1, 2, 3);
        let (palette, log) = with_captured_log(|| palette_or_dominant(Ok(Vec::new()), dominant));
        assert_eq!(palette, vec![dominant]);
        assert!(log.contains("returned no colors"), "{log}");
    }

    #[test]
    fn test_quantized_palette_is_kept_in_order() {
        let quantized = vec![
            QuantizedColor {
                rgb: [200, 10, 10],
                population: 30,
            },
            QuantizedColor {
                rgb: [10, 10, 200],
                population: 10,
            },
        ];
        let palette = palette_or_dominant(Ok(quantized), Color::new(0, 0, 0));
        assert_eq!(palette, vec![Color::new(200, 10, 10), Color::new(10, 10, 200)]);
    }

    #[test]
    fn test_dimension_mismatch_fails() {
        let image = RgbImage::new(8, 8);
        let mask = square_mask(4, 4, 0, 0, 4, 4);
        assert!(ColorAnalyzer::masked_image(&image, &mask).is_err());
    }
}
