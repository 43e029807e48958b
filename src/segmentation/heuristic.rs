//! Classical garment segmentation: edges, graph cut, background-color
//! exclusion and morphological clean-up

use super::grabcut::{self, GrabCut, Rect};
use super::morphology;
use super::Segmentation;
use crate::{
    config::HeuristicConfig,
    error::{GarmentError, Result},
};
use image::{imageops, GrayImage, Luma, RgbImage};
use imageproc::edges::canny;
use tracing::{debug, instrument};

/// Kernel for thickening the Canny edges
const EDGE_DILATION: u32 = 3;

/// Deterministic segmenter built on GrabCut
#[derive(Debug, Clone)]
pub struct HeuristicSegmenter {
    config: HeuristicConfig,
}

impl HeuristicSegmenter {
    #[must_use]
    pub fn new(config: HeuristicConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &HeuristicConfig {
        &self.config
    }

    /// Dilated Canny edge map of the grayscale image (0/1)
    #[must_use]
    pub fn edge_mask(&self, gray: &GrayImage) -> GrayImage {
        let edges = canny(gray, self.config.canny_low, self.config.canny_high);
        morphology::dilate(&edges, EDGE_DILATION)
    }

    /// 1 where a pixel differs from all four corner colors, 0 where it
    /// matches at least one of them
    #[must_use]
    pub fn background_exclusion(&self, image: &RgbImage) -> GrayImage {
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return GrayImage::new(w, h);
        }
        let corners = [(0, 0), (w - 1, 0), (0, h - 1), (w - 1, h - 1)]
            .map(|(x, y)| image.get_pixel(x, y).0);
        let threshold = self.config.corner_threshold;

        GrayImage::from_fn(w, h, |x, y| {
            let p = image.get_pixel(x, y).0;
            let matches_corner = corners.iter().any(|c| {
                let diff: u32 = p.iter().zip(c).map(|(a, b)| u32::from(a.abs_diff(*b))).sum();
                diff < threshold
            });
            Luma([u8::from(!matches_corner)])
        })
    }

    /// Segment the dominant garment in `image`
    ///
    /// # Errors
    /// Returns `NoRegionDetected` when nothing survives the clean-up.
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn segment(&self, image: &RgbImage) -> Result<Segmentation> {
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return Err(GarmentError::NoRegionDetected);
        }
        let cfg = &self.config;

        let gray = imageops::grayscale(image);
        let edges = self.edge_mask(&gray);
        debug!(
            edge_density = morphology::count_nonzero(&edges) as f64 / f64::from(w * h),
            "Edge map computed"
        );

        let rect = Rect::with_margin(w, h, cfg.rect_margin_ratio);
        let labels = GrabCut::new(cfg.grabcut_iterations, cfg.seed).run(image, rect);
        let cut = grabcut::foreground_mask(&labels, w, h);
        debug!(foreground = morphology::count_nonzero(&cut), "Graph cut finished");

        let mut mask = morphology::and(&cut, &self.background_exclusion(image));
        mask = morphology::open(&mask, cfg.cleanup_kernel);
        mask = morphology::close(&mask, cfg.cleanup_kernel);
        mask = morphology::largest_component(&mask);
        mask = morphology::close(&mask, cfg.fill_kernel);
        debug!(area = morphology::count_nonzero(&mask), "Mask cleaned");

        Segmentation::from_mask(image, &mask, cfg.padding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn framed(background: [u8; 3], garment: [u8; 3], size: u32, lo: u32, hi: u32) -> RgbImage {
        RgbImage::from_fn(size, size, |x, y| {
            if (lo..hi).contains(&x) && (lo..hi).contains(&y) {
                Rgb(garment)
            } else {
                Rgb(background)
            }
        })
    }

    #[test]
    fn test_centered_rectangle_on_black() {
        let image = framed([0, 0, 0], [200, 40, 60], 120, 40, 80);
        let segmentation = HeuristicSegmenter::new(HeuristicConfig::default())
            .segment(&image)
            .unwrap();

        let bbox = segmentation.bbox;
        // 20 px padding plus one pixel of even-kernel closing shift
        assert!(bbox.x_min <= 40 && bbox.y_min <= 40);
        assert!(bbox.x_max >= 80 && bbox.y_max >= 80);
        assert!(bbox.x_min >= 19 && bbox.y_min >= 19);
        assert!(bbox.x_max <= 102 && bbox.y_max <= 102);

        let area = segmentation.mask.area();
        assert!((1500..=1700).contains(&area), "area {area}");
        assert_eq!(segmentation.crop.dimensions(), (bbox.width, bbox.height));
    }

    #[test]
    fn test_centered_rectangle_on_white() {
        let image = framed([255, 255, 255], [20, 60, 160], 100, 30, 70);
        let segmentation = HeuristicSegmenter::new(HeuristicConfig::default())
            .segment(&image)
            .unwrap();
        let area = segmentation.mask.area();
        assert!((1500..=1700).contains(&area), "area {area}");
        assert!(segmentation.mask.get(50, 50));
        assert!(!segmentation.mask.get(5, 5));
    }

    #[test]
    fn test_uniform_image_has_no_garment() {
        let image = RgbImage::from_pixel(64, 48, Rgb([120, 120, 120]));
        let result = HeuristicSegmenter::new(HeuristicConfig::default()).segment(&image);
        assert!(matches!(result, Err(GarmentError::NoRegionDetected)));
    }

    #[test]
    fn test_background_exclusion_uses_corner_colors() {
        let mut image = RgbImage::from_pixel(10, 10, Rgb([100, 100, 100]));
        image.put_pixel(5, 5, Rgb([110, 110, 105])); // diff 25, matches
        image.put_pixel(6, 6, Rgb([110, 110, 110])); // diff 30, kept
        let keep = HeuristicSegmenter::new(HeuristicConfig::default()).background_exclusion(&image);
        assert_eq!(keep.get_pixel(5, 5)[0], 0);
        assert_eq!(keep.get_pixel(6, 6)[0], 1);
        assert_eq!(keep.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn test_edge_mask_marks_boundaries() {
        let image = framed([0, 0, 0], [255, 255, 255], 40, 10, 30);
        let segmenter = HeuristicSegmenter::new(HeuristicConfig::default());
        let edges = segmenter.edge_mask(&imageops::grayscale(&image));
        assert_eq!(edges.get_pixel(2, 2)[0], 0);
        assert_eq!(edges.get_pixel(20, 20)[0], 0);
        assert!(morphology::count_nonzero(&edges) > 0);
    }

    #[test]
    fn test_segmentation_is_deterministic() {
        let image = framed([0, 0, 0], [30, 200, 90], 80, 25, 55);
        let segmenter = HeuristicSegmenter::new(HeuristicConfig::default());
        let a = segmenter.segment(&image).unwrap();
        let b = segmenter.segment(&image).unwrap();
        assert_eq!(a.mask, b.mask);
        assert_eq!(a.bbox, b.bbox);
    }
}
