//! Foreground segmentation: heuristic and learned segmenters plus the
//! geometry and graph helpers they share

pub mod grabcut;
pub mod heuristic;
pub mod learned;
pub mod maxflow;
pub mod morphology;

pub use heuristic::HeuristicSegmenter;
pub use learned::LearnedSegmenter;

use crate::error::Result;
use crate::types::{BoundingBox, SegmentationMask};
use image::{imageops, GrayImage, RgbImage};

/// Mask, padded bounding box and crop produced by a segmenter
#[derive(Debug, Clone)]
pub struct Segmentation {
    pub mask: SegmentationMask,
    pub bbox: BoundingBox,
    pub crop: RgbImage,
}

impl Segmentation {
    /// Derive the bounding box from a cleaned mask and crop `image` to it
    ///
    /// # Errors
    /// Returns `NoRegionDetected` when `mask` has no foreground.
    pub fn from_mask(image: &RgbImage, mask: &GrayImage, padding: u32) -> Result<Self> {
        let mask = SegmentationMask::from_gray(mask);
        let bbox = mask.bounding_box(padding)?;
        let crop =
            imageops::crop_imm(image, bbox.x_min, bbox.y_min, bbox.width, bbox.height).to_image();
        Ok(Self { mask, bbox, crop })
    }

    #[must_use]
    pub fn area(&self) -> u64 {
        self.mask.area()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GarmentError;
    use image::{Luma, Rgb};

    #[test]
    fn test_from_mask_crops_padded_box() {
        let image = RgbImage::from_fn(30, 20, |x, y| Rgb([x as u8, y as u8, 0]));
        let mask = GrayImage::from_fn(30, 20, |x, y| {
            Luma([u8::from((10..15).contains(&x) && (5..8).contains(&y))])
        });

        let segmentation = Segmentation::from_mask(&image, &mask, 3).unwrap();
        assert_eq!(segmentation.area(), 15);
        assert_eq!(
            (segmentation.bbox.x_min, segmentation.bbox.y_min),
            (7, 2)
        );
        // extents 10..=14 x 5..=7, the padded maximum is the exclusive end
        assert_eq!(segmentation.crop.dimensions(), (10, 8));
        assert_eq!(*segmentation.crop.get_pixel(0, 0), Rgb([7, 2, 0]));
    }

    #[test]
    fn test_from_empty_mask_fails() {
        let image = RgbImage::new(4, 4);
        let result = Segmentation::from_mask(&image, &GrayImage::new(4, 4), 10);
        assert!(matches!(result, Err(GarmentError::NoRegionDetected)));
    }
}
