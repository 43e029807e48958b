//! Image to tensor conversion for the learned segmenter

use crate::{
    error::{GarmentError, Result},
    inference::PreprocessingConfig,
};
use image::{imageops, RgbImage};
use ndarray::Array4;

/// Shared image preprocessing utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Stretch `image` to the target size and convert it to a normalized
    /// NCHW tensor
    ///
    /// The aspect ratio is not preserved: the probability map is stretched
    /// back to the original size afterwards, so every input pixel maps to a
    /// network pixel.
    ///
    /// # Errors
    /// Returns `Processing` for an empty image or a zero target size.
    pub fn preprocess_for_inference(
        image: &RgbImage,
        preprocessing_config: &PreprocessingConfig,
    ) -> Result<Array4<f32>> {
        let [target_w, target_h] = preprocessing_config.target_size;
        if target_w == 0 || target_h == 0 {
            return Err(GarmentError::processing("Target size must be non-zero"));
        }
        if image.width() == 0 || image.height() == 0 {
            return Err(GarmentError::processing("Cannot preprocess an empty image"));
        }

        let resized = if image.dimensions() == (target_w, target_h) {
            image.clone()
        } else {
            imageops::resize(image, target_w, target_h, imageops::FilterType::Triangle)
        };
        Ok(Self::canvas_to_tensor(&resized, preprocessing_config))
    }

    /// Convert an RGB canvas to a normalized tensor
    fn canvas_to_tensor(canvas: &RgbImage, preprocessing_config: &PreprocessingConfig) -> Array4<f32> {
        let (w, h) = (canvas.width() as usize, canvas.height() as usize);
        let mean = preprocessing_config.normalization_mean;
        let std = preprocessing_config.normalization_std;
        let mut tensor = Array4::<f32>::zeros((1, 3, h, w));

        #[allow(clippy::indexing_slicing)]
        // Safe: tensor dimensions pre-allocated to match canvas size
        for (y, row) in canvas.rows().enumerate() {
            for (x, pixel) in row.enumerate() {
                for c in 0..3 {
                    tensor[[0, c, y, x]] = (f32::from(pixel[c]) / 255.0 - mean[c]) / std[c];
                }
            }
        }

        tensor
    }
}
