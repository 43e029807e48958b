//! Neural segmentation through a pluggable inference backend

use super::{morphology, Segmentation};
use crate::{
    backends::layers::resize_bilinear,
    config::{LearnedConfig, UntrainedPolicy},
    error::{GarmentError, Result},
    inference::{InferenceBackend, WeightsStatus},
    utils::ImagePreprocessor,
};
use image::{GrayImage, Luma, RgbImage};
use ndarray::{Array3, Array4, Axis};
use tracing::{debug, info, instrument, warn};

/// Learned segmenter: preprocess, infer, threshold and clean up
pub struct LearnedSegmenter {
    config: LearnedConfig,
    backend: Box<dyn InferenceBackend>,
}

impl std::fmt::Debug for LearnedSegmenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LearnedSegmenter")
            .field("backend", &self.backend.name())
            .field("input_size", &self.config.input_size)
            .finish_non_exhaustive()
    }
}

impl LearnedSegmenter {
    #[must_use]
    pub fn new(config: LearnedConfig, backend: Box<dyn InferenceBackend>) -> Self {
        Self { config, backend }
    }

    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Weight provenance once the backend has been initialized
    #[must_use]
    pub fn weights_status(&self) -> Option<WeightsStatus> {
        self.backend
            .is_initialized()
            .then(|| self.backend.weights_status())
    }

    /// Probability map resized to `width x height` with linear interpolation
    ///
    /// # Errors
    /// Returns `Inference` unless the output is a single `(1, 1, H, W)` map.
    pub fn probability_map(output: &Array4<f32>, width: u32, height: u32) -> Result<Array3<f32>> {
        let (n, c, h, w) = output.dim();
        if n != 1 || c != 1 || h == 0 || w == 0 {
            return Err(GarmentError::inference(format!(
                "Expected a (1, 1, H, W) probability map, got {:?}",
                output.shape()
            )));
        }
        let plane = output.index_axis(Axis(0), 0).to_owned();
        Ok(resize_bilinear(&plane, height as usize, width as usize))
    }

    /// Foreground where the probability exceeds `threshold` (0/1 mask)
    #[must_use]
    pub fn threshold(probabilities: &Array3<f32>, threshold: f32) -> GrayImage {
        let (_, h, w) = probabilities.dim();
        GrayImage::from_fn(w as u32, h as u32, |x, y| {
            let p = probabilities
                .get([0, y as usize, x as usize])
                .copied()
                .unwrap_or(0.0);
            Luma([u8::from(p > threshold)])
        })
    }

    /// Segment `image` with the backend
    ///
    /// # Errors
    /// - `ModelUnavailable` when the backend cannot load or only has random
    ///   weights under [`UntrainedPolicy::Discard`]
    /// - `Inference` for backend failures or malformed output
    /// - `NoRegionDetected` when the cleaned mask is empty
    #[instrument(skip_all, fields(backend = self.backend.name(), width = image.width(), height = image.height()))]
    pub fn segment(&mut self, image: &RgbImage) -> Result<Segmentation> {
        if let Some(load_time) = self.backend.initialize(&self.config)? {
            debug!(load_ms = load_time.as_millis(), "Backend loaded");
        }

        if self.backend.weights_status() == WeightsStatus::Untrained {
            match self.config.untrained_policy {
                UntrainedPolicy::Discard => {
                    return Err(GarmentError::model_unavailable(
                        "only randomly initialised weights are available",
                    ));
                },
                UntrainedPolicy::Accept => {
                    warn!("Segmenting with an untrained network; the mask is not meaningful");
                },
            }
        }

        let tensor =
            ImagePreprocessor::preprocess_for_inference(image, &self.config.preprocessing())?;
        let output = self.backend.infer(&tensor)?;
        let probabilities = Self::probability_map(&output, image.width(), image.height())?;

        let k = self.config.cleanup_kernel;
        let mut mask = Self::threshold(&probabilities, self.config.threshold);
        mask = morphology::open(&mask, k);
        mask = morphology::close(&mask, k);
        mask = morphology::largest_component(&mask);

        let segmentation = Segmentation::from_mask(image, &mask, self.config.padding)?;
        info!(area = segmentation.area(), "Learned segmentation succeeded");
        Ok(segmentation)
    }
}
