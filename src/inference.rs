//! Inference backend abstraction for the learned segmenter

use crate::{config::LearnedConfig, error::Result};
use ndarray::Array4;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Input preparation parameters shared by every backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    /// `[width, height]` of the network input
    pub target_size: [u32; 2],
    pub normalization_mean: [f32; 3],
    pub normalization_std: [f32; 3],
}

/// Provenance of the parameters a backend runs with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightsStatus {
    /// Loaded from a weight file
    Trained,
    /// Randomly initialised; output is demo quality only
    Untrained,
}

/// Trait for inference backends
///
/// Input tensors are NCHW `(1, 3, H, W)`; outputs are `(1, 1, H, W)`
/// foreground probabilities in `[0, 1]`.
pub trait InferenceBackend {
    /// Load the model described by `config`
    ///
    /// Returns the load time on first initialization and `None` when the
    /// backend was already initialized.
    ///
    /// # Errors
    /// - `ModelUnavailable` when weights or the runtime are missing
    /// - Model loading or validation errors
    fn initialize(&mut self, config: &LearnedConfig) -> Result<Option<Duration>>;

    /// Run inference on the input tensor
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Invalid input tensor dimensions
    /// - Model inference failures
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// Expected input shape
    fn input_shape(&self) -> (usize, usize, usize, usize);

    /// Produced output shape
    fn output_shape(&self) -> (usize, usize, usize, usize);

    /// Whether the backend runs with trained weights
    fn weights_status(&self) -> WeightsStatus;

    fn is_initialized(&self) -> bool;

    /// Short backend name for diagnostics
    fn name(&self) -> &'static str;
}
